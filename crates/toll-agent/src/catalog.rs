//! The pre-registered agent variants: a triage agent that answers directly or
//! hands work to the Azure and web agents.

use std::sync::Arc;

use toll_types::config::ModelConfig;

use crate::agent::{Agent, AgentBuilder};
use crate::llm::LanguageModel;
use crate::memory::ThreadMemory;
use crate::tools::generate_artifact::GenerateArtifact;
use crate::tools::search_web::SearchWeb;
use crate::tools::ToolRegistry;

pub const TRIAGE_AGENT: &str = "triage-agent";
pub const AZURE_AGENT: &str = "azure-agent";
pub const WEB_AGENT: &str = "web-agent";

const TRIAGE_INSTRUCTIONS: &str = "\
You are the front desk of an operations assistant. The current date and time is {{datetime}}.
Answer general questions yourself. Hand anything about Azure virtual machines to the Azure agent \
and anything that needs fresh information from the internet to the web agent.
Put code, documents and other long-form content into an artifact with generate_artifact \
and keep the chat reply short.";

const AZURE_INSTRUCTIONS: &str = "\
You manage Azure virtual machines. You can create, resize and delete VMs.
Every change needs the user's approval; if a call is declined, say so and do not retry it.
Report the outcome of each change in one or two sentences.";

const WEB_INSTRUCTIONS: &str = "\
You research questions on the web. Search once with a focused query, then summarize \
what you found and cite the source URLs.
If a search is declined, answer from what you already know and say that no search was run.";

pub fn azure_agent(
    model: Arc<dyn LanguageModel>,
    config: &ModelConfig,
    memory: Arc<ThreadMemory>,
) -> Arc<Agent> {
    configured(Agent::builder(AZURE_AGENT, model), config)
        .name("Azure Agent")
        .description("Creates, updates and deletes Azure virtual machines.")
        .instructions(AZURE_INSTRUCTIONS)
        .tools(ToolRegistry::with_vm_tools())
        .memory(memory)
        .build()
}

pub fn web_agent(
    model: Arc<dyn LanguageModel>,
    config: &ModelConfig,
    memory: Arc<ThreadMemory>,
    search: SearchWeb,
) -> Arc<Agent> {
    configured(Agent::builder(WEB_AGENT, model), config)
        .name("Web Agent")
        .description("Searches the web and summarizes what it finds.")
        .instructions(WEB_INSTRUCTIONS)
        .tool(Box::new(search))
        .memory(memory)
        .build()
}

pub fn triage_agent(
    model: Arc<dyn LanguageModel>,
    config: &ModelConfig,
    memory: Arc<ThreadMemory>,
    sub_agents: impl IntoIterator<Item = Arc<Agent>>,
) -> Arc<Agent> {
    let builder = configured(Agent::builder(TRIAGE_AGENT, model), config)
        .name("Triage Agent")
        .description("General assistant that routes work to specialist agents.")
        .instructions(TRIAGE_INSTRUCTIONS)
        .tool(Box::new(GenerateArtifact))
        .memory(memory);
    sub_agents
        .into_iter()
        .fold(builder, |b, sub| b.sub_agent(sub))
        .build()
}

/// All variants sharing one thread memory. The triage agent delegates to the
/// same Azure and web instances that are returned alongside it, so a call
/// parked by either is visible whichever id the client selected.
pub fn standard_agents(model: Arc<dyn LanguageModel>, config: &ModelConfig) -> Vec<Arc<Agent>> {
    let memory = Arc::new(ThreadMemory::new());
    let azure = azure_agent(model.clone(), config, memory.clone());
    let web = web_agent(model.clone(), config, memory.clone(), SearchWeb::from_env());
    let triage = triage_agent(model, config, memory, [azure.clone(), web.clone()]);
    vec![triage, azure, web]
}

fn configured(builder: AgentBuilder, config: &ModelConfig) -> AgentBuilder {
    builder
        .model_name(config.name.clone())
        .max_tokens(config.max_tokens)
        .thinking_budget(config.thinking_budget)
        .max_steps(config.max_steps)
}
