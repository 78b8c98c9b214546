use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::json;
use tracing::{error, info};

use toll_types::message::Message;
use toll_types::{Decision, RawEvent, RunHandle};

use crate::agent_loop::{self, SegmentEnd};
use crate::llm::{ChatMessage, LanguageModel, ModelRequest, ToolDefinition};
use crate::memory::ThreadMemory;
use crate::sink::{EventSink, RawEventStream};
use crate::suspend::{RunState, SuspendedRuns};
use crate::tools::{ToolExecutor, ToolRegistry};

const EVENT_BUFFER: usize = 256;
const DELEGATE_PREFIX: &str = "agent-";

/// A model-driven agent with its own tools and optional delegated sub-agents.
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    instructions: String,
    model_name: String,
    max_tokens: u32,
    thinking_budget: Option<u32>,
    max_steps: usize,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    sub_agents: Vec<Arc<Agent>>,
    memory: Arc<ThreadMemory>,
    suspended: SuspendedRuns,
}

impl Agent {
    pub fn builder(id: impl Into<String>, model: Arc<dyn LanguageModel>) -> AgentBuilder {
        let id = id.into();
        AgentBuilder {
            name: id.clone(),
            id,
            description: String::new(),
            instructions: String::new(),
            model_name: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            thinking_budget: None,
            max_steps: 10,
            model,
            tools: ToolRegistry::new(),
            sub_agents: Vec::new(),
            memory: None,
        }
    }

    /// Start a new segment for a user message on `run.thread_id`.
    ///
    /// The thread history is replayed to the model; the user message and the
    /// final assistant text are appended to memory.
    pub fn stream(self: &Arc<Self>, run: RunHandle, message: String) -> RawEventStream {
        let (sink, stream) = EventSink::channel(EVENT_BUFFER);
        let agent = Arc::clone(self);

        tokio::spawn(async move {
            sink.emit(RawEvent::Start {
                run_id: run.run_id.clone(),
                agent_id: agent.id.clone(),
            })
            .await;

            let mut messages = agent_loop::history_to_chat(&agent.memory.history(&run.thread_id));
            messages.push(ChatMessage::user_text(message.clone()));
            agent.memory.append(Message::user(run.thread_id.clone(), message));

            let thread_id = run.thread_id.clone();
            let state = RunState::new(run, Vec::new(), messages);
            match agent_loop::run_steps(&agent, state, &sink).await {
                Ok(end) => agent.remember(&thread_id, &end),
                Err(e) => {
                    error!(agent = %agent.id, error = %e, "agent run failed");
                    sink.fail(e).await;
                }
            }
        });

        stream
    }

    /// Continue a parked run with a decision on one of its calls.
    ///
    /// Returns `None` when this agent holds no snapshot awaiting the call.
    pub fn resume(
        self: &Arc<Self>,
        run_id: &str,
        tool_call_id: &str,
        decision: Decision,
    ) -> Option<RawEventStream> {
        let claimed = self.suspended.claim_call(run_id, tool_call_id)?;
        let (sink, stream) = EventSink::channel_at(EVENT_BUFFER, claimed.path.clone());
        let agent = Arc::clone(self);

        tokio::spawn(async move {
            let thread_id = claimed.run.thread_id.clone();
            match agent_loop::resume_steps(&agent, claimed, decision, &sink).await {
                Ok(end) => agent.remember(&thread_id, &end),
                Err(e) => {
                    error!(agent = %agent.id, error = %e, "resumed run failed");
                    sink.fail(e).await;
                }
            }
        });

        Some(stream)
    }

    /// Run as a delegate of a parent agent, sharing the parent's run id and
    /// emitting through the parent's sink.
    pub(crate) fn run_delegated(
        self: &Arc<Self>,
        parent: &RunHandle,
        prompt: String,
        sink: EventSink,
    ) -> BoxFuture<'static, Result<SegmentEnd, crate::AgentError>> {
        let agent = Arc::clone(self);
        let run = RunHandle::resumed(
            parent.run_id.clone(),
            parent.thread_id.clone(),
            self.id.clone(),
        );
        Box::pin(async move {
            info!(agent = %agent.id, run_id = %run.run_id, "delegated run");
            let state = RunState::new(run, sink.path().to_vec(), vec![ChatMessage::user_text(prompt)]);
            agent_loop::run_steps(&agent, state, &sink).await
        })
    }

    pub fn holds(&self, run_id: &str, tool_call_id: &str) -> bool {
        self.suspended.holds(run_id, tool_call_id)
    }

    /// Drop every snapshot of `run_id` here and in all sub-agents.
    pub fn discard_run(&self, run_id: &str) {
        if self.suspended.discard(run_id) {
            info!(agent = %self.id, run_id, "discarded parked run");
        }
        for sub in &self.sub_agents {
            sub.discard_run(run_id);
        }
    }

    pub fn parked_runs(&self) -> usize {
        self.suspended.len()
    }

    pub fn sub_agents(&self) -> &[Arc<Agent>] {
        &self.sub_agents
    }

    pub fn memory(&self) -> &Arc<ThreadMemory> {
        &self.memory
    }

    pub(crate) fn model(&self) -> &dyn LanguageModel {
        self.model.as_ref()
    }

    pub(crate) fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub(crate) fn suspended(&self) -> &SuspendedRuns {
        &self.suspended
    }

    pub(crate) fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub(crate) fn delegate_for(&self, tool_name: &str) -> Option<&Arc<Agent>> {
        let id = tool_name.strip_prefix(DELEGATE_PREFIX)?;
        self.sub_agents.iter().find(|a| a.id == id)
    }

    pub fn system_prompt(&self) -> String {
        self.instructions
            .replace("{{datetime}}", &Utc::now().to_rfc3339())
    }

    /// Own tools followed by one `agent-<id>` tool per sub-agent.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions();
        defs.extend(self.sub_agents.iter().map(|sub| ToolDefinition {
            name: format!("{DELEGATE_PREFIX}{}", sub.id),
            description: sub.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The task to hand to this agent" }
                },
                "required": ["prompt"]
            }),
        }));
        defs
    }

    pub(crate) fn request(&self, messages: Vec<ChatMessage>) -> ModelRequest {
        ModelRequest {
            model: self.model_name.clone(),
            max_tokens: self.max_tokens,
            system: self.system_prompt(),
            messages,
            tools: self.tool_definitions(),
            thinking_budget: self.thinking_budget,
        }
    }

    fn remember(&self, thread_id: &str, end: &SegmentEnd) {
        let text = end.text();
        if !text.trim().is_empty() {
            self.memory.append(Message::assistant(thread_id, text));
        }
    }
}

pub struct AgentBuilder {
    id: String,
    name: String,
    description: String,
    instructions: String,
    model_name: String,
    max_tokens: u32,
    thinking_budget: Option<u32>,
    max_steps: usize,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    sub_agents: Vec<Arc<Agent>>,
    memory: Option<Arc<ThreadMemory>>,
}

impl AgentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// System prompt; `{{datetime}}` is replaced with the current UTC time.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn tool(mut self, tool: Box<dyn ToolExecutor>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn sub_agent(mut self, agent: Arc<Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn memory(mut self, memory: Arc<ThreadMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Arc<Agent> {
        Arc::new(Agent {
            id: self.id,
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            model_name: self.model_name,
            max_tokens: self.max_tokens,
            thinking_budget: self.thinking_budget,
            max_steps: self.max_steps,
            model: self.model,
            tools: self.tools,
            sub_agents: self.sub_agents,
            memory: self.memory.unwrap_or_default(),
            suspended: SuspendedRuns::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ContentBlock;
    use crate::scripted::{ScriptedModel, ScriptedTurn};
    use crate::tools::{delete_vm::DeleteVm, generate_artifact::GenerateArtifact};
    use crate::AgentError;
    use futures::StreamExt;
    use toll_types::message::Role;

    async fn collect(stream: RawEventStream) -> Vec<Result<RawEvent, AgentError>> {
        stream.collect().await
    }

    fn ok_events(items: Vec<Result<RawEvent, AgentError>>) -> Vec<RawEvent> {
        items.into_iter().map(|e| e.unwrap()).collect()
    }

    fn vm_agent(model: ScriptedModel) -> Arc<Agent> {
        Agent::builder("azure-agent", Arc::new(model))
            .description("Manages Azure VMs")
            .tool(Box::new(DeleteVm))
            .build()
    }

    #[tokio::test]
    async fn plain_reply_is_streamed_and_remembered() {
        let agent = Agent::builder("triage-agent", Arc::new(ScriptedModel::sequence([
            ScriptedTurn::chunks(["Hel", "lo"]),
        ])))
        .build();
        let run = RunHandle::new("t1", "triage-agent");

        let events = ok_events(collect(agent.stream(run.clone(), "hi".into())).await);
        assert_eq!(
            events,
            vec![
                RawEvent::Start { run_id: run.run_id, agent_id: "triage-agent".into() },
                RawEvent::text("Hel"),
                RawEvent::text("lo"),
                RawEvent::StepFinish { step: 1 },
            ]
        );
        let history = agent.memory().history("t1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn gated_call_parks_then_resumes_once() {
        let agent = vm_agent(ScriptedModel::sequence([
            ScriptedTurn::tool("c1", "delete_vm", json!({"name": "web-1"})),
            ScriptedTurn::text("VM web-1 is gone."),
        ]));
        let run = RunHandle::new("t1", "azure-agent");

        let events = ok_events(collect(agent.stream(run.clone(), "delete web-1".into())).await);
        assert!(events.iter().any(|e| matches!(
            e,
            RawEvent::ToolCall { tool_call_id, requires_approval: true, .. } if tool_call_id == "c1"
        )));
        assert!(!events.iter().any(|e| matches!(e, RawEvent::ToolResult { .. })));
        assert!(agent.holds(&run.run_id, "c1"));

        let resumed = agent.resume(&run.run_id, "c1", Decision::Approved).unwrap();
        let events = ok_events(collect(resumed).await);
        assert!(matches!(&events[0], RawEvent::ToolCall { tool_call_id, .. } if tool_call_id == "c1"));
        match &events[1] {
            RawEvent::ToolResult { result, is_error, .. } => {
                assert!(!is_error);
                assert_eq!(result["status"], "success");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert_eq!(events[2], RawEvent::text("VM web-1 is gone."));

        assert!(!agent.holds(&run.run_id, "c1"));
        assert!(agent.resume(&run.run_id, "c1", Decision::Approved).is_none());
    }

    #[tokio::test]
    async fn decline_feeds_refusal_to_model_without_events() {
        let model = Arc::new(ScriptedModel::from_fn(|req| {
            match req.latest_tool_results().first() {
                Some(ContentBlock::ToolResult { is_error: true, .. }) => {
                    ScriptedTurn::text("Understood, I won't delete it.")
                }
                _ => ScriptedTurn::tool("c1", "delete_vm", json!({"name": "web-1"})),
            }
        }));
        let agent = Agent::builder("azure-agent", model.clone())
            .tool(Box::new(DeleteVm))
            .build();
        let run = RunHandle::new("t1", "azure-agent");
        collect(agent.stream(run.clone(), "delete web-1".into())).await;

        let events = ok_events(collect(agent.resume(&run.run_id, "c1", Decision::Declined).unwrap()).await);
        assert!(!events.iter().any(|e| matches!(e, RawEvent::ToolCall { .. } | RawEvent::ToolResult { .. })));
        assert!(events.contains(&RawEvent::text("Understood, I won't delete it.")));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn two_gated_calls_resume_independently() {
        let agent = vm_agent(ScriptedModel::sequence([
            ScriptedTurn::tool("a", "delete_vm", json!({"name": "web-1"}))
                .and_tool("b", "delete_vm", json!({"name": "web-2"})),
            ScriptedTurn::text("Both handled."),
        ]));
        let run = RunHandle::new("t1", "azure-agent");
        collect(agent.stream(run.clone(), "delete both".into())).await;

        let first = ok_events(collect(agent.resume(&run.run_id, "b", Decision::Approved).unwrap()).await);
        assert!(!first.iter().any(|e| matches!(e, RawEvent::TextDelta { .. })));
        assert!(agent.holds(&run.run_id, "a"));

        let second = ok_events(collect(agent.resume(&run.run_id, "a", Decision::Declined).unwrap()).await);
        assert_eq!(second.first(), Some(&RawEvent::text("Both handled.")));
        assert_eq!(agent.parked_runs(), 0);
    }

    #[tokio::test]
    async fn delegated_events_are_wrapped_and_sub_agent_holds_the_call() {
        let azure = vm_agent(ScriptedModel::sequence([ScriptedTurn::tool(
            "c1",
            "delete_vm",
            json!({"name": "web-1"}),
        )]));
        let triage = Agent::builder("triage-agent", Arc::new(ScriptedModel::sequence([
            ScriptedTurn::tool("d1", "agent-azure-agent", json!({"prompt": "delete web-1"})),
        ])))
        .sub_agent(azure.clone())
        .build();
        let run = RunHandle::new("t1", "triage-agent");

        let events = ok_events(collect(triage.stream(run.clone(), "delete web-1".into())).await);
        assert!(events.iter().any(|e| matches!(
            e,
            RawEvent::ToolCall { tool_name, .. } if tool_name == "agent-azure-agent"
        )));
        let nested = events.iter().find(|e| e.depth() == 1).unwrap();
        assert!(matches!(nested, RawEvent::Delegated { agent_id, .. } if agent_id == "azure-agent"));
        assert!(events.iter().any(|e| matches!(
            e.innermost(),
            RawEvent::ToolCall { tool_call_id, requires_approval: true, .. } if tool_call_id == "c1"
        )));

        assert!(!triage.holds(&run.run_id, "c1"));
        assert!(azure.holds(&run.run_id, "c1"));

        triage.discard_run(&run.run_id);
        assert!(!azure.holds(&run.run_id, "c1"));
    }

    #[tokio::test]
    async fn step_limit_ends_stream_with_error() {
        let agent = Agent::builder("triage-agent", Arc::new(ScriptedModel::from_fn(|_| {
            ScriptedTurn::tool("x", "generate_artifact", json!({"title": "t", "content": "c"}))
        })))
        .tool(Box::new(GenerateArtifact))
        .max_steps(2)
        .build();

        let items = collect(agent.stream(RunHandle::new("t1", "triage-agent"), "go".into())).await;
        assert!(matches!(
            items.last(),
            Some(Err(AgentError::StepLimit { limit: 2, .. }))
        ));
    }

    #[test]
    fn sub_agents_are_offered_as_tools() {
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::sequence([]));
        let web = Agent::builder("web-agent", model.clone())
            .description("Searches the web")
            .build();
        let triage = Agent::builder("triage-agent", model)
            .instructions("Now: {{datetime}}")
            .tool(Box::new(GenerateArtifact))
            .sub_agent(web)
            .build();

        let names: Vec<_> = triage.tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["generate_artifact", "agent-web-agent"]);
        assert!(!triage.system_prompt().contains("{{datetime}}"));
        assert!(triage.delegate_for("agent-web-agent").is_some());
        assert!(triage.delegate_for("web-agent").is_none());
    }
}
