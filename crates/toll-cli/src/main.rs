use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toll_agent::{catalog, AnthropicClient, LanguageModel};
use toll_gateway::config;
use toll_gateway::{AgentRegistry, Gateway};
use toll_types::config::TollConfig;

#[derive(Parser)]
#[command(name = "tollgate", version, about = "tollgate: streams agent runs over HTTP and parks sensitive tool calls for approval")]
struct Cli {
    /// Config file (defaults to ~/.tollgate/config.toml)
    #[arg(long, global = true, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long, env = "TOLLGATE_HOST")]
        host: Option<String>,
        #[arg(long, env = "TOLLGATE_PORT")]
        port: Option<u16>,
    },
    /// Show current status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let cfg = config::load_config_from(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper_util=warn,hyper=warn,reqwest=warn,h2=warn,rustls=warn",
            cfg.server.log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => serve(cfg, host, port).await,
        Commands::Status => {
            println!("tollgate v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Listen: {}:{}", cfg.server.host, cfg.server.port);
            println!("Default agent: {}", cfg.agents.default_agent);
            println!("Model: {}", cfg.model.name);
            match cfg.model.thinking_budget {
                Some(budget) => println!("Thinking: {budget} tokens"),
                None => println!("Thinking: off"),
            }
            println!(
                "API Key: {}",
                if config::anthropic_api_key(&cfg).is_some() { "configured" } else { "not set" }
            );
            println!(
                "Web search: {}",
                if std::env::var("PARALLEL_API_KEY").is_ok() { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}

async fn serve(cfg: TollConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let api_key = config::anthropic_api_key(&cfg).context(
        "No Anthropic API key: set ANTHROPIC_API_KEY or model.api_key in the config file",
    )?;
    let mut client = AnthropicClient::new(api_key);
    if let Some(url) = cfg.model.base_url.clone() {
        client = client.with_base_url(url);
    }
    let model: Arc<dyn LanguageModel> = Arc::new(client);

    let agents = catalog::standard_agents(model, &cfg.model);
    let registry = AgentRegistry::with_agents(cfg.agents.default_agent.clone(), agents);
    if registry.get(registry.default_id()).is_none() {
        anyhow::bail!(
            "default agent '{}' is not one of: {}",
            registry.default_id(),
            registry.ids().join(", ")
        );
    }
    let gateway = Arc::new(Gateway::new(Arc::new(registry)));

    let addr = format!(
        "{}:{}",
        host.unwrap_or(cfg.server.host),
        port.unwrap_or(cfg.server.port)
    );
    info!(model = %cfg.model.name, default_agent = %cfg.agents.default_agent, "starting tollgate");
    toll_gateway::http::serve(gateway, &addr, cfg.server.cors_allow_any).await
}
