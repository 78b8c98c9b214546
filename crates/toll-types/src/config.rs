use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Allow browser clients from any origin.
    pub cors_allow_any: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub max_tokens: u32,
    /// Extended thinking budget in tokens, streamed as reasoning. Unset
    /// leaves thinking off.
    pub thinking_budget: Option<u32>,
    /// Upper bound on model calls within one execution segment.
    pub max_steps: usize,
    /// Optional API key stored in config (env var takes priority at runtime).
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Agent variant used when a request names none or an unknown one.
    pub default_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            cors_allow_any: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            thinking_budget: None,
            max_steps: 10,
            api_key: None,
            base_url: None,
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_agent: "triage-agent".to_string(),
        }
    }
}
