use crate::llm::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("agent {agent} exceeded its limit of {limit} steps")]
    StepLimit { agent: String, limit: usize },
}
