#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no pending approval for tool call {tool_call_id} in run {run_id}")]
    StaleApproval { run_id: String, tool_call_id: String },
    #[error("no agent holds tool call {tool_call_id} of run {run_id}")]
    UnresolvableApproval { run_id: String, tool_call_id: String },
    #[error("internal error: {0}")]
    Internal(String),
}
