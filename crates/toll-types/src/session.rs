use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread and the agent variant serving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub thread_id: String,
    pub selected_agent_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Execution segments started on this thread so far.
    pub segments: u64,
}

impl Session {
    pub fn new(thread_id: impl Into<String>, selected_agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            selected_agent_id: selected_agent_id.into(),
            status: SessionStatus::Idle,
            created_at: now,
            updated_at: now,
            segments: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Idle,
    Streaming,
    AwaitingApproval,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::AwaitingApproval => write!(f, "awaiting-approval"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "streaming" => Ok(Self::Streaming),
            "awaiting-approval" => Ok(Self::AwaitingApproval),
            _ => Err(anyhow::anyhow!("unknown session status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_parses_back() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Streaming,
            SessionStatus::AwaitingApproval,
        ] {
            let parsed: SessionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }
}
