use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifies one execution segment: a request that advances a thread, or a
/// decision that resumes a parked run. Resumed segments keep the run id of
/// the run they continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub run_id: String,
    pub thread_id: String,
    pub agent_id: String,
}

impl RunHandle {
    /// A fresh run for a new user message.
    pub fn new(thread_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
        }
    }

    /// A segment continuing an existing run after an approval decision.
    pub fn resumed(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

/// Human verdict on a parked tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Approved,
    Declined,
}

impl Decision {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Declined
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Declined => write!(f, "declined"),
        }
    }
}

/// A tool call waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub run_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    /// Agent ids from the root to the agent that issued the call.
    pub owner_path: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

impl PendingApproval {
    /// The agent instance holding the parked call.
    pub fn owner(&self) -> Option<&str> {
        self.owner_path.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumed_handle_keeps_run_id() {
        let first = RunHandle::new("t1", "triage-agent");
        let resumed = RunHandle::resumed(first.run_id.clone(), "t1", "triage-agent");
        assert_eq!(first, resumed);
        assert_ne!(first.run_id, RunHandle::new("t1", "triage-agent").run_id);
    }

    #[test]
    fn owner_is_last_path_segment() {
        let pending = PendingApproval {
            run_id: "r".into(),
            tool_call_id: "c".into(),
            tool_name: "delete_vm".into(),
            args: Value::Null,
            owner_path: vec!["triage-agent".into(), "azure-agent".into()],
            requested_at: Utc::now(),
        };
        assert_eq!(pending.owner(), Some("azure-agent"));
    }
}
