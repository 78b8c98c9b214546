use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use toll_types::{Session, SessionStatus};

use crate::error::GatewayError;
use crate::registry::AgentRegistry;

/// Thread id to session, shared by every request on the process.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: DashMap<String, Session>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the session for `thread_id`.
    ///
    /// A registered `requested` agent re-selects the session's agent; an
    /// unknown or absent one keeps the current selection, or the registry
    /// default for a new thread.
    pub fn resolve(
        &self,
        thread_id: &str,
        requested: Option<&str>,
        registry: &AgentRegistry,
    ) -> Result<Session, GatewayError> {
        let explicit = requested.and_then(|id| registry.get(id));
        let mut entry = match self.sessions.get_mut(thread_id) {
            Some(entry) => entry,
            None => {
                let agent = registry.resolve(requested).ok_or_else(|| {
                    GatewayError::Internal(format!(
                        "default agent '{}' is not registered",
                        registry.default_id()
                    ))
                })?;
                info!(thread_id, agent = %agent.id, "session created");
                self.sessions
                    .entry(thread_id.to_string())
                    .or_insert_with(|| Session::new(thread_id, agent.id.clone()))
            }
        };

        if let Some(agent) = explicit {
            if entry.selected_agent_id != agent.id {
                info!(thread_id, from = %entry.selected_agent_id, to = %agent.id, "session agent re-selected");
                entry.selected_agent_id = agent.id.clone();
                entry.updated_at = Utc::now();
            }
        }
        Ok(entry.clone())
    }

    pub fn get(&self, thread_id: &str) -> Option<Session> {
        self.sessions.get(thread_id).map(|s| s.value().clone())
    }

    /// Mark a new execution segment on the thread.
    pub fn begin_segment(&self, thread_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(thread_id) {
            session.status = SessionStatus::Streaming;
            session.segments += 1;
            session.updated_at = Utc::now();
        }
    }

    pub fn set_status(&self, thread_id: &str, status: SessionStatus) {
        if let Some(mut session) = self.sessions.get_mut(thread_id) {
            session.status = status;
            session.updated_at = Utc::now();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forget every session.
    pub fn reset(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toll_agent::{Agent, ScriptedModel};

    fn registry() -> AgentRegistry {
        let model: Arc<dyn toll_agent::LanguageModel> = Arc::new(ScriptedModel::sequence([]));
        AgentRegistry::with_agents(
            "triage-agent",
            ["triage-agent", "azure-agent"].map(|id| Agent::builder(id, model.clone()).build()),
        )
    }

    #[test]
    fn explicit_agent_reselects_unknown_keeps() {
        let dir = SessionDirectory::new();
        let registry = registry();

        let s = dir.resolve("t1", None, &registry).unwrap();
        assert_eq!(s.selected_agent_id, "triage-agent");
        assert_eq!(s.status, SessionStatus::Idle);

        let s = dir.resolve("t1", Some("azure-agent"), &registry).unwrap();
        assert_eq!(s.selected_agent_id, "azure-agent");

        let s = dir.resolve("t1", Some("ghost-agent"), &registry).unwrap();
        assert_eq!(s.selected_agent_id, "azure-agent");
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn segments_and_status_are_tracked() {
        let dir = SessionDirectory::new();
        dir.resolve("t1", None, &registry()).unwrap();
        dir.begin_segment("t1");
        dir.set_status("t1", SessionStatus::AwaitingApproval);

        let s = dir.get("t1").unwrap();
        assert_eq!(s.segments, 1);
        assert_eq!(s.status, SessionStatus::AwaitingApproval);

        dir.reset();
        assert!(dir.is_empty());
    }

    #[test]
    fn empty_registry_is_an_internal_error() {
        let dir = SessionDirectory::new();
        let registry = AgentRegistry::new("triage-agent");
        assert!(matches!(
            dir.resolve("t1", None, &registry),
            Err(GatewayError::Internal(_))
        ));
    }
}
