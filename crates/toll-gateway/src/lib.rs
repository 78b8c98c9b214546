pub mod approval;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flatten;
pub mod http;
pub mod normalizer;
pub mod registry;
pub mod session;

pub use approval::ApprovalGate;
pub use error::GatewayError;
pub use flatten::{SegmentOutcome, WireStream};
pub use registry::AgentRegistry;
pub use session::SessionDirectory;

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use toll_agent::{Agent, RawEventStream};
use toll_types::{Decision, RunHandle, Session, SessionStatus};

use dispatch::ResumeDispatcher;

/// Body of `POST /chat`. Fields are optional so that missing ones surface as
/// `InvalidRequest` rather than an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: Option<String>,
    pub chat_id: Option<String>,
    pub agent_id: Option<String>,
}

/// Body of `POST /chat/approve`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub run_id: Option<String>,
    pub tool_call_id: Option<String>,
    pub approved: Option<bool>,
    pub chat_id: Option<String>,
    pub agent_id: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest(format!("{field} is required")))
}

/// The streaming approval gateway: routes requests to agents and turns their
/// raw output into wire events.
pub struct Gateway {
    registry: Arc<AgentRegistry>,
    sessions: Arc<SessionDirectory>,
    gate: Arc<ApprovalGate>,
    dispatcher: ResumeDispatcher,
}

impl Gateway {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        let gate = Arc::new(ApprovalGate::new());
        Self {
            registry,
            sessions: Arc::new(SessionDirectory::new()),
            dispatcher: ResumeDispatcher::new(Arc::clone(&gate)),
            gate,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionDirectory> {
        &self.sessions
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// Start a segment for a new user message.
    pub fn chat(&self, request: ChatRequest) -> Result<WireStream, GatewayError> {
        let message = required(request.message, "message")?;
        let thread_id = required(request.chat_id, "chatId")?;

        let session = self
            .sessions
            .resolve(&thread_id, request.agent_id.as_deref(), &self.registry)?;
        let agent = self.agent_for(&session)?;
        let run = RunHandle::new(thread_id, agent.id.clone());
        info!(run_id = %run.run_id, thread_id = %run.thread_id, agent = %agent.id, "chat segment");

        self.sessions.begin_segment(&run.thread_id);
        let raw = agent.stream(run.clone(), message);
        Ok(self.relay(raw, run, None, agent))
    }

    /// Apply a decision to a parked call and stream the resumed segment.
    pub fn approve(&self, request: ApproveRequest) -> Result<WireStream, GatewayError> {
        let run_id = required(request.run_id, "runId")?;
        let tool_call_id = required(request.tool_call_id, "toolCallId")?;
        let thread_id = required(request.chat_id, "chatId")?;
        let approved = request
            .approved
            .ok_or_else(|| GatewayError::InvalidRequest("approved is required".to_string()))?;

        let session = match self.sessions.get(&thread_id) {
            Some(session) => session,
            None => self
                .sessions
                .resolve(&thread_id, request.agent_id.as_deref(), &self.registry)?,
        };
        let root = self.agent_for(&session)?;
        let decision = Decision::from_approved(approved);

        let (_, raw) = self
            .dispatcher
            .dispatch(&root, &run_id, &tool_call_id, decision)?;
        let run = RunHandle::resumed(run_id, thread_id, root.id.clone());
        info!(run_id = %run.run_id, %tool_call_id, %decision, "approval segment");

        self.sessions.begin_segment(&run.thread_id);
        Ok(self.relay(raw, run, Some(tool_call_id), root))
    }

    fn agent_for(&self, session: &Session) -> Result<Arc<Agent>, GatewayError> {
        self.registry
            .get(&session.selected_agent_id)
            .ok_or_else(|| {
                GatewayError::Internal(format!(
                    "agent '{}' is not registered",
                    session.selected_agent_id
                ))
            })
    }

    fn relay(
        &self,
        raw: RawEventStream,
        run: RunHandle,
        claimed: Option<String>,
        root: Arc<Agent>,
    ) -> WireStream {
        let gate = Arc::clone(&self.gate);
        let sessions = Arc::clone(&self.sessions);
        let run_id = run.run_id.clone();
        let thread_id = run.thread_id.clone();

        flatten::flatten(raw, Arc::clone(&self.gate), run, claimed, move |outcome| {
            let status = match outcome {
                SegmentOutcome::Failed => {
                    gate.discard_run(&run_id);
                    root.discard_run(&run_id);
                    SessionStatus::Idle
                }
                SegmentOutcome::Finished if gate.pending_for_run(&run_id).is_empty() => {
                    SessionStatus::Idle
                }
                SegmentOutcome::Finished => SessionStatus::AwaitingApproval,
            };
            sessions.set_status(&thread_id, status);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use toll_agent::tools::delete_vm::DeleteVm;
    use toll_agent::{ScriptedModel, ScriptedTurn};
    use toll_types::WireEvent;

    fn gateway(turns: Vec<ScriptedTurn>) -> Gateway {
        let agent = Agent::builder("azure-agent", Arc::new(ScriptedModel::sequence(turns)))
            .tool(Box::new(DeleteVm))
            .build();
        Gateway::new(Arc::new(AgentRegistry::with_agents("azure-agent", [agent])))
    }

    fn chat(message: &str) -> ChatRequest {
        ChatRequest {
            message: Some(message.into()),
            chat_id: Some("t1".into()),
            agent_id: None,
        }
    }

    fn parked_run_id(events: &[WireEvent]) -> String {
        match &events[0] {
            WireEvent::ApprovalRequest { run_id, .. } => run_id.clone(),
            other => panic!("expected approval request, got {other:?}"),
        }
    }

    #[test]
    fn missing_fields_are_rejected_before_execution() {
        let gw = gateway(vec![]);
        let err = gw
            .chat(ChatRequest {
                chat_id: Some("t1".into()),
                ..Default::default()
            })
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::InvalidRequest(ref m) if m == "message is required"));
        assert!(gw.sessions().is_empty());

        let err = gw
            .approve(ApproveRequest {
                run_id: Some("r".into()),
                tool_call_id: Some("c".into()),
                chat_id: Some("t1".into()),
                ..Default::default()
            })
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn session_tracks_parked_segment() {
        let gw = gateway(vec![ScriptedTurn::tool("c1", "delete_vm", json!({"name": "web-1"}))]);
        let events: Vec<_> = gw.chat(chat("delete web-1")).unwrap().collect().await;

        let run_id = parked_run_id(&events);
        let session = gw.sessions().get("t1").unwrap();
        assert_eq!(session.status, SessionStatus::AwaitingApproval);
        assert_eq!(session.segments, 1);
        assert_eq!(gw.gate().pending_for_run(&run_id).len(), 1);
    }

    fn decide(run_id: &str, tool_call_id: &str, approved: bool) -> ApproveRequest {
        ApproveRequest {
            run_id: Some(run_id.into()),
            tool_call_id: Some(tool_call_id.into()),
            approved: Some(approved),
            chat_id: Some("t1".into()),
            agent_id: None,
        }
    }

    #[tokio::test]
    async fn back_to_back_decisions_for_sibling_calls_both_resolve() {
        let gw = gateway(vec![
            ScriptedTurn::tool("a", "delete_vm", json!({"name": "web-1"}))
                .and_tool("b", "delete_vm", json!({"name": "web-2"})),
            ScriptedTurn::text("Both VMs are gone."),
        ]);
        let first: Vec<_> = gw.chat(chat("delete both")).unwrap().collect().await;
        let run_id = parked_run_id(&first);
        assert_eq!(gw.gate().pending_for_run(&run_id).len(), 2);

        // Both decisions arrive before either resumed segment has run.
        let a = gw.approve(decide(&run_id, "a", true)).unwrap();
        let b = gw.approve(decide(&run_id, "b", true)).unwrap();
        let (a, b) = tokio::join!(a.collect::<Vec<_>>(), b.collect::<Vec<_>>());

        let events: Vec<_> = a.iter().chain(b.iter()).collect();
        assert!(!events.iter().any(|e| e.kind() == "error"));
        assert_eq!(events.iter().filter(|e| e.kind() == "tool-result").count(), 2);
        assert_eq!(
            events.iter().filter(|e| **e == &WireEvent::text("Both VMs are gone.")).count(),
            1
        );
        assert!(gw.gate().is_empty());
        assert_eq!(gw.registry().get("azure-agent").unwrap().parked_runs(), 0);
        assert_eq!(gw.sessions().get("t1").unwrap().status, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn failed_segment_tears_down_the_run() {
        let gw = gateway(vec![
            ScriptedTurn::tool("c1", "delete_vm", json!({"name": "web-1"})),
        ]);
        let first: Vec<_> = gw.chat(chat("delete web-1")).unwrap().collect().await;
        let run_id = parked_run_id(&first);

        // The script is exhausted, so the resumed model step fails.
        let resumed: Vec<_> = gw
            .approve(ApproveRequest {
                run_id: Some(run_id.clone()),
                tool_call_id: Some("c1".into()),
                approved: Some(true),
                chat_id: Some("t1".into()),
                agent_id: None,
            })
            .unwrap()
            .collect()
            .await;
        let kinds: Vec<_> = resumed.iter().map(WireEvent::kind).collect();
        assert_eq!(kinds, ["tool-call", "tool-result", "error", "finish"]);
        assert!(gw.gate().is_empty());
        assert_eq!(gw.gate().decision_for(&run_id, "c1"), None);
        assert_eq!(gw.sessions().get("t1").unwrap().status, SessionStatus::Idle);
    }
}
