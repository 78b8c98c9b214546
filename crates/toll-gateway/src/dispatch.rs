use std::sync::Arc;

use tracing::{info, warn};

use toll_agent::{Agent, RawEventStream};
use toll_types::{Decision, PendingApproval};

use crate::approval::ApprovalGate;
use crate::error::GatewayError;

/// Routes a decision to the agent instance holding the parked call.
pub struct ResumeDispatcher {
    gate: Arc<ApprovalGate>,
}

impl ResumeDispatcher {
    pub fn new(gate: Arc<ApprovalGate>) -> Self {
        Self { gate }
    }

    /// Claim the parked call, then offer the decision to the root and, failing
    /// that, to each of its direct sub-agents in order. The first agent that
    /// holds the call resumes it.
    ///
    /// If nobody holds it the claim is rolled back so a corrected request can
    /// still reach it.
    pub fn dispatch(
        &self,
        root: &Arc<Agent>,
        run_id: &str,
        tool_call_id: &str,
        decision: Decision,
    ) -> Result<(PendingApproval, RawEventStream), GatewayError> {
        let pending = self.gate.claim(run_id, tool_call_id, decision)?;

        let candidates = std::iter::once(root).chain(root.sub_agents());
        for agent in candidates {
            if let Some(stream) = agent.resume(run_id, tool_call_id, decision) {
                info!(
                    run_id,
                    tool_call_id,
                    agent = %agent.id,
                    owner = ?pending.owner(),
                    "decision dispatched"
                );
                return Ok((pending, stream));
            }
        }

        warn!(run_id, tool_call_id, root = %root.id, "no agent holds the parked call");
        self.gate.restore(pending);
        Err(GatewayError::UnresolvableApproval {
            run_id: run_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use serde_json::json;
    use toll_agent::tools::delete_vm::DeleteVm;
    use toll_agent::{ScriptedModel, ScriptedTurn};
    use toll_types::{RawEvent, RunHandle};

    fn parked(run_id: &str, owner_path: &[&str]) -> PendingApproval {
        PendingApproval {
            run_id: run_id.into(),
            tool_call_id: "c1".into(),
            tool_name: "delete_vm".into(),
            args: json!({"name": "web-1"}),
            owner_path: owner_path.iter().map(|s| s.to_string()).collect(),
            requested_at: Utc::now(),
        }
    }

    fn tree() -> (Arc<Agent>, Arc<Agent>) {
        let azure = Agent::builder(
            "azure-agent",
            Arc::new(ScriptedModel::sequence([
                ScriptedTurn::tool("c1", "delete_vm", json!({"name": "web-1"})),
                ScriptedTurn::text("Deleted."),
            ])),
        )
        .tool(Box::new(DeleteVm))
        .build();
        let triage = Agent::builder(
            "triage-agent",
            Arc::new(ScriptedModel::sequence([ScriptedTurn::tool(
                "d1",
                "agent-azure-agent",
                json!({"prompt": "delete web-1"}),
            )])),
        )
        .sub_agent(azure.clone())
        .build();
        (triage, azure)
    }

    #[tokio::test]
    async fn finds_call_held_by_sub_agent() {
        let (triage, azure) = tree();
        let run = RunHandle::new("t1", "triage-agent");
        let _: Vec<_> = triage.stream(run.clone(), "delete web-1".into()).collect().await;
        assert!(azure.holds(&run.run_id, "c1"));

        let gate = Arc::new(ApprovalGate::new());
        gate.park(parked(&run.run_id, &["triage-agent", "azure-agent"]));
        let dispatcher = ResumeDispatcher::new(gate.clone());

        let (pending, stream) = dispatcher
            .dispatch(&triage, &run.run_id, "c1", Decision::Approved)
            .unwrap();
        assert_eq!(pending.owner(), Some("azure-agent"));

        let events: Vec<_> = stream.map(|e| e.unwrap()).collect().await;
        assert!(events.iter().all(|e| e.depth() == 1));
        assert!(events.iter().any(|e| matches!(e.innermost(), RawEvent::ToolResult { .. })));
        assert!(gate.is_empty());
    }

    #[tokio::test]
    async fn unknown_pair_is_stale() {
        let (triage, _) = tree();
        let dispatcher = ResumeDispatcher::new(Arc::new(ApprovalGate::new()));
        assert!(matches!(
            dispatcher.dispatch(&triage, "r-none", "c1", Decision::Approved),
            Err(GatewayError::StaleApproval { .. })
        ));
    }

    #[test]
    fn unheld_call_is_unresolvable_and_stays_parked() {
        let (triage, _) = tree();
        let gate = Arc::new(ApprovalGate::new());
        gate.park(parked("r1", &["triage-agent"]));
        let dispatcher = ResumeDispatcher::new(gate.clone());

        assert!(matches!(
            dispatcher.dispatch(&triage, "r1", "c1", Decision::Declined),
            Err(GatewayError::UnresolvableApproval { .. })
        ));
        assert!(gate.is_pending("r1", "c1"));
    }
}
