use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use toll_types::{Decision, PendingApproval};

use crate::error::GatewayError;

type CallKey = (String, String);

fn key(run_id: &str, tool_call_id: &str) -> CallKey {
    (run_id.to_string(), tool_call_id.to_string())
}

/// Process-wide table of tool calls parked on a human decision.
///
/// `pending` holds calls still awaiting a decision. `decided` holds decisions
/// that were claimed but whose resumed call has not passed through yet, so the
/// normalizer lets the re-emitted call through as a plain `tool-call`.
/// Both maps are keyed by `(run_id, tool_call_id)` and lock per key.
#[derive(Default)]
pub struct ApprovalGate {
    pending: DashMap<CallKey, PendingApproval>,
    decided: DashMap<CallKey, Decision>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly parked call. Returns `false` if it was already parked.
    pub fn park(&self, pending: PendingApproval) -> bool {
        match self
            .pending
            .entry(key(&pending.run_id, &pending.tool_call_id))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                info!(
                    run_id = %pending.run_id,
                    tool_call_id = %pending.tool_call_id,
                    tool = %pending.tool_name,
                    owner = ?pending.owner(),
                    "tool call parked for approval"
                );
                slot.insert(pending);
                true
            }
        }
    }

    pub fn is_pending(&self, run_id: &str, tool_call_id: &str) -> bool {
        self.pending.contains_key(&key(run_id, tool_call_id))
    }

    pub fn decision_for(&self, run_id: &str, tool_call_id: &str) -> Option<Decision> {
        self.decided.get(&key(run_id, tool_call_id)).map(|d| *d)
    }

    /// Consume the pending entry and record the decision. A second claim of the
    /// same call fails with `StaleApproval`.
    pub fn claim(
        &self,
        run_id: &str,
        tool_call_id: &str,
        decision: Decision,
    ) -> Result<PendingApproval, GatewayError> {
        let key = key(run_id, tool_call_id);
        match self.pending.remove(&key) {
            Some((key, pending)) => {
                info!(run_id, tool_call_id, %decision, "approval claimed");
                self.decided.insert(key, decision);
                Ok(pending)
            }
            None => {
                warn!(run_id, tool_call_id, "decision for unknown or already decided call");
                Err(GatewayError::StaleApproval {
                    run_id: run_id.to_string(),
                    tool_call_id: tool_call_id.to_string(),
                })
            }
        }
    }

    /// Undo a claim whose owner could not be found.
    pub fn restore(&self, pending: PendingApproval) {
        let key = key(&pending.run_id, &pending.tool_call_id);
        self.decided.remove(&key);
        self.pending.insert(key, pending);
    }

    /// Forget the decision for a call once its outcome has been relayed.
    pub fn settle(&self, run_id: &str, tool_call_id: &str) -> Option<Decision> {
        self.decided
            .remove(&key(run_id, tool_call_id))
            .map(|(_, d)| d)
    }

    /// Calls of `run_id` still awaiting a decision, oldest first.
    pub fn pending_for_run(&self, run_id: &str) -> Vec<PendingApproval> {
        let mut parked: Vec<_> = self
            .pending
            .iter()
            .filter(|e| e.key().0 == run_id)
            .map(|e| e.value().clone())
            .collect();
        parked.sort_by_key(|p| p.requested_at);
        parked
    }

    /// Tear down every trace of a run.
    pub fn discard_run(&self, run_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|k, _| k.0 != run_id);
        self.decided.retain(|k, _| k.0 != run_id);
        let dropped = before.saturating_sub(self.pending.len());
        if dropped > 0 {
            warn!(run_id, dropped, "discarded parked approvals");
        }
        dropped
    }

    /// Number of calls awaiting a decision.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
