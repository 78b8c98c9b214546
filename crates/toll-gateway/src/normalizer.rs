use chrono::Utc;
use tracing::debug;

use toll_types::{Decision, PendingApproval, RawEvent, RunHandle, WireEvent};

use crate::approval::ApprovalGate;

/// Maps one raw event of a segment to at most one wire event.
///
/// Delegation wrappers are stripped recursively; the agent ids they carry only
/// feed the owner path of parked calls.
pub struct Normalizer<'a> {
    gate: &'a ApprovalGate,
    run: &'a RunHandle,
}

impl<'a> Normalizer<'a> {
    pub fn new(gate: &'a ApprovalGate, run: &'a RunHandle) -> Self {
        Self { gate, run }
    }

    pub fn normalize(&self, raw: RawEvent) -> Option<WireEvent> {
        self.normalize_at(raw, vec![self.run.agent_id.clone()])
    }

    fn normalize_at(&self, raw: RawEvent, mut path: Vec<String>) -> Option<WireEvent> {
        match raw {
            RawEvent::Delegated { agent_id, event } => {
                path.push(agent_id);
                self.normalize_at(*event, path)
            }
            RawEvent::TextDelta { text } if !text.is_empty() => Some(WireEvent::Text { text }),
            RawEvent::ReasoningDelta { text } if !text.is_empty() => {
                Some(WireEvent::Reasoning { text })
            }
            RawEvent::ToolCall {
                tool_call_id,
                tool_name,
                ..
            } if tool_call_id.is_empty() || tool_name.is_empty() => {
                debug!(run_id = %self.run.run_id, "dropping tool call without id or name");
                None
            }
            RawEvent::ToolCall {
                tool_call_id,
                tool_name,
                args,
                requires_approval,
            } => {
                if !requires_approval {
                    return Some(WireEvent::ToolCall {
                        tool_call_id,
                        tool_name,
                        args,
                    });
                }
                match self.gate.decision_for(&self.run.run_id, &tool_call_id) {
                    Some(Decision::Approved) => Some(WireEvent::ToolCall {
                        tool_call_id,
                        tool_name,
                        args,
                    }),
                    Some(Decision::Declined) => {
                        debug!(run_id = %self.run.run_id, %tool_call_id, "dropping declined tool call");
                        None
                    }
                    None => self.park(tool_call_id, tool_name, args, path),
                }
            }
            RawEvent::ToolResult {
                tool_call_id,
                tool_name,
                ..
            } if tool_call_id.is_empty() || tool_name.is_empty() => {
                debug!(run_id = %self.run.run_id, "dropping tool result without id or name");
                None
            }
            RawEvent::ToolResult {
                tool_call_id,
                tool_name,
                result,
                ..
            } => {
                if self.gate.is_pending(&self.run.run_id, &tool_call_id) {
                    debug!(run_id = %self.run.run_id, %tool_call_id, "dropping result of a parked call");
                    return None;
                }
                self.gate.settle(&self.run.run_id, &tool_call_id);
                Some(WireEvent::ToolResult {
                    tool_call_id,
                    tool_name,
                    result,
                })
            }
            RawEvent::Unknown => {
                debug!(run_id = %self.run.run_id, "dropping unrecognized raw event");
                None
            }
            RawEvent::TextDelta { .. }
            | RawEvent::ReasoningDelta { .. }
            | RawEvent::Start { .. }
            | RawEvent::StepFinish { .. } => None,
        }
    }

    fn park(
        &self,
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
        owner_path: Vec<String>,
    ) -> Option<WireEvent> {
        let parked = self.gate.park(PendingApproval {
            run_id: self.run.run_id.clone(),
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            args: args.clone(),
            owner_path,
            requested_at: Utc::now(),
        });
        if !parked {
            debug!(run_id = %self.run.run_id, %tool_call_id, "call already parked");
            return None;
        }
        Some(WireEvent::ApprovalRequest {
            tool_call_id,
            tool_name,
            args,
            run_id: self.run.run_id.clone(),
        })
    }
}
