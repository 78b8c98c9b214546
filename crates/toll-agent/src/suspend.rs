use dashmap::DashMap;

use toll_types::message::ToolCall;
use toll_types::RunHandle;

use crate::llm::{ChatMessage, ContentBlock};

/// Snapshot of an agent run stopped on one or more gated tool calls.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run: RunHandle,
    /// Delegation path from the root to this agent; empty for the root itself.
    pub path: Vec<String>,
    /// Conversation up to and including the assistant turn that issued the calls.
    pub messages: Vec<ChatMessage>,
    /// Gated calls of the current step still waiting for a decision.
    pub awaiting: Vec<ToolCall>,
    /// Decided calls of the current step still executing.
    pub in_flight: Vec<String>,
    /// Results already produced for the current step.
    pub resolved: Vec<ContentBlock>,
    pub step: usize,
    /// Assistant text produced so far in the current segment.
    pub text: String,
}

impl RunState {
    pub fn new(run: RunHandle, path: Vec<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            run,
            path,
            messages,
            awaiting: Vec::new(),
            in_flight: Vec::new(),
            resolved: Vec::new(),
            step: 0,
            text: String::new(),
        }
    }

    pub fn is_awaiting(&self, tool_call_id: &str) -> bool {
        self.awaiting.iter().any(|c| c.id == tool_call_id)
    }
}

/// A decided call taken out of a parked snapshot.
#[derive(Debug, Clone)]
pub struct ClaimedCall {
    pub run: RunHandle,
    pub path: Vec<String>,
    pub call: ToolCall,
}

/// Parked runs of one agent, keyed by run id. A run may hold several
/// snapshots when the same agent was delegated to more than once.
#[derive(Default)]
pub struct SuspendedRuns {
    runs: DashMap<String, Vec<RunState>>,
}

impl SuspendedRuns {
    pub fn park(&self, state: RunState) {
        self.runs
            .entry(state.run.run_id.clone())
            .or_default()
            .push(state);
    }

    /// Atomically take the decided call out of its snapshot. The snapshot
    /// stays parked so sibling calls remain resolvable while this one runs.
    pub fn claim_call(&self, run_id: &str, tool_call_id: &str) -> Option<ClaimedCall> {
        let mut states = self.runs.get_mut(run_id)?;
        let state = states.iter_mut().find(|s| s.is_awaiting(tool_call_id))?;
        let pos = state.awaiting.iter().position(|c| c.id == tool_call_id)?;
        let call = state.awaiting.remove(pos);
        state.in_flight.push(call.id.clone());
        Some(ClaimedCall {
            run: state.run.clone(),
            path: state.path.clone(),
            call,
        })
    }

    /// Record the result of a claimed call. Once every call of the step has a
    /// result the snapshot is removed and returned for the run to continue.
    pub fn complete_call(
        &self,
        run_id: &str,
        tool_call_id: &str,
        result: ContentBlock,
    ) -> Option<RunState> {
        let taken = {
            let mut states = self.runs.get_mut(run_id)?;
            let pos = states
                .iter()
                .position(|s| s.in_flight.iter().any(|id| id == tool_call_id))?;
            let state = &mut states[pos];
            state.in_flight.retain(|id| id != tool_call_id);
            state.resolved.push(result);
            if !state.awaiting.is_empty() || !state.in_flight.is_empty() {
                return None;
            }
            states.remove(pos)
        };
        self.runs.remove_if(run_id, |_, states| states.is_empty());
        Some(taken)
    }

    pub fn holds(&self, run_id: &str, tool_call_id: &str) -> bool {
        self.runs
            .get(run_id)
            .is_some_and(|states| states.iter().any(|s| s.is_awaiting(tool_call_id)))
    }

    pub fn discard(&self, run_id: &str) -> bool {
        self.runs.remove(run_id).is_some()
    }

    /// Number of parked snapshots across all runs.
    pub fn len(&self) -> usize {
        self.runs.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
