use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info};

use toll_types::message::{Message, Role, ToolCall};
use toll_types::{Decision, RawEvent};

use crate::agent::Agent;
use crate::error::AgentError;
use crate::llm::{ChatMessage, ContentBlock, ModelDelta, ModelResponse};
use crate::sink::EventSink;
use crate::suspend::{ClaimedCall, RunState};

const DECLINED: &str = "The user declined this tool call. Do not retry it; acknowledge the refusal.";

/// How an execution segment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEnd {
    Completed { text: String },
    /// Stopped on gated calls; the run continues on a later decision.
    Parked { text: String },
}

impl SegmentEnd {
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text } | Self::Parked { text } => text,
        }
    }
}

enum Invocation {
    Done(ContentBlock),
    Awaiting,
    DelegationParked,
}

/// Drive the model/tool loop until the model stops asking for tools, a gated
/// call parks the run, or the step limit is hit.
pub(crate) async fn run_steps(
    agent: &Arc<Agent>,
    mut state: RunState,
    sink: &EventSink,
) -> Result<SegmentEnd, AgentError> {
    while state.step < agent.max_steps() {
        state.step += 1;
        info!(agent = %agent.id, run_id = %state.run.run_id, step = state.step, "model step");

        let response = call_model(agent, &state.messages, sink).await?;
        sink.emit(RawEvent::StepFinish { step: state.step }).await;
        append_text(&mut state.text, &response.text());

        let calls = response.tool_calls();
        if calls.is_empty() {
            return Ok(SegmentEnd::Completed { text: state.text });
        }
        state.messages.push(ChatMessage::assistant(response.content));

        let mut resolved = Vec::new();
        let mut awaiting = Vec::new();
        let mut delegation_parked = false;
        for call in calls {
            match invoke(agent, &state.run, &call, sink).await? {
                Invocation::Done(block) => resolved.push(block),
                Invocation::Awaiting => awaiting.push(call),
                Invocation::DelegationParked => {
                    delegation_parked = true;
                    resolved.push(ContentBlock::ToolResult {
                        tool_use_id: call.id.clone(),
                        content: json!({ "status": "awaiting-approval" }).to_string(),
                        is_error: false,
                    });
                }
            }
        }

        if !awaiting.is_empty() {
            info!(
                agent = %agent.id,
                run_id = %state.run.run_id,
                calls = awaiting.len(),
                "run parked on approval"
            );
            state.awaiting = awaiting.clone();
            state.resolved = resolved;
            let text = state.text.clone();
            // The snapshot must be parked before any approval request is seen.
            agent.suspended().park(state);
            for call in &awaiting {
                sink.emit(tool_call_event(call, true)).await;
            }
            return Ok(SegmentEnd::Parked { text });
        }
        if delegation_parked {
            return Ok(SegmentEnd::Parked { text: state.text });
        }
        state.messages.push(ChatMessage::tool_results(resolved));
    }

    error!(agent = %agent.id, limit = agent.max_steps(), "step limit reached");
    Err(AgentError::StepLimit {
        agent: agent.id.clone(),
        limit: agent.max_steps(),
    })
}

/// Apply a decision to a claimed call. The run continues only once every
/// call of its step has a result; otherwise the segment ends parked.
pub(crate) async fn resume_steps(
    agent: &Arc<Agent>,
    claimed: ClaimedCall,
    decision: Decision,
    sink: &EventSink,
) -> Result<SegmentEnd, AgentError> {
    let ClaimedCall { run, call, .. } = claimed;

    info!(agent = %agent.id, run_id = %run.run_id, tool_call_id = %call.id, %decision, "resuming parked call");
    let block = match decision {
        Decision::Approved => {
            sink.emit(tool_call_event(&call, true)).await;
            execute(agent, &call, sink).await
        }
        Decision::Declined => ContentBlock::ToolResult {
            tool_use_id: call.id.clone(),
            content: json!({ "error": DECLINED }).to_string(),
            is_error: true,
        },
    };

    let Some(mut state) = agent.suspended().complete_call(&run.run_id, &call.id, block) else {
        return Ok(SegmentEnd::Parked {
            text: String::new(),
        });
    };
    state.text.clear();
    let results = std::mem::take(&mut state.resolved);
    state.messages.push(ChatMessage::tool_results(results));
    run_steps(agent, state, sink).await
}

async fn call_model(
    agent: &Agent,
    messages: &[ChatMessage],
    sink: &EventSink,
) -> Result<ModelResponse, AgentError> {
    let request = agent.request(messages.to_vec());
    let (tx, mut rx) = mpsc::channel(64);

    let forward = async {
        while let Some(delta) = rx.recv().await {
            let event = match delta {
                ModelDelta::Text(text) => RawEvent::TextDelta { text },
                ModelDelta::Reasoning(text) => RawEvent::ReasoningDelta { text },
            };
            sink.emit(event).await;
        }
    };
    let (response, ()) = tokio::join!(agent.model().complete(&request, tx), forward);
    Ok(response?)
}

async fn invoke(
    agent: &Arc<Agent>,
    run: &toll_types::RunHandle,
    call: &ToolCall,
    sink: &EventSink,
) -> Result<Invocation, AgentError> {
    if let Some(sub) = agent.delegate_for(&call.name) {
        sink.emit(tool_call_event(call, false)).await;
        let prompt = call.input["prompt"].as_str().unwrap_or_default().to_string();
        let end = sub.run_delegated(run, prompt, sink.nested(&sub.id)).await?;
        return Ok(match end {
            SegmentEnd::Completed { text } => {
                sink.emit(RawEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result: json!({ "text": text }),
                    is_error: false,
                })
                .await;
                Invocation::Done(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: text,
                    is_error: false,
                })
            }
            SegmentEnd::Parked { .. } => Invocation::DelegationParked,
        });
    }

    if agent.tools().requires_approval(&call.name) {
        return Ok(Invocation::Awaiting);
    }

    sink.emit(tool_call_event(call, false)).await;
    Ok(Invocation::Done(execute(agent, call, sink).await))
}

async fn execute(agent: &Agent, call: &ToolCall, sink: &EventSink) -> ContentBlock {
    let result = agent.tools().execute(call).await;
    sink.emit(RawEvent::ToolResult {
        tool_call_id: result.tool_call_id.clone(),
        tool_name: result.tool_name.clone(),
        result: result.output.clone(),
        is_error: result.is_error,
    })
    .await;
    ContentBlock::from_result(&result)
}

fn tool_call_event(call: &ToolCall, requires_approval: bool) -> RawEvent {
    RawEvent::ToolCall {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        args: call.input.clone(),
        requires_approval,
    }
}

fn append_text(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push_str("\n\n");
    }
    buf.push_str(text);
}

/// Convert stored history into model messages, merging adjacent turns of the
/// same role.
pub(crate) fn history_to_chat(history: &[Message]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    for msg in history {
        if msg.role == Role::System || msg.content.is_empty() {
            continue;
        }
        let block = ContentBlock::Text {
            text: msg.content.clone(),
        };
        match messages.last_mut() {
            Some(last) if last.role == msg.role => last.content.push(block),
            _ => messages.push(ChatMessage {
                role: msg.role,
                content: vec![block],
            }),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_merges_same_role_and_skips_system() {
        let history = vec![
            Message::system("t1", "ignored"),
            Message::user("t1", "delete web-1"),
            Message::assistant("t1", "Waiting for approval."),
            Message::assistant("t1", "VM web-1 deleted."),
            Message::user("t1", ""),
        ];
        let chat = history_to_chat(&history);
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0], ChatMessage::user_text("delete web-1"));
        assert_eq!(chat[1].role, Role::Assistant);
        assert_eq!(chat[1].content.len(), 2);
    }

    #[test]
    fn segment_text_is_joined_by_paragraph() {
        let mut buf = String::new();
        append_text(&mut buf, "");
        append_text(&mut buf, "one");
        append_text(&mut buf, "two");
        assert_eq!(buf, "one\n\ntwo");
    }
}
