use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Producer-side execution event.
///
/// `Delegated` wraps an event emitted by a sub-agent one level deeper; wrappers
/// nest to any depth. `Unknown` absorbs anything the producer emits that this
/// vocabulary does not describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum RawEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        run_id: String,
        agent_id: String,
    },
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        #[serde(default)]
        requires_approval: bool,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    Delegated {
        agent_id: String,
        event: Box<RawEvent>,
    },
    #[serde(rename_all = "camelCase")]
    StepFinish {
        step: usize,
    },
    #[serde(other)]
    Unknown,
}

impl RawEvent {
    /// Decode an event from loosely-typed producer output. Anything that does
    /// not match the vocabulary becomes `Unknown` instead of an error.
    pub fn decode(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Unknown)
    }

    pub fn delegated(agent_id: impl Into<String>, event: RawEvent) -> Self {
        Self::Delegated {
            agent_id: agent_id.into(),
            event: Box::new(event),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Depth of delegation wrapping around the innermost payload.
    pub fn depth(&self) -> usize {
        match self {
            Self::Delegated { event, .. } => 1 + event.depth(),
            _ => 0,
        }
    }

    /// The innermost, unwrapped payload.
    pub fn innermost(&self) -> &RawEvent {
        match self {
            Self::Delegated { event, .. } => event.innermost(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_delegation() {
        let raw = RawEvent::decode(json!({
            "type": "delegated",
            "payload": {
                "agentId": "azure-agent",
                "event": {
                    "type": "tool-call",
                    "payload": {
                        "toolCallId": "c1",
                        "toolName": "delete_vm",
                        "args": {"name": "web-1"},
                        "requiresApproval": true
                    }
                }
            }
        }));
        assert_eq!(raw.depth(), 1);
        match raw.innermost() {
            RawEvent::ToolCall {
                tool_call_id,
                requires_approval,
                ..
            } => {
                assert_eq!(tool_call_id, "c1");
                assert!(*requires_approval);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_type_decodes_as_unknown() {
        let raw = RawEvent::decode(json!({"type": "tripwire", "payload": {}}));
        assert_eq!(raw, RawEvent::Unknown);
    }

    #[test]
    fn malformed_payload_decodes_as_unknown() {
        let raw = RawEvent::decode(json!({"type": "tool-call", "payload": {"toolName": 3}}));
        assert_eq!(raw, RawEvent::Unknown);
        assert_eq!(RawEvent::decode(json!("function_call(delete_vm)")), RawEvent::Unknown);
    }
}
