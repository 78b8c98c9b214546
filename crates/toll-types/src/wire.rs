use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel frame written after the `finish` event closes a response body.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Client-facing event vocabulary. Nothing else is ever written to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireEvent {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
    },
    /// A tool call parked until a human approves or declines it.
    #[serde(rename = "tool-approval", rename_all = "camelCase")]
    ApprovalRequest {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        run_id: String,
    },
    /// Downstream failure after streaming began. Always followed by `Finish`.
    Error {
        error: String,
    },
    Finish,
}

impl WireEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The serialized `type` tag, handy for logging and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::ApprovalRequest { .. } => "tool-approval",
            Self::Error { .. } => "error",
            Self::Finish => "finish",
        }
    }

    /// Encode as one event-stream frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("data: {json}\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approval_request_uses_client_tag_and_camel_case() {
        let event = WireEvent::ApprovalRequest {
            tool_call_id: "call-1".into(),
            tool_name: "delete_vm".into(),
            args: json!({"name": "web-1"}),
            run_id: "run-9".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tool-approval",
                "toolCallId": "call-1",
                "toolName": "delete_vm",
                "args": {"name": "web-1"},
                "runId": "run-9",
            })
        );
    }

    #[test]
    fn finish_is_a_bare_type_tag() {
        let frame = WireEvent::Finish.to_sse_frame().unwrap();
        assert_eq!(frame, "data: {\"type\":\"finish\"}\n\n");
    }

    #[test]
    fn tool_result_frame_carries_result_payload() {
        let event = WireEvent::ToolResult {
            tool_call_id: "c".into(),
            tool_name: "delete_vm".into(),
            result: json!({"status": "success"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool-result");
        assert_eq!(value["toolCallId"], "c");
        assert_eq!(value["result"]["status"], "success");
        assert_eq!(event.kind(), "tool-result");
    }
}
