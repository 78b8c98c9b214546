use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::Sender;
use tracing::debug;

use toll_types::message::{Role, ToolCall, ToolResult};

// ─── Model seam ───────────────────────────────────────────────────────────────

/// A language model that can be driven one step at a time.
///
/// Implementations push incremental output through `deltas` while the call is
/// in flight and return the complete response once the step ends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        request: &ModelRequest,
        deltas: Sender<ModelDelta>,
    ) -> Result<ModelResponse, ModelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request to model provider failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Decode(String),
    #[error("scripted model: {0}")]
    Script(String),
}

/// Incremental output produced while a model step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDelta {
    Text(String),
    Reasoning(String),
}

// ─── Request types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    /// Extended thinking budget in tokens; `None` leaves thinking off.
    pub thinking_budget: Option<u32>,
}

impl ModelRequest {
    /// Tool results carried by the most recent user message, if it has any.
    pub fn latest_tool_results(&self) -> Vec<&ContentBlock> {
        self.messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| {
                m.content
                    .iter()
                    .filter(|b| matches!(b, ContentBlock::ToolResult { .. }))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text of the most recent plain user message.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| {
                m.content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Must be sent back unchanged ahead of the tool calls it preceded.
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn from_result(result: &ToolResult) -> Self {
        Self::ToolResult {
            tool_use_id: result.tool_call_id.clone(),
            content: result.output.to_string(),
            is_error: result.is_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl ModelResponse {
    /// All text content of the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool invocations requested by the model, in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

// ─── Anthropic wire format ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

impl<'a> MessagesRequest<'a> {
    /// The thinking budget is counted within `max_tokens`, so it is added on
    /// top of the configured reply length.
    fn from_request(request: &'a ModelRequest) -> Self {
        let thinking = request.thinking_budget.map(|budget_tokens| ThinkingConfig {
            kind: "enabled",
            budget_tokens,
        });
        Self {
            model: &request.model,
            max_tokens: request.max_tokens + request.thinking_budget.unwrap_or(0),
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
            thinking,
            stream: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: SseMessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: SseContentBlockStart,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: SseDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: SseMessageDelta,
        usage: SseDeltaUsage,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct SseMessageStart {
    usage: SseStartUsage,
}

#[derive(Debug, Deserialize)]
struct SseStartUsage {
    input_tokens: i64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseContentBlockStart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "redacted_thinking")]
    RedactedThinking { data: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct SseMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseDeltaUsage {
    output_tokens: i64,
}

// Accumulator for building ContentBlocks from stream events
enum BlockAccum {
    Text { text: String },
    Thinking { thinking: String, signature: String },
    RedactedThinking { data: String },
    ToolUse { id: String, name: String, input_json: String },
    Ignored,
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(
        &self,
        request: &ModelRequest,
        deltas: Sender<ModelDelta>,
    ) -> Result<ModelResponse, ModelError> {
        let body = MessagesRequest::from_request(request);

        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut sse_buffer = SseBuffer::default();

        let mut usage = Usage::default();
        let mut stop_reason: Option<String> = None;
        let mut blocks: Vec<BlockAccum> = Vec::new();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sse_buffer.push(&chunk);

            while let Some(message) = sse_buffer.next_message() {
                let Some(event) = parse_sse_message(&message) else {
                    continue;
                };
                match event {
                    SseEvent::MessageStart { message } => {
                        usage.input_tokens = message.usage.input_tokens;
                    }
                    SseEvent::ContentBlockStart {
                        index,
                        content_block,
                    } => {
                        while blocks.len() <= index {
                            blocks.push(BlockAccum::Ignored);
                        }
                        blocks[index] = match content_block {
                            SseContentBlockStart::Text { text } => BlockAccum::Text { text },
                            SseContentBlockStart::Thinking { thinking } => BlockAccum::Thinking {
                                thinking,
                                signature: String::new(),
                            },
                            SseContentBlockStart::RedactedThinking { data } => {
                                BlockAccum::RedactedThinking { data }
                            }
                            SseContentBlockStart::ToolUse { id, name } => BlockAccum::ToolUse {
                                id,
                                name,
                                input_json: String::new(),
                            },
                            SseContentBlockStart::Other => BlockAccum::Ignored,
                        };
                    }
                    SseEvent::ContentBlockDelta { index, delta } => {
                        match (blocks.get_mut(index), delta) {
                            (Some(BlockAccum::Text { text }), SseDelta::TextDelta { text: chunk }) => {
                                text.push_str(&chunk);
                                let _ = deltas.send(ModelDelta::Text(chunk)).await;
                            }
                            (
                                Some(BlockAccum::Thinking { thinking, .. }),
                                SseDelta::ThinkingDelta { thinking: chunk },
                            ) => {
                                thinking.push_str(&chunk);
                                let _ = deltas.send(ModelDelta::Reasoning(chunk)).await;
                            }
                            (
                                Some(BlockAccum::Thinking { signature, .. }),
                                SseDelta::SignatureDelta { signature: chunk },
                            ) => {
                                signature.push_str(&chunk);
                            }
                            (
                                Some(BlockAccum::ToolUse { input_json, .. }),
                                SseDelta::InputJsonDelta { partial_json },
                            ) => {
                                input_json.push_str(&partial_json);
                            }
                            _ => {}
                        }
                    }
                    SseEvent::MessageDelta { delta, usage: u } => {
                        stop_reason = delta.stop_reason;
                        usage.output_tokens = u.output_tokens;
                    }
                    SseEvent::MessageStop => break 'read,
                    SseEvent::Error { error } => {
                        return Err(ModelError::Decode(error.to_string()));
                    }
                    SseEvent::Other => {}
                }
            }
        }

        let content = blocks
            .into_iter()
            .filter_map(|b| match b {
                BlockAccum::Text { text } if !text.is_empty() => Some(ContentBlock::Text { text }),
                BlockAccum::Thinking {
                    thinking,
                    signature,
                } => Some(ContentBlock::Thinking {
                    thinking,
                    signature,
                }),
                BlockAccum::RedactedThinking { data } => {
                    Some(ContentBlock::RedactedThinking { data })
                }
                BlockAccum::ToolUse {
                    id,
                    name,
                    input_json,
                } => {
                    let input = serde_json::from_str(&input_json)
                        .unwrap_or(Value::Object(serde_json::Map::new()));
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                _ => None,
            })
            .collect();

        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "model step complete"
        );

        Ok(ModelResponse {
            content,
            stop_reason,
            usage,
        })
    }
}

/// Raw stream bytes split into `\n\n`-terminated SSE messages. A message is
/// decoded only once it is complete, so multibyte characters split across
/// network chunks survive.
#[derive(Default)]
struct SseBuffer {
    bytes: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_message(&mut self) -> Option<String> {
        let pos = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let message: Vec<u8> = self.bytes.drain(..pos + 2).collect();
        Some(String::from_utf8_lossy(&message[..pos]).into_owned())
    }
}

/// Parse one SSE message block (may contain "event: ..." and "data: ..." lines).
fn parse_sse_message(message: &str) -> Option<SseEvent> {
    let mut data_line: Option<&str> = None;

    for line in message.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            data_line = Some(data);
        }
        // "event:" lines are ignored; the JSON "type" field carries the same name
    }

    let data = data_line?;
    if data == "[DONE]" {
        return Some(SseEvent::MessageStop);
    }

    serde_json::from_str(data).ok()
}
