use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::Sender;

use toll_types::message::ToolCall;

use crate::llm::{ContentBlock, LanguageModel, ModelDelta, ModelError, ModelRequest, ModelResponse, Usage};

/// One canned model step.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub reasoning: Option<String>,
    /// Streamed as separate text deltas, in order.
    pub text: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: vec![text.into()],
            ..Self::default()
        }
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn tool(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::default().and_tool(id, name, input)
    }

    pub fn and_tool(mut self, id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        self.tool_calls.push(ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        });
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

type Responder = dyn Fn(&ModelRequest) -> Result<ScriptedTurn, ModelError> + Send + Sync;

/// Deterministic stand-in for a real provider.
pub struct ScriptedModel {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// Answer every step by inspecting the request.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ModelRequest) -> ScriptedTurn + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(move |req| Ok(f(req))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replay turns in order; running past the end is a model failure.
    pub fn sequence(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        let queue = Mutex::new(turns.into_iter().collect::<VecDeque<_>>());
        Self {
            responder: Box::new(move |_| {
                queue
                    .lock()
                    .ok()
                    .and_then(|mut q| q.pop_front())
                    .ok_or_else(|| ModelError::Script("no scripted turns left".to_string()))
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every step with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            responder: Box::new(move |_| Err(ModelError::Script(message.clone()))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of steps requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        request: &ModelRequest,
        deltas: Sender<ModelDelta>,
    ) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let turn = (self.responder)(request)?;

        if let Some(reasoning) = &turn.reasoning {
            let _ = deltas.send(ModelDelta::Reasoning(reasoning.clone())).await;
        }
        for chunk in &turn.text {
            let _ = deltas.send(ModelDelta::Text(chunk.clone())).await;
        }

        let mut content = Vec::new();
        let text = turn.text.concat();
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        for call in &turn.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        let stop_reason = if turn.tool_calls.is_empty() {
            "end_turn"
        } else {
            "tool_use"
        };

        Ok(ModelResponse {
            content,
            stop_reason: Some(stop_reason.to_string()),
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "scripted".into(),
            max_tokens: 16,
            system: String::new(),
            messages: vec![],
            tools: vec![],
            thinking_budget: None,
        }
    }

    #[tokio::test]
    async fn sequence_streams_chunks_then_runs_dry() {
        let model = ScriptedModel::sequence([ScriptedTurn::chunks(["Hel", "lo"])
            .and_tool("c1", "delete_vm", json!({"name": "web-1"}))]);
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);

        let response = model.complete(&request(), tx.clone()).await.unwrap();
        assert_eq!(response.text(), "Hello");
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(rx.recv().await, Some(ModelDelta::Text("Hel".into())));
        assert_eq!(rx.recv().await, Some(ModelDelta::Text("lo".into())));

        assert!(model.complete(&request(), tx).await.is_err());
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn reasoning_streams_before_text() {
        let model = ScriptedModel::from_fn(|_| ScriptedTurn::text("42").with_reasoning("thinking"));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);

        let response = model.complete(&request(), tx).await.unwrap();
        assert_eq!(response.text(), "42");
        assert_eq!(rx.recv().await, Some(ModelDelta::Reasoning("thinking".into())));
        assert_eq!(rx.recv().await, Some(ModelDelta::Text("42".into())));
        assert_eq!(rx.recv().await, None);
    }
}
