use futures::stream::BoxStream;
use tokio::sync::mpsc;

use toll_types::RawEvent;

use crate::error::AgentError;

/// Ordered raw output of one execution segment. A trailing `Err` item means the
/// segment failed; nothing follows it.
pub type RawEventStream = BoxStream<'static, Result<RawEvent, AgentError>>;

/// Producer half of a segment's raw event stream.
///
/// `path` lists the delegated agents between the root and the emitter; every
/// emitted event is wrapped once per entry, innermost last.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Result<RawEvent, AgentError>>,
    path: Vec<String>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, RawEventStream) {
        Self::channel_at(capacity, Vec::new())
    }

    /// A sink whose events come out already wrapped for `path`.
    pub fn channel_at(capacity: usize, path: Vec<String>) -> (Self, RawEventStream) {
        let (tx, mut rx) = mpsc::channel(capacity);
        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        (Self { tx, path }, Box::pin(stream))
    }

    /// Sink for a sub-agent running inside this one.
    pub fn nested(&self, agent_id: &str) -> Self {
        let mut path = self.path.clone();
        path.push(agent_id.to_string());
        Self {
            tx: self.tx.clone(),
            path,
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub async fn emit(&self, event: RawEvent) {
        let event = self
            .path
            .iter()
            .rev()
            .fold(event, |inner, agent_id| RawEvent::delegated(agent_id.clone(), inner));
        // A dropped consumer must not stop the producer mid-step.
        let _ = self.tx.send(Ok(event)).await;
    }

    pub async fn fail(&self, error: AgentError) {
        let _ = self.tx.send(Err(error)).await;
    }
}
