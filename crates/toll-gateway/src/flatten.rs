use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, error};

use toll_agent::RawEventStream;
use toll_types::{RunHandle, WireEvent};

use crate::approval::ApprovalGate;
use crate::normalizer::Normalizer;

/// Client-facing events of one segment, ending in exactly one `Finish`.
pub type WireStream = BoxStream<'static, WireEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    Finished,
    Failed,
}

/// Relay a segment's raw events to the wire in arrival order.
///
/// `claimed` is the tool call whose decision started this segment; its
/// decision is settled when the segment ends even if no result came through.
/// `on_end` runs once after the last raw event and before `Finish` is yielded.
pub fn flatten<F>(
    mut raw: RawEventStream,
    gate: Arc<ApprovalGate>,
    run: RunHandle,
    claimed: Option<String>,
    on_end: F,
) -> WireStream
where
    F: FnOnce(SegmentOutcome) + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let normalizer = Normalizer::new(&gate, &run);
        let mut outcome = SegmentOutcome::Finished;
        let mut relayed = 0usize;

        while let Some(item) = raw.next().await {
            match item {
                Ok(event) => {
                    if let Some(wire) = normalizer.normalize(event) {
                        relayed += 1;
                        yield wire;
                    }
                }
                Err(e) => {
                    error!(run_id = %run.run_id, error = %e, "segment failed mid-stream");
                    outcome = SegmentOutcome::Failed;
                    yield WireEvent::Error { error: e.to_string() };
                    break;
                }
            }
        }

        if let Some(tool_call_id) = &claimed {
            gate.settle(&run.run_id, tool_call_id);
        }
        debug!(run_id = %run.run_id, relayed, ?outcome, "segment ended");
        on_end(outcome);
        yield WireEvent::Finish;
    })
}
