//! Concurrent encode with in-order delivery.
//!
//! Every accepted frame gets one tracked task. The task compresses on the
//! blocking pool, records its output in the [`ReorderBuffer`], then flushes
//! whatever contiguous prefix is ready. Flushes are serialized by a gate so
//! two tasks draining at once cannot interleave their batches.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{trace, warn};

use crate::error::TeleportError;
use crate::media::types::VideoImage;
use crate::pipeline::encoder::FrameEncoder;
use crate::pipeline::quality::QualityCell;
use crate::pipeline::reorder::{ReorderBuffer, Ticket};
use crate::transport::FrameSink;

struct Shared<S> {
    pending: Mutex<ReorderBuffer>,
    flush_gate: tokio::sync::Mutex<()>,
    sink: Arc<S>,
    encoder: Arc<dyn FrameEncoder>,
    quality: QualityCell,
}

impl<S> Shared<S> {
    fn pending(&self) -> MutexGuard<'_, ReorderBuffer> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Encode/reorder engine feeding one [`FrameSink`].
pub struct EncodeEngine<S> {
    shared: Arc<Shared<S>>,
    tracker: TaskTracker,
    runtime: Handle,
}

impl<S: FrameSink> EncodeEngine<S> {
    /// Build an engine whose tasks run on `runtime` and are tracked by `tracker`.
    pub fn new(
        sink: Arc<S>,
        encoder: Arc<dyn FrameEncoder>,
        quality: QualityCell,
        max_pending: usize,
        tracker: TaskTracker,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(ReorderBuffer::new(max_pending)),
                flush_gate: tokio::sync::Mutex::new(()),
                sink,
                encoder,
                quality,
            }),
            tracker,
            runtime,
        }
    }

    /// Queue `image` for encoding. Returns `false` when the frame was shed.
    ///
    /// Never blocks on the codec or the network, so it is safe to call
    /// from a host capture callback.
    pub fn submit(&self, image: VideoImage, timestamp: i64) -> bool {
        let Some(ticket) = self.shared.pending().reserve(timestamp) else {
            trace!(timestamp, "reorder buffer full, dropping frame");
            return false;
        };

        let shared = Arc::clone(&self.shared);
        self.tracker.spawn_on(
            async move {
                let quality = shared.quality.get();
                let encoder = Arc::clone(&shared.encoder);
                let result =
                    tokio::task::spawn_blocking(move || encoder.encode(&image, quality)).await;

                let output = match result {
                    Ok(Ok(bytes)) => Ok(Bytes::from(bytes)),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(TeleportError::Encode(e.to_string())),
                };
                finish(&shared, ticket, output).await;
            },
            &self.runtime,
        );
        true
    }

    /// Frames shed because the reorder buffer was full.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.pending().dropped()
    }

    /// Frames accepted but not yet handed to the sink.
    pub fn in_flight(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn quality(&self) -> &QualityCell {
        &self.shared.quality
    }
}

async fn finish<S: FrameSink>(
    shared: &Shared<S>,
    ticket: Ticket,
    output: Result<Bytes, TeleportError>,
) {
    match output {
        Ok(bytes) => {
            shared.pending().complete(ticket, bytes);
        }
        Err(e) => {
            warn!("frame encode failed: {e}");
            shared.pending().fail(ticket);
        }
    }
    flush(shared).await;
}

/// Hand the ready prefix of the reorder buffer to the sink, in order.
async fn flush<S: FrameSink>(shared: &Shared<S>) {
    let _gate = shared.flush_gate.lock().await;
    let ready = shared.pending().drain_ready();
    for message in ready {
        shared.sink.deliver(message).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
