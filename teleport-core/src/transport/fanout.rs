//! Multi-receiver fanout transport.
//!
//! Every admitted connection gets a bounded queue and a forwarding task
//! that drains it in order onto the connection's data stream. A slow
//! receiver only degrades itself: its queue depth decides whether a
//! broadcast is enqueued quietly, enqueued with a warning, or dropped.
//! A failing receiver removes itself without touching the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::QueueLimits;
use crate::error::TeleportError;
use crate::packet::WireMessage;
use crate::transport::FrameSink;
use crate::transport::peer::PeerConnection;

/// Identity of one admitted connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// What a broadcast does for one receiver, given its queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueVerdict {
    /// Queue is healthy.
    Enqueue,
    /// Queue is above the high watermark; enqueue and warn.
    High,
    /// Queue is above the drop watermark; skip this receiver and warn.
    Exceeded,
}

impl QueueLimits {
    pub fn verdict(&self, depth: usize) -> QueueVerdict {
        if depth > self.drop_watermark {
            QueueVerdict::Exceeded
        } else if depth > self.high_watermark {
            QueueVerdict::High
        } else {
            QueueVerdict::Enqueue
        }
    }
}

/// Per-call tally of a [`FanoutTransport::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Receivers the message was queued for, including `high`.
    pub enqueued: usize,
    /// Receivers queued for while above the high watermark.
    pub high: usize,
    /// Receivers the message was dropped for.
    pub dropped: usize,
}

#[derive(Debug)]
struct PeerEntry {
    remote: String,
    tx: mpsc::Sender<Bytes>,
}

impl PeerEntry {
    fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[derive(Debug, Default)]
struct Registry {
    peers: HashMap<PeerId, PeerEntry>,
    closed: bool,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The multi-receiver transport.
#[derive(Debug)]
pub struct FanoutTransport {
    registry: SharedRegistry,
    next_id: AtomicU64,
    limits: QueueLimits,
    tracker: TaskTracker,
}

impl FanoutTransport {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            registry: Arc::default(),
            next_id: AtomicU64::new(1),
            limits,
            tracker: TaskTracker::new(),
        }
    }

    /// Take over an admitted connection: open its data stream, register
    /// its queue and start its forwarding task.
    pub async fn admit<C: PeerConnection>(&self, mut conn: C) -> Result<PeerId, TeleportError> {
        let remote = conn.remote_addr();
        let stream = match conn.open_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                conn.close().await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.limits.capacity);
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registered = {
            let mut registry = lock(&self.registry);
            if registry.closed {
                false
            } else {
                registry.peers.insert(
                    id,
                    PeerEntry {
                        remote: remote.clone(),
                        tx,
                    },
                );
                true
            }
        };
        if !registered {
            conn.close().await;
            return Err(TeleportError::Closed);
        }

        info!(%id, peer = %remote, "receiver admitted");
        let registry = Arc::clone(&self.registry);
        self.tracker.spawn(forward(id, remote, conn, stream, rx, registry));
        Ok(id)
    }

    /// Queue `bytes` for every registered receiver, shedding per receiver.
    pub fn broadcast(&self, bytes: Bytes) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();
        let registry = lock(&self.registry);

        for (id, peer) in &registry.peers {
            let depth = peer.depth();
            match self.limits.verdict(depth) {
                QueueVerdict::Exceeded => {
                    warn!(%id, peer = %peer.remote, depth, "send queue exceeded");
                    summary.dropped += 1;
                    continue;
                }
                QueueVerdict::High => {
                    warn!(%id, peer = %peer.remote, depth, "send queue high");
                    summary.high += 1;
                }
                QueueVerdict::Enqueue => {}
            }

            match peer.tx.try_send(bytes.clone()) {
                Ok(()) => summary.enqueued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%id, peer = %peer.remote, depth, "send queue full");
                    summary.dropped += 1;
                }
                // The forwarding task is exiting and will deregister itself.
                Err(TrySendError::Closed(_)) => summary.dropped += 1,
            }
        }

        summary
    }

    /// Number of registered receivers.
    pub fn count(&self) -> usize {
        lock(&self.registry).peers.len()
    }

    /// Current queue depth of `id`, if it is still registered.
    pub fn queue_depth(&self, id: PeerId) -> Option<usize> {
        lock(&self.registry).peers.get(&id).map(PeerEntry::depth)
    }

    /// Close every queue and wait for all forwarding tasks to finish.
    ///
    /// Messages already queued are still written before each task exits.
    pub async fn close(&self) {
        let peers = {
            let mut registry = lock(&self.registry);
            registry.closed = true;
            std::mem::take(&mut registry.peers)
        };
        debug!(receivers = peers.len(), "closing fanout queues");
        drop(peers);

        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn forward<C: PeerConnection>(
    id: PeerId,
    remote: String,
    mut conn: C,
    mut stream: C::Stream,
    mut rx: mpsc::Receiver<Bytes>,
    registry: SharedRegistry,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = stream.write_all(&bytes).await {
            warn!(%id, peer = %remote, "send failed, dropping receiver: {e}");
            lock(&registry).peers.remove(&id);
            break;
        }
    }

    let _ = stream.shutdown().await;
    conn.close().await;
    info!(%id, peer = %remote, "receiver closed");
}

#[async_trait]
impl FrameSink for FanoutTransport {
    async fn deliver(&self, message: WireMessage) {
        self.broadcast(message.to_bytes());
    }

    fn has_receivers(&self) -> bool {
        self.count() > 0
    }

    async fn close(&self) {
        FanoutTransport::close(self).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────
