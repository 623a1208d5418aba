//! The per-instance output context.
//!
//! An [`Output`] owns everything one streaming instance needs: its
//! transport, the encode engine, the discovery beacon and the task
//! tracker every background task is spawned on. The host creates one on
//! instantiation, feeds it capture callbacks and stops it on teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::discovery::{Announcement, Beacon, resolve_name};
use crate::error::TeleportError;
use crate::media::types::{RawAudioFrame, RawVideoFrame};
use crate::media::{audio, convert};
use crate::pipeline::{EncodeEngine, FrameEncoder, JpegEncoder, QualityCell};
use crate::transport::{FanoutTransport, FrameSink, PeerConnection, PeerId, SessionTransport};

/// What happened to one video capture callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    /// Nobody is listening; the frame was ignored.
    Idle,
    /// The frame was converted and queued for encoding.
    Queued,
    /// The reorder buffer was full; the frame was counted as dropped.
    Dropped,
}

/// One running output instance.
pub struct Output<T: FrameSink> {
    transport: Arc<T>,
    engine: EncodeEngine<T>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    announced_port: u16,
}

/// Output streaming to one receiver that connects to its listener.
pub type SessionOutput = Output<SessionTransport>;

/// Output streaming to every receiver admitted from outside.
pub type FanoutOutput = Output<FanoutTransport>;

impl<T: FrameSink> Output<T> {
    fn assemble(
        transport: Arc<T>,
        encoder: Arc<dyn FrameEncoder>,
        quality: QualityCell,
        config: &OutputConfig,
        tracker: TaskTracker,
        cancel: CancellationToken,
        announced_port: u16,
    ) -> Self {
        let engine = EncodeEngine::new(
            Arc::clone(&transport),
            encoder,
            quality,
            config.max_pending_frames,
            tracker.clone(),
            Handle::current(),
        );
        Self {
            transport,
            engine,
            tracker,
            cancel,
            announced_port,
        }
    }

    /// Video capture callback.
    ///
    /// Converts the borrowed frame before returning and never waits on the
    /// codec or the network.
    pub fn raw_video(&self, frame: &RawVideoFrame<'_>) -> Result<VideoOutcome, TeleportError> {
        if self.cancel.is_cancelled() || !self.transport.has_receivers() {
            return Ok(VideoOutcome::Idle);
        }

        let image = convert::to_image(frame)?;
        if self.engine.submit(image, frame.timestamp) {
            Ok(VideoOutcome::Queued)
        } else {
            Ok(VideoOutcome::Dropped)
        }
    }

    /// Audio capture callback.
    ///
    /// The samples are serialized before the first await, so the send
    /// interleaves with video in call order.
    pub async fn raw_audio(&self, frame: &RawAudioFrame<'_>) -> Result<(), TeleportError> {
        if self.cancel.is_cancelled() || !self.transport.has_receivers() {
            return Ok(());
        }

        let message = audio::to_message(frame)?;
        self.transport.deliver(message).await;
        Ok(())
    }

    /// Frames shed since the output started.
    pub fn dropped_frames(&self) -> u64 {
        self.engine.dropped_frames()
    }

    pub fn quality(&self) -> &QualityCell {
        self.engine.quality()
    }

    /// Port announced on the discovery channel.
    pub fn port(&self) -> u16 {
        self.announced_port
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Stop accepting, close every receiver and wait for all tasks.
    ///
    /// Encode tasks already running finish first; their output is
    /// discarded by the closed transport. Calling this twice is harmless.
    pub async fn stop(&self) {
        info!(port = self.announced_port, "stopping output");
        self.cancel.cancel();
        self.transport.close().await;

        self.tracker.close();
        self.tracker.wait().await;
        debug!(port = self.announced_port, "output stopped");
    }
}

impl<T: FrameSink> Drop for Output<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn spawn_discovery(
    config: &OutputConfig,
    port: u16,
    tracker: &TaskTracker,
    cancel: &CancellationToken,
) -> Result<(), TeleportError> {
    if !config.discovery.enabled {
        return Ok(());
    }
    let name = resolve_name(&config.identifier)?;
    let announcement = Announcement::new(name.clone(), port);
    let beacon = Beacon::bind(
        &announcement,
        config.discovery.group,
        config.discovery.interval,
    )
    .await?;
    info!(%name, port, "announcing output");
    tracker.spawn(beacon.run(cancel.clone()));
    Ok(())
}

// ── Session model ────────────────────────────────────────────────

impl SessionOutput {
    /// Bind the listener, start accepting and announce the chosen port.
    pub async fn start(config: OutputConfig) -> Result<Self, TeleportError> {
        Self::start_with_encoder(config, Arc::new(JpegEncoder)).await
    }

    pub async fn start_with_encoder(
        config: OutputConfig,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Result<Self, TeleportError> {
        let quality = QualityCell::new(config.default_quality);
        let (transport, listener) = SessionTransport::bind(
            config.bind_addr,
            quality.clone(),
            config.handshake_timeout,
        )
        .await?;
        let port = transport.local_addr().port();

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_discovery(&config, port, &tracker, &cancel).await?;
        tracker.spawn(Arc::clone(&transport).serve(listener, cancel.clone()));

        info!(port, "session output started");
        Ok(Self::assemble(
            transport,
            encoder,
            quality,
            &config,
            tracker,
            cancel,
            port,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

// ── Fanout model ─────────────────────────────────────────────────

impl FanoutOutput {
    /// Start a fanout output whose receivers connect through an external
    /// listener on `announced_port`.
    pub async fn start(config: OutputConfig, announced_port: u16) -> Result<Self, TeleportError> {
        Self::start_with_encoder(config, announced_port, Arc::new(JpegEncoder)).await
    }

    pub async fn start_with_encoder(
        config: OutputConfig,
        announced_port: u16,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Result<Self, TeleportError> {
        let quality = QualityCell::new(config.default_quality);
        let transport = Arc::new(FanoutTransport::new(config.queue));

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_discovery(&config, announced_port, &tracker, &cancel).await?;

        info!(port = announced_port, "fanout output started");
        Ok(Self::assemble(
            transport,
            encoder,
            quality,
            &config,
            tracker,
            cancel,
            announced_port,
        ))
    }

    /// Hand an admitted connection to the fanout transport.
    pub async fn admit<C: PeerConnection>(&self, conn: C) -> Result<PeerId, TeleportError> {
        if self.cancel.is_cancelled() {
            return Err(TeleportError::Closed);
        }
        self.transport.admit(conn).await
    }

    pub fn receiver_count(&self) -> usize {
        self.transport.count()
    }
}

// ── Tests ────────────────────────────────────────────────────────
