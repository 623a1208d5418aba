//! Single-receiver TCP transport.
//!
//! The transport listens on an ephemeral port for its whole lifetime.
//! Each accepted socket supersedes the previous receiver, then sends one
//! options handshake before any stream data flows to it. Video and audio
//! share one send lock, so they interleave in call order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TeleportError;
use crate::options::{Options, read_options};
use crate::packet::WireMessage;
use crate::pipeline::quality::QualityCell;
use crate::state::SessionPhase;
use crate::transport::FrameSink;

#[derive(Debug, Default)]
struct Slot {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    phase: SessionPhase,
    closed: bool,
}

impl Slot {
    async fn drop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        if let Some(streamed) = self.phase.streaming_duration() {
            debug!(peer = ?self.peer, ?streamed, "receiver released");
        }
        self.peer = None;
        self.phase.disconnect();
    }
}

/// The single-receiver transport.
#[derive(Debug)]
pub struct SessionTransport {
    slot: Mutex<Slot>,
    streaming: AtomicBool,
    quality: QualityCell,
    handshake_timeout: Duration,
    local_addr: SocketAddr,
}

impl SessionTransport {
    /// Bind the listener. Failure here fails the output's start.
    pub async fn bind(
        addr: SocketAddr,
        quality: QualityCell,
        handshake_timeout: Duration,
    ) -> Result<(Arc<Self>, TcpListener), TeleportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TeleportError::Startup(format!("cannot bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "session transport listening");

        let transport = Arc::new(Self {
            slot: Mutex::new(Slot::default()),
            streaming: AtomicBool::new(false),
            quality,
            handshake_timeout,
            local_addr,
        });
        Ok((transport, listener))
    }

    /// Address the listener is bound to, including the chosen port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn phase(&self) -> SessionPhase {
        self.slot.lock().await.phase.clone()
    }

    /// Accept receivers until `cancel` fires or the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed, listener stopping: {e}");
                        break;
                    }
                },
            };

            info!(%peer, "receiver connected");
            self.on_accept(stream, peer, &cancel).await;
        }
        debug!("accept loop stopped");
    }

    async fn on_accept(&self, mut stream: TcpStream, peer: SocketAddr, cancel: &CancellationToken) {
        let mut slot = self.slot.lock().await;
        if slot.closed {
            return;
        }

        if slot.phase.has_connection() {
            info!(old = ?slot.peer, new = %peer, "superseding receiver");
        }
        self.streaming.store(false, Ordering::SeqCst);
        slot.drop_stream().await;
        slot.phase.accept();

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {e}");
        }

        let handshake = tokio::select! {
            _ = cancel.cancelled() => {
                slot.phase.disconnect();
                return;
            }
            r = self.read_handshake(&mut stream) => r,
        };

        match handshake {
            Ok(options) => {
                debug!(%peer, quality = options.quality, "receiver options");
                self.quality.set(options.quality);
            }
            Err(e) if is_rejection(&e) => {
                warn!(%peer, "rejecting receiver: {e}");
                let _ = stream.shutdown().await;
                slot.phase.disconnect();
                return;
            }
            Err(e) => warn!(%peer, "options read failed, keeping quality: {e}"),
        }

        slot.stream = Some(stream);
        slot.peer = Some(peer);
        if let Err(e) = slot.phase.begin_streaming() {
            debug!("{e}");
        }
        self.streaming.store(true, Ordering::SeqCst);
    }

    /// Read the options handshake within the configured deadline.
    async fn read_handshake(&self, stream: &mut TcpStream) -> Result<Options, TeleportError> {
        tokio::time::timeout(self.handshake_timeout, read_options(stream))
            .await
            .unwrap_or(Err(TeleportError::Timeout(self.handshake_timeout)))
    }

    /// Write `bytes` to the active receiver.
    ///
    /// Without a receiver this is a silent no-op. A write error closes
    /// the receiver; later sends are no-ops until the next accept.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), TeleportError> {
        let mut slot = self.slot.lock().await;
        let Some(stream) = slot.stream.as_mut() else {
            return Ok(());
        };

        if let Err(e) = stream.write_all(bytes).await {
            let peer = slot.peer;
            warn!(?peer, "receiver write failed, closing: {e}");
            self.streaming.store(false, Ordering::SeqCst);
            slot.drop_stream().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the active receiver and refuse further ones.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        slot.closed = true;
        self.streaming.store(false, Ordering::SeqCst);
        slot.drop_stream().await;
    }
}

/// Handshake failures that close the connection. Anything else keeps it.
fn is_rejection(e: &TeleportError) -> bool {
    matches!(
        e,
        TeleportError::InvalidMagic(_)
            | TeleportError::MalformedOptions(_)
            | TeleportError::PayloadTooLarge { .. }
            | TeleportError::InvalidHeader(_)
    )
}

#[async_trait]
impl FrameSink for SessionTransport {
    async fn deliver(&self, message: WireMessage) {
        // Failures are logged and recovered inside `send`.
        let _ = self.send(&message.to_bytes()).await;
    }

    fn has_receivers(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        SessionTransport::close(self).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn start(timeout: Duration) -> (Arc<SessionTransport>, QualityCell, CancellationToken) {
        let quality = QualityCell::new(90);
        let (transport, listener) =
            SessionTransport::bind("127.0.0.1:0".parse().unwrap(), quality.clone(), timeout)
                .await
                .unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(&transport).serve(listener, cancel.clone()));
        (transport, quality, cancel)
    }

    async fn connect(transport: &SessionTransport, quality: i32) -> TcpStream {
        let mut client = TcpStream::connect(transport.local_addr()).await.unwrap();
        client
            .write_all(&Options::new(quality).to_bytes().unwrap())
            .await
            .unwrap();
        client
    }

    async fn wait_for_phase(transport: &SessionTransport, want: fn(&SessionPhase) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !want(&transport.phase().await) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("phase never reached");
    }

    #[tokio::test]
    async fn handshake_sets_quality() {
        let (transport, quality, cancel) = start(Duration::from_secs(5)).await;
        let _client = connect(&transport, 50).await;

        wait_for_phase(&transport, SessionPhase::is_streaming).await;
        assert_eq!(quality.get(), 50);
        assert!(transport.has_receivers());
        cancel.cancel();
    }

    #[tokio::test]
    async fn bad_magic_closes_without_touching_quality() {
        let (transport, quality, cancel) = start(Duration::from_secs(5)).await;
        let mut client = TcpStream::connect(transport.local_addr()).await.unwrap();
        client.write_all(b"JUNK\x0e\x00\x00\x00{\"Quality\":5}").await.unwrap();

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(quality.get(), 90);
        assert!(!transport.has_receivers());
        assert_eq!(transport.phase().await, SessionPhase::NoConnection);
        cancel.cancel();
    }

    #[tokio::test]
    async fn handshake_timeout_keeps_connection() {
        let (transport, quality, cancel) = start(Duration::from_millis(50)).await;
        let mut client = TcpStream::connect(transport.local_addr()).await.unwrap();

        wait_for_phase(&transport, SessionPhase::is_streaming).await;
        assert_eq!(quality.get(), 90);

        transport.send(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        cancel.cancel();
    }

    #[tokio::test]
    async fn silent_receiver_times_out_the_handshake() {
        let quality = QualityCell::new(90);
        let (transport, listener) = SessionTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            quality,
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        let _client = TcpStream::connect(transport.local_addr()).await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        match transport.read_handshake(&mut stream).await {
            Err(TeleportError::Timeout(after)) => assert_eq!(after, Duration::from_millis(20)),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(!is_rejection(&TeleportError::Timeout(Duration::ZERO)));
        assert!(is_rejection(&TeleportError::InvalidMagic(*b"NOPE")));
    }

    #[tokio::test]
    async fn new_receiver_supersedes_old() {
        let (transport, quality, cancel) = start(Duration::from_secs(5)).await;
        let mut first = connect(&transport, 40).await;
        wait_for_phase(&transport, SessionPhase::is_streaming).await;
        assert_eq!(quality.get(), 40);

        let mut second = connect(&transport, 60).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while quality.get() != 60 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), first.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));

        transport.send(b"to-second").await.unwrap();
        let mut buf = [0u8; 9];
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-second");
        cancel.cancel();
    }

    #[tokio::test]
    async fn send_without_receiver_is_noop() {
        let (transport, _quality, cancel) = start(Duration::from_secs(5)).await;
        assert!(transport.send(b"nobody").await.is_ok());
        cancel.cancel();
    }

    #[tokio::test]
    async fn write_error_drops_receiver() {
        let (transport, _quality, cancel) = start(Duration::from_secs(5)).await;
        let client = connect(&transport, 70).await;
        wait_for_phase(&transport, SessionPhase::is_streaming).await;
        drop(client);

        let payload = vec![0u8; 64 * 1024];
        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if transport.send(&payload).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(failed.is_ok(), "write to a closed peer never failed");

        assert!(!transport.has_receivers());
        assert!(transport.send(b"later").await.is_ok());
        cancel.cancel();
    }

    #[tokio::test]
    async fn close_disconnects_and_refuses() {
        let (transport, _quality, cancel) = start(Duration::from_secs(5)).await;
        let mut client = connect(&transport, 70).await;
        wait_for_phase(&transport, SessionPhase::is_streaming).await;

        transport.close().await;
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(transport.send(b"after close").await.is_ok());
        cancel.cancel();
    }
}
