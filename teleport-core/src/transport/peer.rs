//! Connections admitted into the fanout transport.
//!
//! Admission (certificates, stream negotiation) happens elsewhere; the
//! fanout transport only needs to open one outbound data stream on an
//! established connection and close the connection when it is done.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::TeleportError;

/// An established receiver connection.
#[async_trait]
pub trait PeerConnection: Send + 'static {
    /// The outbound data stream type.
    type Stream: AsyncWrite + Send + Unpin + 'static;

    /// Printable peer identity for logs.
    fn remote_addr(&self) -> String;

    /// Open the single outbound data stream.
    async fn open_stream(&mut self) -> Result<Self::Stream, TeleportError>;

    /// Tear the connection down. Called once, after the stream is finished.
    async fn close(&mut self);
}

// ── TcpPeer ──────────────────────────────────────────────────────

/// A plain TCP connection whose write half is the data stream.
#[derive(Debug)]
pub struct TcpPeer {
    remote: SocketAddr,
    stream: Option<TcpStream>,
    reader: Option<OwnedReadHalf>,
}

impl TcpPeer {
    pub fn new(stream: TcpStream) -> Result<Self, TeleportError> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            remote,
            stream: Some(stream),
            reader: None,
        })
    }
}

#[async_trait]
impl PeerConnection for TcpPeer {
    type Stream = OwnedWriteHalf;

    fn remote_addr(&self) -> String {
        self.remote.to_string()
    }

    async fn open_stream(&mut self) -> Result<Self::Stream, TeleportError> {
        let stream = self
            .stream
            .take()
            .ok_or(TeleportError::ProtocolViolation("data stream already opened"))?;
        let (reader, writer) = stream.into_split();
        self.reader = Some(reader);
        Ok(writer)
    }

    async fn close(&mut self) {
        self.stream = None;
        self.reader = None;
    }
}
