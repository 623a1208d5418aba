//! Domain-specific error types for the teleport pipeline.
//!
//! All fallible operations return `Result<T, TeleportError>`.
//! Transports recover per-connection failures locally; these errors
//! surface only where a caller can act on them.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the teleport pipeline.
#[derive(Debug, Error)]
pub enum TeleportError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The handshake did not start with the `OPTS` magic.
    #[error("invalid options magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// A header field could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// An operation was attempted in the wrong protocol state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The options payload was not valid JSON for the expected shape.
    #[error("malformed options: {0}")]
    MalformedOptions(#[from] serde_json::Error),

    // ── Size Errors ──────────────────────────────────────────────
    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    // ── Media Errors ─────────────────────────────────────────────
    /// The raw frame does not match the layout its descriptor claims.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The image codec rejected the frame.
    #[error("encode failed: {0}")]
    Encode(String),

    // ── Startup Errors ───────────────────────────────────────────
    /// The output could not be started.
    #[error("startup failed: {0}")]
    Startup(String),
}

impl From<jpeg_encoder::EncodingError> for TeleportError {
    fn from(e: jpeg_encoder::EncodingError) -> Self {
        TeleportError::Encode(e.to_string())
    }
}
