//! Lifecycle of the single-receiver session.
//!
//! Provides a `SessionPhase` enum with validated transitions that
//! return `Result` instead of panicking.

use std::time::Instant;

use crate::error::TeleportError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of the single-receiver session.
///
/// ```text
///  NoConnection ──accept──► Connected ──handshake──► Streaming
///       ▲                       │                        │
///       └──── bad magic ────────┘◄──── write error ──────┘
/// ```
///
/// A new accept is valid from every phase; it supersedes the previous
/// receiver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No receiver. Initial / terminal state.
    #[default]
    NoConnection,

    /// A socket was accepted; its options handshake is being read.
    Connected,

    /// Handshake done; video and audio flow to the receiver.
    Streaming {
        /// When streaming began.
        since: Instant,
    },
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConnection => write!(f, "NoConnection"),
            Self::Connected => write!(f, "Connected"),
            Self::Streaming { .. } => write!(f, "Streaming"),
        }
    }
}

impl SessionPhase {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn has_connection(&self) -> bool {
        !matches!(self, Self::NoConnection)
    }

    /// How long the receiver has been streaming, `None` otherwise.
    pub fn streaming_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Streaming { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// A new socket was accepted. Valid from any phase.
    pub fn accept(&mut self) {
        *self = Self::Connected;
    }

    /// Transition to `Streaming`.
    ///
    /// Valid from: `Connected`.
    pub fn begin_streaming(&mut self) -> Result<(), TeleportError> {
        match self {
            Self::Connected => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(TeleportError::ProtocolViolation(
                "cannot stream: no connection awaiting handshake",
            )),
        }
    }

    /// The receiver went away or was rejected. Valid from any phase.
    pub fn disconnect(&mut self) {
        *self = Self::NoConnection;
    }
}
