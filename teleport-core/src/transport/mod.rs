//! Delivery of framed payloads to receivers.
//!
//! | Module    | Model                                                   |
//! |-----------|---------------------------------------------------------|
//! | `session` | One receiver over TCP; a new accept supersedes the old  |
//! | `fanout`  | Many receivers, each with its own bounded send queue    |
//! | `peer`    | Contract for connections admitted into the fanout model |

use async_trait::async_trait;

use crate::packet::WireMessage;

pub mod fanout;
pub mod peer;
pub mod session;

pub use fanout::{BroadcastSummary, FanoutTransport, PeerId, QueueVerdict};
pub use peer::{PeerConnection, TcpPeer};
pub use session::SessionTransport;

/// Where the encode pipeline and audio path hand off finished messages.
///
/// Delivery never fails from the caller's point of view: transports
/// recover connection errors locally.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Send one message to every current receiver.
    async fn deliver(&self, message: WireMessage);

    /// Whether anyone is listening; capture work is skipped when not.
    fn has_receivers(&self) -> bool;

    /// Disconnect every receiver; later deliveries are no-ops.
    async fn close(&self) {}
}
