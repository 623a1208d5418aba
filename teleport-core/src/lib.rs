//! # teleport-core
//!
//! Low-latency frame streaming from a capture host to network receivers.
//!
//! This crate contains:
//! - **Wire framing**: `WireHeader`, `WireMessage`, the `OPTS` handshake and
//!   `TeleportCodec` for framed TCP I/O via `tokio_util`
//! - **Media**: raw host frame descriptors and their synchronous conversion
//! - **Pipeline**: `EncodeEngine`, concurrent JPEG encode with in-order delivery
//! - **Transport**: `SessionTransport` (one receiver) and `FanoutTransport`
//!   (many receivers with per-receiver load shedding)
//! - **Discovery**: the LAN announcement beacon
//! - **Output**: the per-instance context object tying the above together
//! - **Error**: `TeleportError`, a typed `thiserror`-based error hierarchy

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod header;
pub mod media;
pub mod options;
pub mod output;
pub mod packet;
pub mod pipeline;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::TeleportCodec;
pub use config::{DiscoveryConfig, OutputConfig, QueueLimits};
pub use discovery::{Announcement, Beacon};
pub use error::TeleportError;
pub use header::{MAGIC_OPTS, OptionsHeader, TAG_JPEG, TAG_WAVE, WIRE_HEADER_LENGTH, WireHeader};
pub use media::{
    AudioFormat, ImageLayout, PixelFormat, RawAudioFrame, RawVideoFrame, SampleFormat, VideoImage,
    VideoPlane,
};
pub use options::Options;
pub use output::{FanoutOutput, Output, SessionOutput, VideoOutcome};
pub use packet::{MAX_PAYLOAD_SIZE, WireMessage};
pub use pipeline::{EncodeEngine, FrameEncoder, JpegEncoder, QualityCell};
pub use state::SessionPhase;
pub use transport::{
    BroadcastSummary, FanoutTransport, FrameSink, PeerConnection, PeerId, QueueVerdict,
    SessionTransport, TcpPeer,
};
