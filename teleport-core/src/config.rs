//! Runtime settings of one output instance.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for an output and its transports.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Name announced on the discovery channel; empty means host name.
    pub identifier: String,
    /// Address the session listener binds; port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
    /// JPEG quality used until a receiver asks for another.
    pub default_quality: i32,
    /// Frames allowed in the reorder buffer before new ones are shed.
    pub max_pending_frames: usize,
    /// How long to wait for a receiver's options handshake.
    pub handshake_timeout: Duration,
    /// Discovery announcements.
    pub discovery: DiscoveryConfig,
    /// Per-receiver queue limits of the fanout transport.
    pub queue: QueueLimits,
}

/// Settings of the LAN announcement beacon.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Multicast group and port the announcement is sent to.
    pub group: SocketAddr,
    pub interval: Duration,
}

/// Outbound queue thresholds of one fanout receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Channel capacity.
    pub capacity: usize,
    /// Depth above which a "high" warning is logged; the message is still queued.
    pub high_watermark: usize,
    /// Depth above which messages are dropped for that receiver.
    pub drop_watermark: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            default_quality: 90,
            max_pending_frames: 20,
            handshake_timeout: Duration::from_secs(5),
            discovery: DiscoveryConfig::default(),
            queue: QueueLimits::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: SocketAddr::from(([239, 255, 255, 250], 9999)),
            interval: Duration::from_secs(1),
        }
    }
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            capacity: 1000,
            high_watermark: 100,
            drop_watermark: 800,
        }
    }
}
