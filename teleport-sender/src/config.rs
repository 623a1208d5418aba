//! Configuration for the synthetic sender.

use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use teleport_core::config::{DiscoveryConfig, OutputConfig, QueueLimits};

/// Largest generated frame side.
const MAX_DIMENSION: u32 = 65_535;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Output and transport settings.
    pub output: OutputSection,
    /// Generated media settings.
    pub source: SourceSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Which delivery model the sender runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One receiver connects to the output's own listener.
    #[default]
    Session,
    /// Every receiver that connects to `fanout_port` is admitted.
    Fanout,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Delivery model.
    pub mode: Mode,
    /// Name announced on the LAN; empty uses the host name.
    pub identifier: String,
    /// Listener address of the session model; port 0 picks one.
    pub bind_addr: String,
    /// TCP port receivers connect to in the fanout model; 0 picks one.
    pub fanout_port: u16,
    /// JPEG quality until a receiver sends its own.
    pub default_quality: i32,
    /// Frames in flight before new ones are dropped.
    pub max_pending_frames: usize,
    /// Options handshake deadline in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Announce the output on the LAN.
    pub discovery_enabled: bool,
    /// Multicast group the announcement goes to.
    pub discovery_addr: String,
    /// Announcement period in milliseconds.
    pub discovery_interval_ms: u64,
    /// Per-receiver queue capacity (fanout).
    pub queue_capacity: usize,
    /// Depth that triggers a "send queue high" warning (fanout).
    pub queue_high_watermark: usize,
    /// Depth above which messages are dropped (fanout).
    pub queue_drop_watermark: usize,
}

/// Generated media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Video frames per second.
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Raw layout of generated frames: "rgba", "bgra", "i420", "nv12", ...
    pub pixel_format: String,
    /// Generate a sine tone alongside the video.
    pub audio: bool,
    /// Tone frequency in Hz.
    pub tone_hz: f32,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "teleport_core=debug".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for OutputSection {
    fn default() -> Self {
        let core = OutputConfig::default();
        Self {
            mode: Mode::Session,
            identifier: core.identifier,
            bind_addr: core.bind_addr.to_string(),
            fanout_port: 0,
            default_quality: core.default_quality,
            max_pending_frames: core.max_pending_frames,
            handshake_timeout_ms: core.handshake_timeout.as_millis() as u64,
            discovery_enabled: core.discovery.enabled,
            discovery_addr: core.discovery.group.to_string(),
            discovery_interval_ms: core.discovery.interval.as_millis() as u64,
            queue_capacity: core.queue.capacity,
            queue_high_watermark: core.queue.high_watermark,
            queue_drop_watermark: core.queue.drop_watermark,
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 640,
            height: 360,
            pixel_format: "i420".into(),
            audio: true,
            tone_hz: 440.0,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Build the core output settings, clamping out-of-range values.
    pub fn to_output_config(&self) -> Result<OutputConfig, AddrParseError> {
        let out = &self.output;
        let bind_addr: SocketAddr = out.bind_addr.parse()?;
        let group: SocketAddr = out.discovery_addr.parse()?;

        let capacity = out.queue_capacity.max(1);
        let drop_watermark = out.queue_drop_watermark.min(capacity - 1);
        let high_watermark = out.queue_high_watermark.min(drop_watermark);

        Ok(OutputConfig {
            identifier: out.identifier.trim().to_string(),
            bind_addr,
            default_quality: out.default_quality.clamp(1, 100),
            max_pending_frames: out.max_pending_frames.max(1),
            handshake_timeout: Duration::from_millis(out.handshake_timeout_ms.max(1)),
            discovery: DiscoveryConfig {
                enabled: out.discovery_enabled,
                group,
                interval: Duration::from_millis(out.discovery_interval_ms.max(100)),
            },
            queue: QueueLimits {
                capacity,
                high_watermark,
                drop_watermark,
            },
        })
    }

    /// Frames per second, kept within 1..=120.
    pub fn fps(&self) -> u32 {
        self.source.fps.clamp(1, 120)
    }

    /// Generated frame size, each side kept within 1..=65535.
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.source.width.clamp(1, MAX_DIMENSION),
            self.source.height.clamp(1, MAX_DIMENSION),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────
