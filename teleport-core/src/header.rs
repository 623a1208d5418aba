//! Fixed-size binary headers.
//!
//! ```text
//! WireHeader (16 bytes, little-endian)      OptionsHeader (8 bytes)
//! tag:        [u8; 4]                       magic: [u8; 4]  "OPTS"
//! timestamp:  i64                           size:  i32
//! size:       i32
//! ```

use crate::error::TeleportError;

/// Tag of an encoded video frame.
pub const TAG_JPEG: [u8; 4] = *b"JPEG";
/// Tag of a raw PCM audio frame.
pub const TAG_WAVE: [u8; 4] = *b"WAVE";
/// Magic of the options handshake.
pub const MAGIC_OPTS: [u8; 4] = *b"OPTS";

pub type WireHeaderBytes = [u8; WIRE_HEADER_LENGTH];
pub const WIRE_HEADER_LENGTH: usize = 16;

pub type OptionsHeaderBytes = [u8; OPTIONS_HEADER_LENGTH];
pub const OPTIONS_HEADER_LENGTH: usize = 8;

// ── WireHeader ───────────────────────────────────────────────────

/// Header in front of every payload sent to a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    tag: [u8; 4],
    timestamp: i64,
    size: i32,
}

impl WireHeader {
    pub fn new(tag: [u8; 4], timestamp: i64, size: i32) -> Self {
        Self {
            tag,
            timestamp,
            size,
        }
    }

    pub fn to_bytes(&self) -> WireHeaderBytes {
        let mut header: WireHeaderBytes = [0; WIRE_HEADER_LENGTH];
        header[0..4].copy_from_slice(&self.tag);
        header[4..12].copy_from_slice(&self.timestamp.to_le_bytes());
        header[12..16].copy_from_slice(&self.size.to_le_bytes());
        header
    }

    pub fn from_bytes(bytes: &WireHeaderBytes) -> Result<Self, TeleportError> {
        let tag: [u8; 4] = bytes[0..4]
            .try_into()
            .map_err(|_| TeleportError::InvalidHeader("tag"))?;
        let timestamp = i64::from_le_bytes(
            bytes[4..12]
                .try_into()
                .map_err(|_| TeleportError::InvalidHeader("timestamp"))?,
        );
        let size = i32::from_le_bytes(
            bytes[12..16]
                .try_into()
                .map_err(|_| TeleportError::InvalidHeader("size"))?,
        );
        if size < 0 {
            return Err(TeleportError::InvalidHeader("negative payload size"));
        }
        Ok(Self {
            tag,
            timestamp,
            size,
        })
    }

    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload_length(&self) -> usize {
        self.size as usize
    }
}

// ── OptionsHeader ────────────────────────────────────────────────

/// Header of the handshake a receiver sends right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsHeader {
    magic: [u8; 4],
    size: i32,
}

impl OptionsHeader {
    pub fn new(size: i32) -> Self {
        Self {
            magic: MAGIC_OPTS,
            size,
        }
    }

    pub fn to_bytes(&self) -> OptionsHeaderBytes {
        let mut header: OptionsHeaderBytes = [0; OPTIONS_HEADER_LENGTH];
        header[0..4].copy_from_slice(&self.magic);
        header[4..8].copy_from_slice(&self.size.to_le_bytes());
        header
    }

    /// Parse the handshake header; a wrong magic is a protocol violation.
    pub fn from_bytes(bytes: &OptionsHeaderBytes) -> Result<Self, TeleportError> {
        let magic: [u8; 4] = bytes[0..4]
            .try_into()
            .map_err(|_| TeleportError::InvalidHeader("magic"))?;
        if magic != MAGIC_OPTS {
            return Err(TeleportError::InvalidMagic(magic));
        }
        let size = i32::from_le_bytes(
            bytes[4..8]
                .try_into()
                .map_err(|_| TeleportError::InvalidHeader("size"))?,
        );
        if size < 0 {
            return Err(TeleportError::InvalidHeader("negative options size"));
        }
        Ok(Self { magic, size })
    }

    pub fn payload_length(&self) -> usize {
        self.size as usize
    }
}
