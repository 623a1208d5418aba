use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TeleportError;
use crate::header::{self, TAG_JPEG, TAG_WAVE, WIRE_HEADER_LENGTH, WireHeader, WireHeaderBytes};

/// Largest payload a single message may carry.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// One tagged, length-prefixed unit of the outbound stream.
#[derive(Clone, PartialEq, Eq)]
pub struct WireMessage {
    header: WireHeader,
    payload: Bytes,
}

impl WireMessage {
    pub fn new(tag: [u8; 4], timestamp: i64, payload: Bytes) -> Result<Self, TeleportError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TeleportError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            header: WireHeader::new(tag, timestamp, payload.len() as i32),
            payload,
        })
    }

    /// An encoded video frame.
    pub fn jpeg(timestamp: i64, payload: Bytes) -> Result<Self, TeleportError> {
        Self::new(TAG_JPEG, timestamp, payload)
    }

    /// A serialized audio frame.
    pub fn wave(timestamp: i64, payload: Bytes) -> Result<Self, TeleportError> {
        Self::new(TAG_WAVE, timestamp, payload)
    }

    pub fn tag(&self) -> [u8; 4] {
        self.header.tag()
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes this message occupies on the wire.
    pub fn wire_len(&self) -> usize {
        WIRE_HEADER_LENGTH + self.payload.len()
    }

    /// Header and payload as one contiguous buffer, ready for a single write.
    pub fn to_bytes(&self) -> Bytes {
        let mut packet = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut packet);
        packet.freeze()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Parse one complete message. The payload shares `bytes`.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, TeleportError> {
        if bytes.len() < header::WIRE_HEADER_LENGTH {
            return Err(TeleportError::InvalidHeader("message shorter than header"));
        }
        let header_bytes: &WireHeaderBytes = bytes[0..WIRE_HEADER_LENGTH]
            .try_into()
            .map_err(|_| TeleportError::InvalidHeader("message shorter than header"))?;
        let header = WireHeader::from_bytes(header_bytes)?;

        if header.payload_length() > MAX_PAYLOAD_SIZE {
            return Err(TeleportError::PayloadTooLarge {
                size: header.payload_length(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if bytes.len() != WIRE_HEADER_LENGTH + header.payload_length() {
            return Err(TeleportError::InvalidHeader(
                "message length does not match header size",
            ));
        }

        Ok(Self {
            header,
            payload: bytes.slice(WIRE_HEADER_LENGTH..),
        })
    }
}

impl Debug for WireMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireMessage")
            .field("tag", &String::from_utf8_lossy(&self.header.tag()))
            .field("timestamp", &self.header.timestamp())
            .field("payload_length", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_message_layout() {
        let msg = WireMessage::jpeg(42, Bytes::from_static(&[0xFF, 0xD8, 0xFF])).unwrap();
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), WIRE_HEADER_LENGTH + 3);
        assert_eq!(&bytes[0..4], b"JPEG");
        assert_eq!(&bytes[4..12], &42i64.to_le_bytes());
        assert_eq!(&bytes[12..16], &3i32.to_le_bytes());
        assert_eq!(&bytes[16..], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn empty_payload_is_still_a_message() {
        let msg = WireMessage::jpeg(7, Bytes::new()).unwrap();
        let parsed = WireMessage::from_bytes(msg.to_bytes()).unwrap();
        assert_eq!(parsed.payload().len(), 0);
        assert_eq!(parsed.timestamp(), 7);
    }

    #[test]
    fn from_bytes_rejects_trailing_data() {
        let mut bytes = WireMessage::wave(1, Bytes::from_static(b"ab"))
            .unwrap()
            .to_bytes()
            .to_vec();
        bytes.push(0);
        assert!(WireMessage::from_bytes(Bytes::from(bytes)).is_err());
    }
}
