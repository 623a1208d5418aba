use bytes::BytesMut;

use crate::error::TeleportError;
use crate::header::{WIRE_HEADER_LENGTH, WireHeader, WireHeaderBytes};
use crate::packet::{MAX_PAYLOAD_SIZE, WireMessage};

/// Frames a teleport byte stream into [`WireMessage`]s.
///
/// The sender never reads its own stream; receivers and tests do.
#[derive(Debug, Default)]
pub struct TeleportCodec {}

impl tokio_util::codec::Decoder for TeleportCodec {
    type Item = WireMessage;
    type Error = TeleportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < WIRE_HEADER_LENGTH {
            return Ok(None);
        }

        let header_bytes: &WireHeaderBytes = src[..WIRE_HEADER_LENGTH]
            .try_into()
            .map_err(|_| TeleportError::InvalidHeader("short header"))?;
        let header = WireHeader::from_bytes(header_bytes)?;

        if header.payload_length() > MAX_PAYLOAD_SIZE {
            return Err(TeleportError::PayloadTooLarge {
                size: header.payload_length(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total = WIRE_HEADER_LENGTH + header.payload_length();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        WireMessage::from_bytes(src.split_to(total).freeze()).map(Some)
    }
}

impl tokio_util::codec::Encoder<WireMessage> for TeleportCodec {
    type Error = TeleportError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}
