//! The options handshake a receiver sends right after connecting.
//!
//! An [`OptionsHeader`] is followed by `size` bytes of JSON:
//! `{ "Quality": <int> }`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TeleportError;
use crate::header::{OPTIONS_HEADER_LENGTH, OptionsHeader, OptionsHeaderBytes};

/// Upper bound on the JSON body; anything larger is treated as hostile.
pub const MAX_OPTIONS_SIZE: usize = 64 * 1024;

/// Receiver-selected stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    #[serde(rename = "Quality")]
    pub quality: i32,
}

impl Options {
    pub fn new(quality: i32) -> Self {
        Self { quality }
    }

    /// Header plus JSON body, as a receiver would send it.
    pub fn to_bytes(&self) -> Result<Bytes, TeleportError> {
        let body = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(OPTIONS_HEADER_LENGTH + body.len());
        buf.put_slice(&OptionsHeader::new(body.len() as i32).to_bytes());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }
}

/// Read exactly one options message from `reader`.
///
/// The magic is checked before the body is read, so a peer speaking the
/// wrong protocol is rejected after eight bytes.
pub async fn read_options<R>(reader: &mut R) -> Result<Options, TeleportError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes: OptionsHeaderBytes = [0; OPTIONS_HEADER_LENGTH];
    reader.read_exact(&mut header_bytes).await?;
    let header = OptionsHeader::from_bytes(&header_bytes)?;

    if header.payload_length() > MAX_OPTIONS_SIZE {
        return Err(TeleportError::PayloadTooLarge {
            size: header.payload_length(),
            max: MAX_OPTIONS_SIZE,
        });
    }

    let mut body = vec![0u8; header.payload_length()];
    reader.read_exact(&mut body).await?;

    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn reads_quality() {
        let bytes = Options::new(50).to_bytes().unwrap();
        let mut mock = Builder::new().read(&bytes[..8]).read(&bytes[8..]).build();

        let options = read_options(&mut mock).await.unwrap();
        assert_eq!(options.quality, 50);
    }

    #[tokio::test]
    async fn rejects_bad_magic_before_body() {
        let mut mock = Builder::new().read(b"JUNK\x02\x00\x00\x00").build();

        let err = read_options(&mut mock).await.unwrap_err();
        assert!(matches!(err, TeleportError::InvalidMagic(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let body = b"{\"Quality\":";
        let mut msg = OptionsHeader::new(body.len() as i32).to_bytes().to_vec();
        msg.extend_from_slice(body);
        let mut mock = Builder::new().read(&msg).build();

        let err = read_options(&mut mock).await.unwrap_err();
        assert!(matches!(err, TeleportError::MalformedOptions(_)));
    }

    #[tokio::test]
    async fn truncated_body_is_io_error() {
        let mut mock = Builder::new()
            .read(&OptionsHeader::new(32).to_bytes())
            .read(b"{\"Qua")
            .build();

        let err = read_options(&mut mock).await.unwrap_err();
        assert!(matches!(err, TeleportError::Connection(_)));
    }

    #[test]
    fn json_field_name() {
        let json = serde_json::to_string(&Options::new(75)).unwrap();
        assert_eq!(json, r#"{"Quality":75}"#);
    }
}
