//! Flattening of raw audio into a `WAVE` wire message.
//!
//! Payload layout (little-endian):
//! ```text
//! format:       i32   (interleaved SampleFormat discriminant)
//! sample_rate:  i32
//! channels:     i32
//! frames:       i32
//! samples:      frames * channels * bytes_per_sample
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::TeleportError;
use crate::media::types::RawAudioFrame;
use crate::packet::WireMessage;

/// Size of the audio descriptor at the start of every `WAVE` payload.
pub const AUDIO_HEADER_LENGTH: usize = 16;

/// Serialize `frame` into an owned `WAVE` message, interleaving planar input.
pub fn to_message(frame: &RawAudioFrame<'_>) -> Result<WireMessage, TeleportError> {
    let format = frame.format;
    let channels = format.channels as usize;
    let frames = frame.frames as usize;
    let sample = format.sample_format.bytes_per_sample();

    if channels == 0 {
        return Err(TeleportError::InvalidFrame("audio with zero channels".into()));
    }

    let plane_len = if format.sample_format.is_planar() {
        frames * sample
    } else {
        frames * sample * channels
    };
    let planes_needed = if format.sample_format.is_planar() {
        channels
    } else {
        1
    };

    if frame.planes.len() < planes_needed {
        return Err(TeleportError::InvalidFrame(format!(
            "{:?} audio needs {planes_needed} planes, got {}",
            format.sample_format,
            frame.planes.len()
        )));
    }
    if let Some((index, plane)) = frame
        .planes
        .iter()
        .take(planes_needed)
        .enumerate()
        .find(|(_, p)| p.len() < plane_len)
    {
        return Err(TeleportError::InvalidFrame(format!(
            "audio plane {index} holds {} bytes, needs {plane_len}",
            plane.len()
        )));
    }

    let mut payload = BytesMut::with_capacity(AUDIO_HEADER_LENGTH + frames * sample * channels);
    payload.put_i32_le(format.sample_format.packed() as i32);
    payload.put_i32_le(format.sample_rate as i32);
    payload.put_i32_le(format.channels as i32);
    payload.put_i32_le(frame.frames as i32);

    if format.sample_format.is_planar() {
        for i in 0..frames {
            let offset = i * sample;
            for plane in &frame.planes[..channels] {
                payload.put_slice(&plane[offset..offset + sample]);
            }
        }
    } else {
        payload.put_slice(&frame.planes[0][..plane_len]);
    }

    WireMessage::wave(frame.timestamp, payload.freeze())
}
