//! JPEG compression of converted video images.
//!
//! The encoder is a trait so the engine can be driven with instrumented
//! codecs in tests; production uses [`JpegEncoder`].

use jpeg_encoder::{ColorType, Encoder};

use crate::error::TeleportError;
use crate::media::types::{ImageLayout, VideoImage};

/// A synchronous image codec, called from a blocking worker thread.
pub trait FrameEncoder: Send + Sync + 'static {
    /// Compress `image` at `quality` (1..=100).
    fn encode(&self, image: &VideoImage, quality: u8) -> Result<Vec<u8>, TeleportError>;
}

// ── JpegEncoder ──────────────────────────────────────────────────

/// Baseline JPEG encoder backed by `jpeg-encoder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegEncoder;

impl JpegEncoder {
    fn color_type(layout: ImageLayout) -> ColorType {
        match layout {
            ImageLayout::Rgba => ColorType::Rgba,
            ImageLayout::Bgra => ColorType::Bgra,
            ImageLayout::Bgr => ColorType::Bgr,
            ImageLayout::Luma => ColorType::Luma,
            ImageLayout::Ycbcr => ColorType::Ycbcr,
        }
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, image: &VideoImage, quality: u8) -> Result<Vec<u8>, TeleportError> {
        let expected =
            image.width as usize * image.height as usize * image.layout.bytes_per_pixel();
        if image.data.len() != expected {
            return Err(TeleportError::InvalidFrame(format!(
                "image holds {} bytes, {}x{} {:?} needs {expected}",
                image.data.len(),
                image.width,
                image.height,
                image.layout
            )));
        }

        let mut out = Vec::with_capacity(expected / 8);
        let encoder = Encoder::new(&mut out, quality);
        encoder.encode(
            &image.data,
            image.width,
            image.height,
            Self::color_type(image.layout),
        )?;
        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────
