//! Synchronous copy of a borrowed host frame into an owned [`VideoImage`].
//!
//! Packed RGB layouts are repacked without padding. YUV layouts are
//! upsampled to full-resolution interleaved Y, Cb, Cr which the JPEG
//! encoder consumes directly, so no color-space math happens here.

use crate::error::TeleportError;
use crate::media::types::{ImageLayout, PixelFormat, RawVideoFrame, VideoImage, VideoPlane};

/// Convert `frame` into an image that no longer borrows host memory.
pub fn to_image(frame: &RawVideoFrame<'_>) -> Result<VideoImage, TeleportError> {
    frame.validate()?;

    let width = frame.width as usize;
    let height = frame.height as usize;
    let planes = &frame.planes;

    let (layout, data) = match frame.format {
        PixelFormat::Rgba => (ImageLayout::Rgba, pack_rows(&planes[0], width * 4, height)),
        PixelFormat::Bgra | PixelFormat::Bgrx => {
            (ImageLayout::Bgra, pack_rows(&planes[0], width * 4, height))
        }
        PixelFormat::Bgr3 => (ImageLayout::Bgr, pack_rows(&planes[0], width * 3, height)),
        PixelFormat::Y800 => (ImageLayout::Luma, pack_rows(&planes[0], width, height)),
        PixelFormat::I420 => (
            ImageLayout::Ycbcr,
            interleave_ycbcr(width, height, |x, y| {
                let (cx, cy) = (x / 2, y / 2);
                (
                    sample(&planes[0], x, y),
                    sample(&planes[1], cx, cy),
                    sample(&planes[2], cx, cy),
                )
            }),
        ),
        PixelFormat::Nv12 => (
            ImageLayout::Ycbcr,
            interleave_ycbcr(width, height, |x, y| {
                let (cx, cy) = (x / 2 * 2, y / 2);
                (
                    sample(&planes[0], x, y),
                    sample(&planes[1], cx, cy),
                    sample(&planes[1], cx + 1, cy),
                )
            }),
        ),
        PixelFormat::I444 => (
            ImageLayout::Ycbcr,
            interleave_ycbcr(width, height, |x, y| {
                (
                    sample(&planes[0], x, y),
                    sample(&planes[1], x, y),
                    sample(&planes[2], x, y),
                )
            }),
        ),
    };

    Ok(VideoImage {
        width: frame.width as u16,
        height: frame.height as u16,
        layout,
        data,
    })
}

/// Copy `height` rows of `row_len` bytes, dropping stride padding.
fn pack_rows(plane: &VideoPlane<'_>, row_len: usize, height: usize) -> Vec<u8> {
    if plane.stride == row_len {
        return plane.data[..row_len * height].to_vec();
    }

    let mut out = Vec::with_capacity(row_len * height);
    for y in 0..height {
        let start = y * plane.stride;
        out.extend_from_slice(&plane.data[start..start + row_len]);
    }
    out
}

#[inline]
fn sample(plane: &VideoPlane<'_>, x: usize, y: usize) -> u8 {
    plane.data[y * plane.stride + x]
}

fn interleave_ycbcr<F>(width: usize, height: usize, pixel: F) -> Vec<u8>
where
    F: Fn(usize, usize) -> (u8, u8, u8),
{
    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let (luma, cb, cr) = pixel(x, y);
            out.extend_from_slice(&[luma, cb, cr]);
        }
    }
    out
}
