//! Frame types handed over by the host and produced for the encoder.
//!
//! Raw frames **borrow** the host's buffers: they are only valid for the
//! duration of a capture callback. Anything that must outlive the
//! callback is copied into an owned [`VideoImage`] or audio payload first.

use crate::error::TeleportError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw captured video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba,
    /// Packed 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra,
    /// Packed 4 bytes per pixel: Blue, Green, Red, unused.
    Bgrx,
    /// Packed 3 bytes per pixel: Blue, Green, Red.
    Bgr3,
    /// Single 8-bit luma plane.
    Y800,
    /// Planar Y, U, V with 2x2 subsampled chroma.
    I420,
    /// Y plane followed by one interleaved UV plane, 2x2 subsampled.
    Nv12,
    /// Planar Y, U, V without subsampling.
    I444,
}

impl PixelFormat {
    /// Number of planes the host must supply for this format.
    pub const fn plane_count(self) -> usize {
        match self {
            PixelFormat::Rgba
            | PixelFormat::Bgra
            | PixelFormat::Bgrx
            | PixelFormat::Bgr3
            | PixelFormat::Y800 => 1,
            PixelFormat::Nv12 => 2,
            PixelFormat::I420 | PixelFormat::I444 => 3,
        }
    }

    /// Minimum bytes per row of plane `index` for a frame `width` pixels wide.
    pub const fn min_stride(self, index: usize, width: usize) -> usize {
        let half = width.div_ceil(2);
        match (self, index) {
            (PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Bgrx, _) => width * 4,
            (PixelFormat::Bgr3, _) => width * 3,
            (PixelFormat::Nv12, 1) => half * 2,
            (PixelFormat::I420, 1 | 2) => half,
            _ => width,
        }
    }

    /// Rows in plane `index` for a frame `height` pixels tall.
    pub const fn plane_rows(self, index: usize, height: usize) -> usize {
        match (self, index) {
            (PixelFormat::I420 | PixelFormat::Nv12, 1 | 2) => height.div_ceil(2),
            _ => height,
        }
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = TeleportError;

    /// Parse a lowercase format name such as `"i420"` or `"bgra"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgba" => Ok(PixelFormat::Rgba),
            "bgra" => Ok(PixelFormat::Bgra),
            "bgrx" => Ok(PixelFormat::Bgrx),
            "bgr3" => Ok(PixelFormat::Bgr3),
            "y800" => Ok(PixelFormat::Y800),
            "i420" => Ok(PixelFormat::I420),
            "nv12" => Ok(PixelFormat::Nv12),
            "i444" => Ok(PixelFormat::I444),
            other => Err(TeleportError::InvalidFrame(format!(
                "unsupported pixel format {other:?}"
            ))),
        }
    }
}

// ── VideoPlane / RawVideoFrame ───────────────────────────────────

/// One plane of a raw frame: `stride` bytes per row.
#[derive(Debug, Clone, Copy)]
pub struct VideoPlane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// A raw video frame as delivered by the host capture callback.
#[derive(Debug, Clone)]
pub struct RawVideoFrame<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Planes in the order the format defines.
    pub planes: Vec<VideoPlane<'a>>,
    /// Monotonic capture timestamp, passed through to the wire unchanged.
    pub timestamp: i64,
}

impl RawVideoFrame<'_> {
    /// Check that every plane the format needs is present and large enough.
    pub fn validate(&self) -> Result<(), TeleportError> {
        let (width, height) = (self.width as usize, self.height as usize);
        if width == 0 || height == 0 {
            return Err(TeleportError::InvalidFrame(format!(
                "empty frame {width}x{height}"
            )));
        }
        if width > u16::MAX as usize || height > u16::MAX as usize {
            return Err(TeleportError::InvalidFrame(format!(
                "frame {width}x{height} exceeds 65535x65535"
            )));
        }
        if self.planes.len() < self.format.plane_count() {
            return Err(TeleportError::InvalidFrame(format!(
                "{:?} needs {} planes, got {}",
                self.format,
                self.format.plane_count(),
                self.planes.len()
            )));
        }

        for (index, plane) in self.planes.iter().take(self.format.plane_count()).enumerate() {
            let row = self.format.min_stride(index, width);
            let rows = self.format.plane_rows(index, height);
            if plane.stride < row {
                return Err(TeleportError::InvalidFrame(format!(
                    "plane {index} stride {} < {row}",
                    plane.stride
                )));
            }
            let needed = plane.stride * (rows - 1) + row;
            if plane.data.len() < needed {
                return Err(TeleportError::InvalidFrame(format!(
                    "plane {index} holds {} bytes, needs {needed}",
                    plane.data.len()
                )));
            }
        }
        Ok(())
    }
}

// ── VideoImage ───────────────────────────────────────────────────

/// Channel order of a converted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Rgba,
    Bgra,
    Bgr,
    Luma,
    /// Interleaved full-resolution Y, Cb, Cr.
    Ycbcr,
}

impl ImageLayout {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ImageLayout::Rgba | ImageLayout::Bgra => 4,
            ImageLayout::Bgr | ImageLayout::Ycbcr => 3,
            ImageLayout::Luma => 1,
        }
    }
}

/// A tightly packed, owned image that can outlive the capture callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoImage {
    pub width: u16,
    pub height: u16,
    pub layout: ImageLayout,
    pub data: Vec<u8>,
}

// ── Audio ────────────────────────────────────────────────────────

/// Sample encoding of raw audio.
///
/// Discriminants match the host's audio format enumeration and are
/// carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SampleFormat {
    U8 = 1,
    S16 = 2,
    S32 = 3,
    F32 = 4,
    U8Planar = 5,
    S16Planar = 6,
    S32Planar = 7,
    F32Planar = 8,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8Planar => 1,
            SampleFormat::S16 | SampleFormat::S16Planar => 2,
            SampleFormat::S32 | SampleFormat::S32Planar | SampleFormat::F32 | SampleFormat::F32Planar => 4,
        }
    }

    pub const fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::U8Planar
                | SampleFormat::S16Planar
                | SampleFormat::S32Planar
                | SampleFormat::F32Planar
        )
    }

    /// The interleaved counterpart of a planar format.
    pub const fn packed(self) -> Self {
        match self {
            SampleFormat::U8Planar => SampleFormat::U8,
            SampleFormat::S16Planar => SampleFormat::S16,
            SampleFormat::S32Planar => SampleFormat::S32,
            SampleFormat::F32Planar => SampleFormat::F32,
            other => other,
        }
    }
}

/// Sample layout descriptor of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u32,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
}

/// A raw audio frame as delivered by the host capture callback.
///
/// Interleaved formats use `planes[0]` only; planar formats supply one
/// plane per channel.
#[derive(Debug, Clone)]
pub struct RawAudioFrame<'a> {
    pub format: AudioFormat,
    /// Samples per channel.
    pub frames: u32,
    pub timestamp: i64,
    pub planes: Vec<&'a [u8]>,
}
