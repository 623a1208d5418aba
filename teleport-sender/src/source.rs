//! Synthetic capture: a moving test pattern and a sine tone.
//!
//! Both generators own their buffers and hand out borrowed raw frames,
//! the same way a capture host lends its buffers to a callback.

use std::f32::consts::TAU;

use teleport_core::{
    AudioFormat, PixelFormat, RawAudioFrame, RawVideoFrame, SampleFormat, VideoPlane,
};

// ── Video ────────────────────────────────────────────────────────

/// Diagonal gradient that scrolls a few pixels every frame.
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<(Vec<u8>, usize)>,
    frame: u64,
}

impl TestPattern {
    /// A zero side is raised to one pixel.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let planes = (0..format.plane_count())
            .map(|index| {
                let stride = format.min_stride(index, width as usize);
                let rows = format.plane_rows(index, height as usize);
                (vec![0u8; stride * rows], stride)
            })
            .collect();

        let mut pattern = Self {
            width,
            height,
            format,
            planes,
            frame: 0,
        };
        pattern.paint();
        pattern
    }

    /// Move the pattern one step.
    pub fn advance(&mut self) {
        self.frame += 1;
        self.paint();
    }

    /// Borrow the current frame.
    pub fn frame(&self, timestamp: i64) -> RawVideoFrame<'_> {
        RawVideoFrame {
            width: self.width,
            height: self.height,
            format: self.format,
            planes: self
                .planes
                .iter()
                .map(|(data, stride)| VideoPlane {
                    data,
                    stride: *stride,
                })
                .collect(),
            timestamp,
        }
    }

    fn paint(&mut self) {
        let shift = (self.frame * 4) as usize;
        let packed = self.format.plane_count() == 1;

        for (index, (data, stride)) in self.planes.iter_mut().enumerate() {
            for (y, row) in data.chunks_mut(*stride).enumerate() {
                for (x, byte) in row.iter_mut().enumerate() {
                    *byte = if index == 0 || packed {
                        (x + y + shift) as u8
                    } else {
                        // Chroma: a slow hue drift around neutral.
                        128u8.wrapping_add((shift / 8 + x / 16) as u8 & 0x3f)
                    };
                }
            }
        }
    }
}

// ── Audio ────────────────────────────────────────────────────────

/// Interleaved signed 16-bit sine tone.
#[derive(Debug)]
pub struct Tone {
    format: AudioFormat,
    step: f32,
    phase: f32,
    buffer: Vec<u8>,
    frames: u32,
}

impl Tone {
    pub fn new(frequency: f32, sample_rate: u32, channels: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            format: AudioFormat {
                channels: channels.max(1),
                sample_format: SampleFormat::S16,
                sample_rate,
            },
            step: TAU * frequency / sample_rate as f32,
            phase: 0.0,
            buffer: Vec::new(),
            frames: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Generate the next `frames` samples per channel.
    pub fn generate(&mut self, frames: u32) {
        let channels = self.format.channels as usize;
        self.buffer.clear();
        self.buffer.reserve(frames as usize * channels * 2);

        for _ in 0..frames {
            let value = (self.phase.sin() * i16::MAX as f32 * 0.25) as i16;
            for _ in 0..channels {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % TAU;
        }
        self.frames = frames;
    }

    /// Borrow the last generated block.
    pub fn frame(&self, timestamp: i64) -> RawAudioFrame<'_> {
        RawAudioFrame {
            format: self.format,
            frames: self.frames,
            timestamp,
            planes: vec![self.buffer.as_slice()],
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
