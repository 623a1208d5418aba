//! Raw host frames and their synchronous conversion into owned buffers.

pub mod audio;
pub mod convert;
pub mod types;

pub use types::{
    AudioFormat, ImageLayout, PixelFormat, RawAudioFrame, RawVideoFrame, SampleFormat, VideoImage,
    VideoPlane,
};
