//! Frame encode/reorder pipeline.
//!
//! ```text
//! submit ──► ReorderBuffer::reserve ──► spawn task
//!                                          │ spawn_blocking(FrameEncoder::encode)
//!                                          ▼
//!                          ReorderBuffer::complete ──► drain_ready ──► FrameSink
//! ```

pub mod encoder;
pub mod engine;
pub mod quality;
pub mod reorder;

pub use encoder::{FrameEncoder, JpegEncoder};
pub use engine::EncodeEngine;
pub use quality::QualityCell;
pub use reorder::{ReorderBuffer, Ticket};
