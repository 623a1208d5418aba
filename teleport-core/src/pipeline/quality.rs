//! Encode quality shared between the handshake path and encode tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lowest quality the codec accepts.
pub const MIN_QUALITY: u8 = 1;
/// Highest quality the codec accepts.
pub const MAX_QUALITY: u8 = 100;

/// A cloneable handle to one output's quality setting.
///
/// Every clone observes the same value; separate outputs get separate cells.
#[derive(Debug, Clone)]
pub struct QualityCell(Arc<AtomicU8>);

impl QualityCell {
    pub fn new(quality: i32) -> Self {
        Self(Arc::new(AtomicU8::new(clamp(quality))))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Store a receiver-supplied value, clamped to the codec's range.
    pub fn set(&self, quality: i32) {
        self.0.store(clamp(quality), Ordering::Relaxed);
    }
}

fn clamp(quality: i32) -> u8 {
    quality.clamp(MIN_QUALITY as i32, MAX_QUALITY as i32) as u8
}
