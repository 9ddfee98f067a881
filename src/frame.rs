//! Captured video frames.
//!
//! A `Frame` is an RGB8 image plus the monotonic instant it was captured at.
//! Frames flow from a frame source through the pacer into the detector, and
//! are only written to disk when an alert fires and snapshots are enabled.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// Bytes per pixel for RGB8 frames.
pub const RGB_CHANNELS: usize = 3;

pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number assigned by the source (starts at 1).
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap RGB8 pixels captured now.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        Self::captured(pixels, width, height, sequence, Instant::now())
    }

    /// Wrap RGB8 pixels captured at a known instant.
    pub fn captured(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        captured_at: Instant,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = width as usize * height as usize * RGB_CHANNELS;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb8",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at,
        })
    }

    /// Solid-colour frame, used by the synthetic source and tests.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Result<Self> {
        let len = width as usize * height as usize;
        let pixels = rgb.iter().copied().cycle().take(len * RGB_CHANNELS).collect();
        Self::new(pixels, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
