//! Synthetic frame source.
//!
//! Generates a moving gradient at a fixed capture rate. Used by `alertd`
//! when no real camera is attached, and by tests.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, RGB_CHANNELS};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Capture rate in frames per second. `0` produces frames as fast as asked.
    pub target_fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    connected: bool,
    frame_count: u64,
    scene_state: u8,
    next_capture: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        Ok(Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
            next_capture: None,
        })
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.target_fps as f64))
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count =
            self.config.width as usize * self.config.height as usize * RGB_CHANNELS;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected ({}x{} @ {} fps)",
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source is not connected"));
        }
        if let Some(interval) = self.frame_interval() {
            let now = Instant::now();
            let deadline = self.next_capture.unwrap_or(now);
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            // Do not try to catch up after a stall.
            self.next_capture = Some(deadline.max(now) + interval);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: format!("synthetic:{}x{}", self.config.width, self.config.height),
        }
    }
}
