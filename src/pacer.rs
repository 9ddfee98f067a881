//! Processing-rate gate.
//!
//! Capture runs at whatever rate the camera delivers; detection runs at most
//! `fps_process` times per second. Frames that arrive inside the interval are
//! passed through untouched.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct FramePacer {
    interval: Duration,
    last_processed: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps_process: f64) -> Result<Self> {
        if !fps_process.is_finite() || fps_process <= 0.0 {
            return Err(anyhow!(
                "fps_process must be a positive number, got {}",
                fps_process
            ));
        }
        let interval = Duration::try_from_secs_f64(1.0 / fps_process)
            .map_err(|_| anyhow!("fps_process {} gives an interval that is too long", fps_process))?;
        Ok(Self {
            interval,
            last_processed: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether the frame seen at `now` runs the detection path.
    ///
    /// The first frame is always processed. Accepting a frame restarts the interval.
    pub fn should_process(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_processed {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_processed = Some(now);
        true
    }
}
