//! Temporal persistence (debounce) for frame-level detections.
//!
//! A single frame with a weapon-like object is not an alert: the object has to
//! stay in view for `min_persistent_frames` consecutive processed frames. The
//! tracker fires once when that run completes and starts counting again from
//! zero, so sustained presence produces one alert per full run rather than one
//! per frame.

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    /// No qualifying detection in the current frame run.
    Idle,
    /// Qualifying detections for `hits` consecutive frames, below threshold.
    Accumulating { hits: u32 },
}

#[derive(Clone, Debug)]
pub struct PersistenceTracker {
    min_persistent_frames: u32,
    consecutive_hits: u32,
    triggers: u64,
}

impl PersistenceTracker {
    pub fn new(min_persistent_frames: u32) -> Result<Self> {
        if min_persistent_frames == 0 {
            return Err(anyhow!("min_persistent_frames must be at least 1"));
        }
        Ok(Self {
            min_persistent_frames,
            consecutive_hits: 0,
            triggers: 0,
        })
    }

    /// Feed one processed frame. Returns true when this frame completes a run
    /// and an alert must be raised.
    pub fn observe(&mut self, qualifying: bool) -> bool {
        if !qualifying {
            self.consecutive_hits = 0;
            return false;
        }
        self.consecutive_hits += 1;
        if self.consecutive_hits >= self.min_persistent_frames {
            self.consecutive_hits = 0;
            self.triggers += 1;
            return true;
        }
        false
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    pub fn min_persistent_frames(&self) -> u32 {
        self.min_persistent_frames
    }

    /// Alerts fired since construction.
    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    pub fn state(&self) -> TrackerState {
        match self.consecutive_hits {
            0 => TrackerState::Idle,
            hits => TrackerState::Accumulating { hits },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_indices(threshold: u32, frames: &[bool]) -> Vec<usize> {
        let mut tracker = PersistenceTracker::new(threshold).unwrap();
        frames
            .iter()
            .enumerate()
            .filter(|(_, hit)| tracker.observe(**hit))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn rejects_zero_threshold() {
        assert!(PersistenceTracker::new(0).is_err());
    }

    #[test]
    fn interrupted_run_triggers_once_after_reset() {
        let frames = [true, true, false, true, true, true, true];
        assert_eq!(trigger_indices(3, &frames), vec![5]);

        let mut tracker = PersistenceTracker::new(3).unwrap();
        for hit in frames {
            tracker.observe(hit);
        }
        assert_eq!(tracker.consecutive_hits(), 1);
        assert_eq!(tracker.triggers(), 1);
    }

    #[test]
    fn counter_tracks_current_run_and_resets_on_miss() {
        let mut tracker = PersistenceTracker::new(10).unwrap();
        let frames = [true, true, true, false, true, false, false, true, true];
        let mut run = 0u32;
        for hit in frames {
            tracker.observe(hit);
            run = if hit { run + 1 } else { 0 };
            assert_eq!(tracker.consecutive_hits(), run);
        }
        assert_eq!(tracker.state(), TrackerState::Accumulating { hits: 2 });
    }

    #[test]
    fn counter_is_zero_right_after_trigger() {
        let mut tracker = PersistenceTracker::new(2).unwrap();
        assert!(!tracker.observe(true));
        assert_eq!(tracker.state(), TrackerState::Accumulating { hits: 1 });
        assert!(tracker.observe(true));
        assert_eq!(tracker.consecutive_hits(), 0);
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[test]
    fn sustained_presence_fires_once_per_full_run() {
        let frames = [true; 9];
        assert_eq!(trigger_indices(3, &frames), vec![2, 5, 8]);
    }

    #[test]
    fn threshold_one_fires_on_every_qualifying_frame() {
        let frames = [true, false, true, true, false];
        assert_eq!(trigger_indices(1, &frames), vec![0, 2, 3]);
    }

    #[test]
    fn no_detections_never_trigger() {
        assert!(trigger_indices(1, &[false; 20]).is_empty());
    }
}
