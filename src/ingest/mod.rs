//! Frame ingestion sources.
//!
//! Sources produce `Frame` instances for the alert pipeline. Real capture
//! (webcam, RTSP, files) lives outside this crate and plugs in through
//! `FrameSource`; the synthetic source drives the daemon and tests.
//!
//! Sources must not write frames to disk. Snapshots are taken by the
//! pipeline, and only when an alert fires.

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::Result;

use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource {
    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}
