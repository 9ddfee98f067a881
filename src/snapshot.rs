//! JPEG snapshots of alert frames.
//!
//! Snapshots are best effort: any failure is logged and the alert goes out
//! without a frame.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

/// `frame_<YYYYmmdd_HHMMSS_micros>.jpg`
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("frame_{}.jpg", at.format("%Y%m%d_%H%M%S_%6f"))
}

/// Write `frame` as JPEG under `dir` and return the absolute path.
pub fn save_frame(frame: &Frame, dir: &Path) -> Option<PathBuf> {
    match try_save_frame(frame, dir, Utc::now()) {
        Ok(path) => {
            log::debug!("frame {} saved to {}", frame.sequence, path.display());
            Some(path)
        }
        Err(err) => {
            log::warn!("frame snapshot skipped: {:#}", err);
            None
        }
    }
}

fn try_save_frame(frame: &Frame, dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create snapshot dir {}", dir.display()))?;
    let dir = dir
        .canonicalize()
        .with_context(|| format!("resolve snapshot dir {}", dir.display()))?;

    let mut path = dir.join(snapshot_file_name(at));
    let mut suffix = 1u32;
    while path.exists() {
        let stem = snapshot_file_name(at);
        let stem = stem.trim_end_matches(".jpg");
        path = dir.join(format!("{stem}_{suffix}.jpg"));
        suffix += 1;
    }

    image::save_buffer_with_format(
        &path,
        frame.pixels(),
        frame.width,
        frame.height,
        image::ColorType::Rgb8,
        image::ImageFormat::Jpeg,
    )
    .with_context(|| format!("encode jpeg {}", path.display()))?;
    Ok(path)
}
