//! alertd - real-time detection-to-alert daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured source
//! 2. Paces detection to `fps_process`
//! 3. Fires an alert once an object of interest persists across frames
//! 4. Delivers alerts over webhook and email without stalling the loop

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vision_alert::config::validate_camera_id;
use vision_alert::{
    AlertBuilder, AlertPipeline, AlertdConfig, FrameOutcome, FrameSource, NotificationDispatcher,
    ScriptedDetector, SyntheticConfig, SyntheticSource,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "VISION_CONFIG")]
    config: Option<PathBuf>,
    /// Camera identifier reported in alerts (overrides the config file).
    #[arg(long, env = "VISION_CAMERA_ID")]
    camera_id: Option<String>,
    /// Stop after this many captured frames (runs until Ctrl-C if unset).
    #[arg(long, env = "ALERTD_MAX_FRAMES")]
    max_frames: Option<u64>,
    /// Capture rate of the frame source.
    #[arg(long, env = "ALERTD_CAPTURE_FPS", default_value_t = 15)]
    capture_fps: u32,
    /// Presence script for the synthetic detector, one character per
    /// processed frame: `1` = object present, `0` = clear. Loops.
    #[arg(long, env = "ALERTD_SCENARIO", default_value = "00001111100000")]
    scenario: String,
    /// Class reported by the synthetic detector.
    #[arg(long, env = "ALERTD_SCENARIO_CLASS", default_value = "knife")]
    scenario_class: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AlertdConfig::load_from(args.config.as_deref())?;
    if let Some(camera_id) = &args.camera_id {
        cfg.camera_id = validate_camera_id(camera_id)?;
    }

    let presence = parse_scenario(&args.scenario)?;
    let detector = ScriptedDetector::from_presence(&presence, &args.scenario_class, 0.9)?;

    let dispatcher = NotificationDispatcher::from_settings(&cfg.dispatch)?;
    let mut pipeline = AlertPipeline::new(
        cfg.pipeline_settings(),
        Box::new(detector),
        AlertBuilder::new(cfg.severity.clone()),
        dispatcher,
    )?;
    pipeline.warm_up()?;

    let mut source = SyntheticSource::new(SyntheticConfig {
        target_fps: args.capture_fps,
        ..SyntheticConfig::default()
    })?;
    source.connect()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "alertd running. camera={} fps_process={} min_persistent_frames={}",
        cfg.camera_id,
        cfg.fps_process,
        cfg.min_persistent_frames
    );
    log::info!(
        "classes of interest: {}",
        cfg.inference.classes_of_interest.join(", ")
    );
    let channels = pipeline.dispatcher().channels();
    if channels.is_empty() {
        log::warn!("no notification channels enabled; alerts will only be logged");
    } else {
        log::info!("notification channels: {}", channels.join(", "));
    }

    let mut last_health_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        if args
            .max_frames
            .is_some_and(|max| source.stats().frames_captured >= max)
        {
            log::info!("reached --max-frames, stopping");
            break;
        }

        let frame = source.next_frame().context("frame source failed")?;
        match pipeline.process(&frame) {
            Ok(FrameOutcome::Alerted(report)) => {
                log::debug!("alert dispatch: {:?}", report.dispatch);
            }
            Ok(_) => {}
            Err(err) => log::error!("frame {} skipped: {:#}", frame.sequence, err),
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = pipeline.stats();
            let queue = pipeline.dispatcher().queue_stats();
            log::info!(
                "health source={} frames_seen={} processed={} alerts={} detector_errors={} queued={} dropped={}",
                source.is_healthy(),
                stats.frames_seen,
                stats.frames_processed,
                stats.alerts,
                stats.detector_errors,
                queue.submitted,
                queue.dropped
            );
            last_health_log = Instant::now();
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "alertd stopped after {} frames ({} processed, {} alerts)",
        stats.frames_seen,
        stats.frames_processed,
        stats.alerts
    );
    Ok(())
}

fn parse_scenario(raw: &str) -> Result<Vec<bool>> {
    let presence = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(anyhow!("scenario may only contain 0 and 1, got '{}'", other)),
        })
        .collect::<Result<Vec<_>>>()?;
    if presence.is_empty() {
        return Err(anyhow!("scenario must not be empty"));
    }
    Ok(presence)
}
