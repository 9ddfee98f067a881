//! Frame-to-alert pipeline.
//!
//! Runs on the caller's thread, one frame at a time:
//! 1. the pacer decides whether the frame is processed or passed through
//! 2. the detector runs; results are filtered to classes of interest
//! 3. the persistence tracker decides whether this frame fires an alert
//! 4. on fire: optional JPEG snapshot, payload build, dispatch
//!
//! Only dispatch crosses a thread boundary (background channels).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::alert::{AlertBuilder, AlertPayload};
use crate::detect::{DetectRequest, Detector};
use crate::frame::Frame;
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::pacer::FramePacer;
use crate::snapshot;
use crate::tracker::PersistenceTracker;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub camera_id: String,
    pub request: DetectRequest,
    pub fps_process: f64,
    pub min_persistent_frames: u32,
    /// Directory for alert snapshots; `None` disables frame saving.
    pub frames_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AlertReport {
    pub payload: Arc<AlertPayload>,
    pub dispatch: DispatchReport,
}

#[derive(Clone, Debug)]
pub enum FrameOutcome {
    /// Skipped by the pacer; hand the frame to display untouched.
    Passthrough,
    /// Processed, nothing of interest.
    Clear,
    /// Processed, objects of interest present but the run is not long enough yet.
    Accumulating { hits: u32, required: u32 },
    /// Processed and an alert was raised.
    Alerted(AlertReport),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub detector_errors: u64,
    pub alerts: u64,
}

pub struct AlertPipeline {
    camera_id: String,
    request: DetectRequest,
    detector: Box<dyn Detector>,
    pacer: FramePacer,
    tracker: PersistenceTracker,
    builder: AlertBuilder,
    dispatcher: NotificationDispatcher,
    frames_dir: Option<PathBuf>,
    stats: PipelineStats,
}

impl AlertPipeline {
    pub fn new(
        settings: PipelineSettings,
        detector: Box<dyn Detector>,
        builder: AlertBuilder,
        dispatcher: NotificationDispatcher,
    ) -> Result<Self> {
        let pacer = FramePacer::new(settings.fps_process)?;
        let tracker = PersistenceTracker::new(settings.min_persistent_frames)?;
        Ok(Self {
            camera_id: settings.camera_id,
            request: settings.request,
            detector,
            pacer,
            tracker,
            builder,
            dispatcher,
            frames_dir: settings.frames_dir,
            stats: PipelineStats::default(),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn tracker(&self) -> &PersistenceTracker {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.detector
            .warm_up()
            .with_context(|| format!("warm up detector '{}'", self.detector.name()))
    }

    /// Process a frame using its capture instant for pacing.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        self.process_at(frame, frame.captured_at())
    }

    /// Process a frame, pacing against `now`.
    ///
    /// A detector error is returned without touching the tracker; the frame
    /// counts as processed for pacing purposes.
    pub fn process_at(&mut self, frame: &Frame, now: Instant) -> Result<FrameOutcome> {
        self.stats.frames_seen += 1;
        if !self.pacer.should_process(now) {
            return Ok(FrameOutcome::Passthrough);
        }
        self.stats.frames_processed += 1;

        let raw = match self.detector.detect(frame, &self.request) {
            Ok(raw) => raw,
            Err(err) => {
                self.stats.detector_errors += 1;
                return Err(err).with_context(|| {
                    format!(
                        "detector '{}' failed on frame {}",
                        self.detector.name(),
                        frame.sequence
                    )
                });
            }
        };
        let detections = self.request.retain_qualifying(raw);

        if !self.tracker.observe(!detections.is_empty()) {
            return Ok(match self.tracker.consecutive_hits() {
                0 => FrameOutcome::Clear,
                hits => FrameOutcome::Accumulating {
                    hits,
                    required: self.tracker.min_persistent_frames(),
                },
            });
        }

        let frame_path = self
            .frames_dir
            .as_deref()
            .and_then(|dir| snapshot::save_frame(frame, dir));
        let payload = Arc::new(self.builder.build(
            &self.camera_id,
            &detections,
            frame_path.as_deref(),
        ));
        self.stats.alerts += 1;
        log::warn!(
            "alert #{} on {}: severity={} objects={} frame={}",
            self.stats.alerts,
            self.camera_id,
            payload.severity,
            payload.objects_detected.len(),
            payload.frame_path.as_deref().unwrap_or("-")
        );
        let dispatch = self.dispatcher.dispatch(payload.clone());
        Ok(FrameOutcome::Alerted(AlertReport { payload, dispatch }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;
    use crate::detect::{BoundingBox, Detection, ScriptedDetector};
    use crate::notify::{WebhookOutcome, WorkQueue};
    use anyhow::anyhow;
    use std::time::Duration;

    fn settings(min_frames: u32, frames_dir: Option<PathBuf>) -> PipelineSettings {
        PipelineSettings {
            camera_id: "webcam_0".to_string(),
            request: DetectRequest::new(0.5, 0.45, ["knife", "hammer"]),
            fps_process: 5.0,
            min_persistent_frames: min_frames,
            frames_dir,
        }
    }

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(None, WorkQueue::new("test", 1, 4).unwrap())
    }

    fn pipeline(detector: Box<dyn Detector>, min_frames: u32) -> AlertPipeline {
        AlertPipeline::new(
            settings(min_frames, None),
            detector,
            AlertBuilder::default(),
            dispatcher(),
        )
        .unwrap()
    }

    /// Feeds frames 200ms apart so every frame is processed at 5 fps.
    fn run(pipeline: &mut AlertPipeline, frames: usize) -> Vec<FrameOutcome> {
        let t0 = Instant::now();
        (0..frames)
            .map(|i| {
                let frame = Frame::solid(8, 8, [0, 0, 0], i as u64 + 1).unwrap();
                pipeline
                    .process_at(&frame, t0 + Duration::from_millis(200 * i as u64))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn alerts_once_after_persistent_run() {
        let pattern = [true, true, false, true, true, true, true];
        let detector = ScriptedDetector::from_presence(&pattern, "knife", 0.9).unwrap();
        let mut pipeline = pipeline(Box::new(detector), 3);
        let outcomes = run(&mut pipeline, pattern.len());

        let alerted: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, FrameOutcome::Alerted(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(alerted, vec![5]);
        assert!(matches!(outcomes[2], FrameOutcome::Clear));
        assert!(matches!(
            outcomes[4],
            FrameOutcome::Accumulating { hits: 2, required: 3 }
        ));
        let FrameOutcome::Alerted(report) = &outcomes[5] else {
            unreachable!()
        };
        assert_eq!(report.payload.severity, Severity::High);
        assert_eq!(report.payload.camera_id, "webcam_0");
        assert_eq!(report.dispatch.webhook, WebhookOutcome::Disabled);
        assert_eq!(pipeline.stats().alerts, 1);
        assert_eq!(pipeline.tracker().consecutive_hits(), 1);
    }

    #[test]
    fn capitalized_labels_still_raise_alerts() {
        let detector = ScriptedDetector::from_presence(&[true], "Knife", 0.9).unwrap();
        let mut pipeline = pipeline(Box::new(detector), 1);
        let outcomes = run(&mut pipeline, 1);
        let FrameOutcome::Alerted(report) = &outcomes[0] else {
            panic!("expected alert, got {:?}", outcomes[0]);
        };
        assert_eq!(report.payload.objects_detected[0].class, "Knife");
        assert_eq!(report.payload.severity, Severity::High);
    }

    #[test]
    fn frames_inside_interval_pass_through() {
        let detector = ScriptedDetector::from_presence(&[true], "knife", 0.9).unwrap();
        let mut pipeline = pipeline(Box::new(detector), 2);
        let t0 = Instant::now();
        let frame = Frame::solid(4, 4, [0, 0, 0], 1).unwrap();

        assert!(matches!(
            pipeline.process_at(&frame, t0).unwrap(),
            FrameOutcome::Accumulating { hits: 1, .. }
        ));
        for ms in [33, 66, 100, 133, 166] {
            assert!(matches!(
                pipeline
                    .process_at(&frame, t0 + Duration::from_millis(ms))
                    .unwrap(),
                FrameOutcome::Passthrough
            ));
        }
        assert!(matches!(
            pipeline
                .process_at(&frame, t0 + Duration::from_millis(200))
                .unwrap(),
            FrameOutcome::Alerted(_)
        ));
        let stats = pipeline.stats();
        assert_eq!(stats.frames_seen, 7);
        assert_eq!(stats.frames_processed, 2);
    }

    #[test]
    fn uninteresting_classes_never_alert() {
        let detector = ScriptedDetector::from_presence(&[true], "person", 0.99).unwrap();
        let mut pipeline = pipeline(Box::new(detector), 1);
        let outcomes = run(&mut pipeline, 5);
        assert!(outcomes.iter().all(|o| matches!(o, FrameOutcome::Clear)));
    }

    #[test]
    fn alert_payload_keeps_only_qualifying_objects_in_order() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let frame_dets = vec![
            Detection::new("hammer", 0.7, bbox).unwrap(),
            Detection::new("person", 0.9, bbox).unwrap(),
            Detection::new("knife", 0.6, bbox).unwrap(),
        ];
        let detector = ScriptedDetector::new(vec![frame_dets]).unwrap();
        let mut pipeline = pipeline(Box::new(detector), 1);
        let outcomes = run(&mut pipeline, 1);
        let FrameOutcome::Alerted(report) = &outcomes[0] else {
            panic!("expected alert, got {:?}", outcomes[0]);
        };
        let classes: Vec<_> = report
            .payload
            .objects_detected
            .iter()
            .map(|d| d.class.as_str())
            .collect();
        assert_eq!(classes, vec!["hammer", "knife"]);
        assert_eq!(report.payload.severity, Severity::High);
    }

    #[test]
    fn alert_carries_saved_frame_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let detector = ScriptedDetector::from_presence(&[true], "hammer", 0.9).unwrap();
        let mut pipeline = AlertPipeline::new(
            settings(1, Some(dir.path().join("frames"))),
            Box::new(detector),
            AlertBuilder::default(),
            dispatcher(),
        )
        .unwrap();
        let outcomes = run(&mut pipeline, 1);
        let FrameOutcome::Alerted(report) = &outcomes[0] else {
            panic!("expected alert");
        };
        let path = report.payload.frame_path.as_deref().expect("frame path");
        assert!(std::path::Path::new(path).is_file());
        assert_eq!(report.payload.severity, Severity::Medium);
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame, _request: &DetectRequest) -> Result<Vec<Detection>> {
            Err(anyhow!("model runtime unavailable"))
        }
    }

    #[test]
    fn detector_error_is_returned_and_counted() {
        let mut pipeline = pipeline(Box::new(FailingDetector), 1);
        let frame = Frame::solid(4, 4, [0, 0, 0], 9).unwrap();
        let err = pipeline.process(&frame).unwrap_err();
        assert!(format!("{:#}", err).contains("model runtime unavailable"));
        assert_eq!(pipeline.stats().detector_errors, 1);
        assert_eq!(pipeline.tracker().consecutive_hits(), 0);
    }

    #[test]
    fn rejects_invalid_settings() {
        let detector = ScriptedDetector::from_presence(&[true], "knife", 0.9).unwrap();
        let mut bad = settings(0, None);
        assert!(AlertPipeline::new(
            bad.clone(),
            Box::new(detector),
            AlertBuilder::default(),
            dispatcher()
        )
        .is_err());
        bad.min_persistent_frames = 3;
        bad.fps_process = 0.0;
        let detector = ScriptedDetector::from_presence(&[true], "knife", 0.9).unwrap();
        assert!(AlertPipeline::new(bad, Box::new(detector), AlertBuilder::default(), dispatcher())
            .is_err());
    }
}
