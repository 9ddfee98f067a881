//! Vision alert pipeline.
//!
//! Turns per-frame object detections into rate-limited, persistence-filtered
//! alerts and delivers them over independent notification channels.
//!
//! # Behaviour
//!
//! 1. **Pacing**: only frames spaced at least `1 / fps_process` apart are
//!    analysed; the rest pass through untouched.
//! 2. **Persistence**: an alert fires only after `min_persistent_frames`
//!    consecutive processed frames contain an object of interest. The run
//!    counter resets on a miss and after every alert.
//! 3. **Severity**: the highest tier among the detected classes, never below
//!    `medium`.
//! 4. **Isolation**: a failing or slow channel never blocks the frame loop or
//!    the other channels.
//!
//! # Module Structure
//!
//! - `frame`, `ingest`: frames and frame sources
//! - `detect`: detector seam and detection types
//! - `pacer`, `tracker`: frame rate limiting and persistence filtering
//! - `alert`, `snapshot`: payload construction and frame snapshots
//! - `notify`: webhook and email channels, background queue, dispatcher
//! - `pipeline`: the per-frame loop body tying the above together
//! - `config`: daemon configuration (TOML file + environment)
//! - `receiver`: reference webhook receiver

pub mod alert;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod pacer;
pub mod pipeline;
pub mod receiver;
pub mod snapshot;
pub mod tracker;

pub use alert::{AlertBuilder, AlertPayload, Severity, SeverityTable, ALERT_SEVERITY_FLOOR};
pub use config::AlertdConfig;
pub use detect::{BoundingBox, DetectRequest, Detection, Detector, ScriptedDetector};
pub use frame::Frame;
pub use ingest::{FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
pub use notify::{
    DispatchReport, DispatchSettings, NotificationDispatcher, WebhookChannel, WebhookOutcome,
};
pub use pacer::FramePacer;
pub use pipeline::{AlertPipeline, FrameOutcome, PipelineSettings, PipelineStats};
pub use receiver::{ReceiverConfig, ReceiverHandle, ReceiverServer};
pub use tracker::PersistenceTracker;
