//! Alert payloads and severity classification.
//!
//! An `AlertPayload` is built once per trigger from the detections of the
//! frame that completed the persistence run. It is immutable afterwards and is
//! shared read-only between notification channels.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::detect::{normalize_class, Detection};

/// Alert tier, ordered `Low < Medium < High`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(anyhow!(
                "unknown severity '{}'; expected low, medium or high",
                other
            )),
        }
    }
}

/// Lowest severity a fired alert is reported with.
pub const ALERT_SEVERITY_FLOOR: Severity = Severity::Medium;

/// Closed class -> severity mapping.
///
/// Class names are matched case-insensitively. Classes missing from the table
/// get `default_tier`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeverityTable {
    classes: BTreeMap<String, Severity>,
    default_tier: Severity,
}

impl SeverityTable {
    pub fn new<I, S>(classes: I, default_tier: Severity) -> Self
    where
        I: IntoIterator<Item = (S, Severity)>,
        S: AsRef<str>,
    {
        Self {
            classes: classes
                .into_iter()
                .map(|(class, tier)| (normalize_class(class.as_ref()), tier))
                .collect(),
            default_tier,
        }
    }

    pub fn tier(&self, class: &str) -> Severity {
        self.classes
            .get(&normalize_class(class))
            .copied()
            .unwrap_or(self.default_tier)
    }

    pub fn default_tier(&self) -> Severity {
        self.default_tier
    }

    /// Maximum tier over `detections`, never below `ALERT_SEVERITY_FLOOR`.
    pub fn aggregate(&self, detections: &[Detection]) -> Severity {
        detections
            .iter()
            .map(|det| self.tier(&det.class))
            .max()
            .unwrap_or(Severity::Low)
            .max(ALERT_SEVERITY_FLOOR)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Severity)> {
        self.classes.iter().map(|(class, tier)| (class.as_str(), *tier))
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self::new(
            [
                ("knife", Severity::High),
                ("scissor", Severity::Medium),
                ("scissors", Severity::Medium),
                ("hammer", Severity::Medium),
                ("screwdriver", Severity::Medium),
                ("wrench", Severity::Medium),
            ],
            Severity::Medium,
        )
    }
}

/// Alert record delivered to every notification channel.
///
/// The serde representation is the webhook wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// ISO-8601 UTC, microsecond precision, `Z` suffix.
    pub timestamp: String,
    pub camera_id: String,
    pub objects_detected: Vec<Detection>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<String>,
}

impl AlertPayload {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize alert payload")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parse alert payload")
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone, Debug, Default)]
pub struct AlertBuilder {
    severity: SeverityTable,
}

impl AlertBuilder {
    pub fn new(severity: SeverityTable) -> Self {
        Self { severity }
    }

    pub fn severity_table(&self) -> &SeverityTable {
        &self.severity
    }

    /// Build the payload for a triggered alert, stamped with the current time.
    ///
    /// `detections` must be non-empty. `frame_path` is attached only when the
    /// file exists.
    pub fn build(
        &self,
        camera_id: &str,
        detections: &[Detection],
        frame_path: Option<&Path>,
    ) -> AlertPayload {
        self.build_at(Utc::now(), camera_id, detections, frame_path)
    }

    pub fn build_at(
        &self,
        at: DateTime<Utc>,
        camera_id: &str,
        detections: &[Detection],
        frame_path: Option<&Path>,
    ) -> AlertPayload {
        debug_assert!(
            !detections.is_empty(),
            "alert built from an empty detection set"
        );
        let frame_path = frame_path.and_then(|path| {
            if path.is_file() {
                Some(path.to_string_lossy().into_owned())
            } else {
                log::warn!(
                    "frame {} does not exist; alert sent without frame",
                    path.display()
                );
                None
            }
        });
        AlertPayload {
            timestamp: format_timestamp(at),
            camera_id: camera_id.to_string(),
            objects_detected: detections.to_vec(),
            severity: self.severity.aggregate(detections),
            frame_path,
        }
    }
}
