use anyhow::Result;
use std::collections::BTreeSet;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Parameters forwarded to the detector on every processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectRequest {
    /// Minimum confidence for a detection to be reported.
    pub confidence_threshold: f32,
    /// IoU threshold for the detector's non-max suppression.
    pub iou_threshold: f32,
    /// Labels that can raise an alert, normalized. Everything else is discarded.
    pub classes_of_interest: BTreeSet<String>,
}

impl DetectRequest {
    pub fn new<I, S>(confidence_threshold: f32, iou_threshold: f32, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            confidence_threshold,
            iou_threshold,
            classes_of_interest: classes
                .into_iter()
                .map(|class| normalize_class(&class.into()))
                .collect(),
        }
    }

    /// Class names match case-insensitively, ignoring surrounding whitespace.
    pub fn is_of_interest(&self, class: &str) -> bool {
        self.classes_of_interest.contains(&normalize_class(class))
    }

    /// Keep only detections of interest at or above the confidence threshold.
    ///
    /// Order is preserved.
    pub fn retain_qualifying(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|det| {
                self.is_of_interest(&det.class) && det.confidence >= self.confidence_threshold
            })
            .collect()
    }
}

/// Canonical form of a detector label: trimmed and lower-cased.
pub fn normalize_class(class: &str) -> String {
    class.trim().to_lowercase()
}

/// Object detector capability.
///
/// The model runtime lives behind this trait; the alert pipeline only sees
/// labelled boxes. Implementations are driven from the single frame loop and
/// may keep internal state between calls.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations should honour `request`, but callers re-filter the
    /// result against `classes_of_interest` and the confidence threshold.
    fn detect(&mut self, frame: &Frame, request: &DetectRequest) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class: &str, confidence: f32) -> Detection {
        Detection::new(class, confidence, BoundingBox::new(0.0, 0.0, 5.0, 5.0).unwrap()).unwrap()
    }

    #[test]
    fn retain_qualifying_filters_class_and_confidence_in_order() {
        let request = DetectRequest::new(0.5, 0.45, ["knife", "hammer"]);
        let kept = request.retain_qualifying(vec![
            det("hammer", 0.9),
            det("person", 0.99),
            det("knife", 0.3),
            det("knife", 0.5),
        ]);
        let classes: Vec<_> = kept.iter().map(|d| d.class.as_str()).collect();
        assert_eq!(classes, vec!["hammer", "knife"]);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn class_matching_ignores_case_and_padding() {
        let request = DetectRequest::new(0.5, 0.45, [" Knife "]);
        assert!(request.is_of_interest("knife"));
        assert!(request.is_of_interest("KNIFE"));
        let kept = request.retain_qualifying(vec![det("Knife", 0.9), det("knives", 0.9)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class, "Knife");
    }
}
