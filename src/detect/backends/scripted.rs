use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectRequest, Detector};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Replays a fixed per-frame script of detections.
///
/// Stands in for a model runtime in `alertd` demo runs and in tests. The
/// script wraps around once exhausted.
pub struct ScriptedDetector {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Result<Self> {
        if script.is_empty() {
            return Err(anyhow!("detector script must contain at least one frame"));
        }
        Ok(Self { script, cursor: 0 })
    }

    /// One frame per entry: `true` yields a single `class` detection, `false` none.
    pub fn from_presence(pattern: &[bool], class: &str, confidence: f32) -> Result<Self> {
        let bbox = BoundingBox::new(120.0, 80.0, 220.0, 260.0)?;
        let hit = Detection::new(class, confidence, bbox)?;
        let script = pattern
            .iter()
            .map(|present| if *present { vec![hit.clone()] } else { Vec::new() })
            .collect();
        Self::new(script)
    }

    /// Frames handed out so far, modulo the script length.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame, request: &DetectRequest) -> Result<Vec<Detection>> {
        let step = &self.script[self.cursor];
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(step
            .iter()
            .filter(|det| det.confidence >= request.confidence_threshold)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_and_wraps() {
        let mut detector = ScriptedDetector::from_presence(&[true, false], "knife", 0.8).unwrap();
        let frame = Frame::solid(2, 2, [0, 0, 0], 1).unwrap();
        let request = DetectRequest::new(0.5, 0.45, ["knife"]);

        assert_eq!(detector.detect(&frame, &request).unwrap().len(), 1);
        assert!(detector.detect(&frame, &request).unwrap().is_empty());
        assert_eq!(detector.position(), 0);
        assert_eq!(detector.detect(&frame, &request).unwrap()[0].class, "knife");
    }

    #[test]
    fn honours_confidence_threshold() {
        let mut detector = ScriptedDetector::from_presence(&[true], "knife", 0.4).unwrap();
        let frame = Frame::solid(2, 2, [0, 0, 0], 1).unwrap();
        let request = DetectRequest::new(0.5, 0.45, ["knife"]);
        assert!(detector.detect(&frame, &request).unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_script() {
        assert!(ScriptedDetector::new(Vec::new()).is_err());
    }
}
