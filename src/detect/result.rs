use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]`. Deserialization rejects boxes whose
/// corners are out of order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(anyhow!("bbox coordinates must be finite"));
        }
        if x1 > x2 || y1 > y2 {
            return Err(anyhow!(
                "bbox corners out of order: ({}, {}) -> ({}, {})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

}

impl TryFrom<[f32; 4]> for BoundingBox {
    type Error = anyhow::Error;

    fn try_from(raw: [f32; 4]) -> Result<Self> {
        Self::new(raw[0], raw[1], raw[2], raw[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}, {:.1}, {:.1}]",
            self.x1, self.y1, self.x2, self.y2
        )
    }
}

/// One object found in one frame.
///
/// Deserialization runs the same checks as `Detection::new`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDetection")]
pub struct Detection {
    /// Detector label (e.g. "knife").
    pub class: String,
    /// Detector confidence (0.0-1.0).
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Result<Self> {
        let class = class.into();
        if class.trim().is_empty() {
            return Err(anyhow!("detection class must not be empty"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "detection confidence {} outside [0, 1]",
                confidence
            ));
        }
        Ok(Self {
            class,
            confidence,
            bbox,
        })
    }
}

#[derive(Deserialize)]
struct RawDetection {
    class: String,
    confidence: f32,
    bbox: BoundingBox,
}

impl TryFrom<RawDetection> for Detection {
    type Error = anyhow::Error;

    fn try_from(raw: RawDetection) -> Result<Self> {
        Self::new(raw.class, raw.confidence, raw.bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_rejects_inverted_corners() {
        assert!(BoundingBox::new(10.0, 10.0, 5.0, 20.0).is_err());
        assert!(BoundingBox::new(10.0, 10.0, 20.0, 5.0).is_err());
        assert!(BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::new(3.0, 3.0, 3.0, 3.0).is_ok());
    }

    #[test]
    fn detection_rejects_confidence_out_of_bounds() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(Detection::new("knife", 1.5, bbox).is_err());
        assert!(Detection::new("knife", -0.1, bbox).is_err());
        assert!(Detection::new("knife", f32::NAN, bbox).is_err());
        assert!(Detection::new("  ", 0.5, bbox).is_err());
        assert!(Detection::new("knife", 1.0, bbox).is_ok());
    }

    #[test]
    fn bbox_serializes_as_corner_array() {
        let det = Detection::new("hammer", 0.75, BoundingBox::new(1.0, 2.0, 3.5, 4.5).unwrap())
            .unwrap();
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["class"], "hammer");
        assert_eq!(json["bbox"], serde_json::json!([1.0, 2.0, 3.5, 4.5]));
    }

    #[test]
    fn bbox_deserialize_enforces_ordering() {
        let bad = r#"{"class":"knife","confidence":0.9,"bbox":[50.0,0.0,10.0,10.0]}"#;
        assert!(serde_json::from_str::<Detection>(bad).is_err());
    }

    #[test]
    fn deserialize_rejects_invalid_detections() {
        let blank = r#"{"class":"","confidence":0.9,"bbox":[0.0,0.0,1.0,1.0]}"#;
        assert!(serde_json::from_str::<Detection>(blank).is_err());
        let too_confident = r#"{"class":"knife","confidence":7.5,"bbox":[0.0,0.0,1.0,1.0]}"#;
        assert!(serde_json::from_str::<Detection>(too_confident).is_err());
        let ok = r#"{"class":"knife","confidence":0.9,"bbox":[0.0,0.0,1.0,1.0]}"#;
        assert_eq!(serde_json::from_str::<Detection>(ok).unwrap().class, "knife");
    }
}
