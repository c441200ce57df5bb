//! Per-frame detection payloads produced by external detectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pose::{Pose, Rect};

/// One hand landmark (MediaPipe hand topology, 21 per hand).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Landmarks of a single detected hand.
pub type Hand = Vec<Landmark>;

/// A detected object with its bounding box in `[x, y, w, h]` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub class: String,
    pub bbox: [f64; 4],
    #[serde(default = "full_confidence", alias = "score")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

impl ObjectDetection {
    pub fn new(class: impl Into<String>, bbox: [f64; 4]) -> Self {
        Self {
            class: class.into(),
            bbox,
            confidence: 1.0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_bbox(self.bbox)
    }

    pub fn center(&self) -> (f64, f64) {
        self.rect().center()
    }
}

/// Top prediction of an image classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPrediction {
    pub class_name: String,
    pub probability: f64,
}

/// Everything observed at one timestamp.
///
/// The timestamp unit is up to the caller but must match the unit of every
/// duration in the loaded model and engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Frame {
    pub poses: Vec<Pose>,
    pub hands: Vec<Hand>,
    pub objects: Vec<ObjectDetection>,
    /// Image classifier results keyed by classifier id
    #[serde(alias = "teachableMachine")]
    pub classifiers: BTreeMap<String, ClassPrediction>,
    /// Secondary detector outputs keyed by model id
    #[serde(alias = "roboflow")]
    pub detections: BTreeMap<String, Vec<ObjectDetection>>,
    pub timestamp: f64,
}

impl Frame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_frame() {
        let json = r#"{
            "poses": [{ "id": 3, "keypoints": [{ "name": "nose", "x": 0.5, "y": 0.2, "score": 0.9 }] }],
            "hands": [[{ "x": 0.1, "y": 0.2 }]],
            "objects": [{ "class": "box", "bbox": [0.1, 0.1, 0.2, 0.2] }],
            "teachableMachine": { "tm1": { "className": "Grip", "probability": 0.93 } },
            "timestamp": 1.5
        }"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.poses[0].id, Some(3));
        assert_eq!(frame.hands[0].len(), 1);
        assert_eq!(frame.objects[0].confidence, 1.0);
        assert!((frame.objects[0].center().0 - 0.2).abs() < 1e-12);
        assert_eq!(frame.classifiers["tm1"].class_name, "Grip");
        assert_eq!(frame.timestamp, 1.5);
    }
}
