//! Builder for creating Frame objects from detector outputs.

use crate::frame::{ClassPrediction, Frame, Hand, Landmark, ObjectDetection};
use crate::pose::{Keypoint, Pose};

/// Builder for creating [`Frame`] objects from various detector outputs.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    /// Create an empty frame builder at timestamp zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.frame.timestamp = timestamp;
        self
    }

    /// Add a pose, optionally labelled with a host-side track id.
    pub fn pose(mut self, id: Option<u64>, keypoints: Vec<Keypoint>) -> Self {
        self.frame.poses.push(Pose::new(id, keypoints));
        self
    }

    /// Add a pose from `(name, x, y, score)` tuples.
    pub fn pose_from_tuples<'a>(
        self,
        id: Option<u64>,
        keypoints: impl IntoIterator<Item = (&'a str, f64, f64, f64)>,
    ) -> Self {
        let keypoints = keypoints
            .into_iter()
            .map(|(name, x, y, score)| Keypoint::new(name, x, y, score))
            .collect();
        self.pose(id, keypoints)
    }

    pub fn hand(mut self, landmarks: Hand) -> Self {
        self.frame.hands.push(landmarks);
        self
    }

    /// Add a hand from `(x, y)` landmark positions.
    pub fn hand_from_points(self, points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        self.hand(points.into_iter().map(|(x, y)| Landmark::new(x, y)).collect())
    }

    /// Add an object with its bounding box in `[x, y, w, h]` form.
    pub fn object(mut self, class: impl Into<String>, bbox: [f64; 4], confidence: f64) -> Self {
        let mut object = ObjectDetection::new(class, bbox);
        object.confidence = confidence;
        self.frame.objects.push(object);
        self
    }

    /// Set the top prediction of the image classifier `model_id`.
    pub fn classifier(
        mut self,
        model_id: impl Into<String>,
        class_name: impl Into<String>,
        probability: f64,
    ) -> Self {
        self.frame.classifiers.insert(
            model_id.into(),
            ClassPrediction {
                class_name: class_name.into(),
                probability,
            },
        );
        self
    }

    /// Append one detection of the secondary detector `model_id`.
    pub fn detection(
        mut self,
        model_id: impl Into<String>,
        class: impl Into<String>,
        bbox: [f64; 4],
        confidence: f64,
    ) -> Self {
        let mut detection = ObjectDetection::new(class, bbox);
        detection.confidence = confidence;
        self.frame
            .detections
            .entry(model_id.into())
            .or_default()
            .push(detection);
        self
    }

    /// Build the final [`Frame`].
    pub fn build(self) -> Frame {
        self.frame
    }
}
