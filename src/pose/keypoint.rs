//! Keypoint and pose records supplied by an external pose detector.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Joint names accepted by rule expressions.
///
/// Covers the 17 COCO body joints plus the additional BlazePose face, hand
/// and foot points.
pub const KNOWN_JOINTS: &[&str] = &[
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_eye_inner",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye_outer",
    "mouth_left",
    "mouth_right",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Returns true if `name` is part of the joint vocabulary.
pub fn is_known_joint(name: &str) -> bool {
    KNOWN_JOINTS.contains(&name)
}

/// A single named landmark with a detection confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// Detection confidence in [0, 1]
    #[serde(default)]
    pub score: f64,
    /// Set when the position was extrapolated through an occlusion
    #[serde(default)]
    pub is_predicted: bool,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64, score: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z: 0.0,
            score,
            is_predicted: false,
        }
    }

    /// 2D position as a vector.
    #[inline]
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Planar Euclidean distance to another keypoint.
    #[inline]
    pub fn distance_to(&self, other: &Keypoint) -> f64 {
        (self.position() - other.position()).norm()
    }
}

/// Look up a keypoint by joint name.
pub fn find_keypoint<'a>(keypoints: &'a [Keypoint], name: &str) -> Option<&'a Keypoint> {
    keypoints.iter().find(|k| k.name == name)
}

/// One detected person in a frame.
///
/// Deserializes from `{ "id": .., "keypoints": [..] }` or from a bare keypoint
/// array, the form stored in recorded reference sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseRepr")]
pub struct Pose {
    /// Tracker-assigned identity, if the detector provides one
    pub id: Option<u64>,
    pub keypoints: Vec<Keypoint>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PoseRepr {
    Full {
        #[serde(default, alias = "trackId")]
        id: Option<u64>,
        keypoints: Vec<Keypoint>,
    },
    Bare(Vec<Keypoint>),
}

impl From<PoseRepr> for Pose {
    fn from(repr: PoseRepr) -> Self {
        match repr {
            PoseRepr::Full { id, keypoints } => Self { id, keypoints },
            PoseRepr::Bare(keypoints) => Self { id: None, keypoints },
        }
    }
}

impl Pose {
    pub fn new(id: Option<u64>, keypoints: Vec<Keypoint>) -> Self {
        Self { id, keypoints }
    }

    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        find_keypoint(&self.keypoints, name)
    }
}

impl AsRef<[Keypoint]> for Pose {
    fn as_ref(&self) -> &[Keypoint] {
        &self.keypoints
    }
}
