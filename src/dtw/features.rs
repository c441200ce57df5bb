use serde::Serialize;

use crate::dtw::banded::banded_dtw;
use crate::pose::{Keypoint, MIN_JOINT_SCORE, find_keypoint};

/// Joints contributing to a motion feature vector, shoulders down to ankles.
pub const MOTION_JOINTS: [&str; 12] = [
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
];

/// Raw (x, y) of each motion joint; (0, 0) where the joint is absent or unconfident.
pub fn motion_features(keypoints: &[Keypoint]) -> [f64; 24] {
    let mut features = [0.0; 24];
    for (i, name) in MOTION_JOINTS.iter().enumerate() {
        if let Some(kp) = find_keypoint(keypoints, name) {
            if kp.score > MIN_JOINT_SCORE {
                features[2 * i] = kp.x;
                features[2 * i + 1] = kp.y;
            }
        }
    }
    features
}

fn feature_distance(a: &[f64; 24], b: &[f64; 24]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Similarity of a live window against a golden sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionComparison {
    /// Similarity in [0, 100], rounded to a whole percentage
    pub score: f64,
    /// Cumulative DTW cost over feature vectors
    pub distance: f64,
}

/// Compares raw joint trajectories against golden sequences.
///
/// The score falls linearly from 100 at zero mean per-frame distance to 0 at
/// `score_threshold`, in the detector's coordinate units, and is rounded to
/// the nearest integer.
///
/// Alignment runs inside a Sakoe-Chiba band of `window_fraction`. Both
/// sequences are trimmed to the same length first, so the band always admits
/// the diagonal and a finite cost exists.
#[derive(Debug, Clone)]
pub struct MotionComparator {
    window_fraction: f64,
    score_threshold: f64,
}

impl Default for MotionComparator {
    fn default() -> Self {
        Self::new(0.2, 50.0)
    }
}

impl MotionComparator {
    pub fn new(window_fraction: f64, score_threshold: f64) -> Self {
        Self {
            window_fraction,
            score_threshold,
        }
    }

    /// Compare the most recent frames of `live` with the leading frames of `golden`,
    /// both trimmed to the shorter length.
    pub fn compare<A, B>(&self, live: &[A], golden: &[B]) -> MotionComparison
    where
        A: AsRef<[Keypoint]>,
        B: AsRef<[Keypoint]>,
    {
        let window = live.len().min(golden.len());
        if window == 0 {
            return MotionComparison {
                score: 0.0,
                distance: f64::INFINITY,
            };
        }

        let live_features: Vec<[f64; 24]> = live[live.len() - window..]
            .iter()
            .map(|p| motion_features(p.as_ref()))
            .collect();
        let golden_features: Vec<[f64; 24]> = golden[..window]
            .iter()
            .map(|p| motion_features(p.as_ref()))
            .collect();

        let distance = banded_dtw(window, window, self.window_fraction, |i, j| {
            feature_distance(&live_features[i], &golden_features[j])
        });
        let normalized = distance / window as f64;
        let score = (100.0 - (normalized / self.score_threshold) * 100.0)
            .clamp(0.0, 100.0)
            .round();

        MotionComparison { score, distance }
    }
}
