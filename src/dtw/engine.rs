use serde::{Deserialize, Serialize};

use crate::dtw::banded::banded_dtw;
use crate::pose::{Keypoint, mean_joint_distance, normalize};

/// Configuration for the [`DtwEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DtwConfig {
    /// Sakoe-Chiba half-width as a fraction of the longer sequence
    pub window_fraction: f64,
    /// `normalized_distance` below which two sequences match
    pub threshold: f64,
}

impl Default for DtwConfig {
    fn default() -> Self {
        Self {
            window_fraction: 0.2,
            threshold: 0.4,
        }
    }
}

/// Outcome of a DTW comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DtwResult {
    /// Cumulative alignment cost; infinite for empty input
    pub distance: f64,
    /// `distance / (n + m)`; 1.0 for empty input
    pub normalized_distance: f64,
    pub is_match: bool,
}

/// Banded DTW over normalized pose sequences.
///
/// The per-frame cost is the mean Euclidean distance over joints present with
/// confidence above 0.3 in both normalized poses, or 1.0 if none overlap.
#[derive(Debug, Clone, Default)]
pub struct DtwEngine {
    config: DtwConfig,
}

impl DtwEngine {
    pub fn new(config: DtwConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DtwConfig {
        &self.config
    }

    /// Compare two pose sequences.
    pub fn compute<A, B>(&self, sequence_a: &[A], sequence_b: &[B]) -> DtwResult
    where
        A: AsRef<[Keypoint]>,
        B: AsRef<[Keypoint]>,
    {
        if sequence_a.is_empty() || sequence_b.is_empty() {
            return DtwResult {
                distance: f64::INFINITY,
                normalized_distance: 1.0,
                is_match: false,
            };
        }

        let norm_a: Vec<Vec<Keypoint>> = sequence_a.iter().map(|p| normalize(p.as_ref())).collect();
        let norm_b: Vec<Vec<Keypoint>> = sequence_b.iter().map(|p| normalize(p.as_ref())).collect();

        let (n, m) = (norm_a.len(), norm_b.len());
        let distance = banded_dtw(n, m, self.config.window_fraction, |i, j| {
            mean_joint_distance(&norm_a[i], &norm_b[j]).unwrap_or(1.0)
        });
        let normalized_distance = distance / (n + m) as f64;

        DtwResult {
            distance,
            normalized_distance,
            is_match: normalized_distance < self.config.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(y_offset: f64) -> Vec<Keypoint> {
        vec![
            Keypoint::new("nose", 0.5, 0.2 + y_offset, 0.9),
            Keypoint::new("left_shoulder", 0.4, 0.3 + y_offset, 0.9),
            Keypoint::new("right_shoulder", 0.6, 0.3 + y_offset, 0.9),
        ]
    }

    /// Arm raised by `lift` relative to the shoulders.
    fn reach(lift: f64) -> Vec<Keypoint> {
        vec![
            Keypoint::new("nose", 0.5, 0.2, 0.9),
            Keypoint::new("left_shoulder", 0.4, 0.3, 0.9),
            Keypoint::new("right_shoulder", 0.6, 0.3, 0.9),
            Keypoint::new("right_wrist", 0.7, 0.6 - lift, 0.9),
            Keypoint::new("left_hip", 0.45, 0.7, 0.9),
            Keypoint::new("right_hip", 0.55, 0.7, 0.9),
        ]
    }

    #[test]
    fn test_identical_sequences() {
        let engine = DtwEngine::default();
        let seq = vec![reach(0.0), reach(0.1), reach(0.2), reach(0.3)];
        let result = engine.compute(&seq, &seq);
        assert_eq!(result.distance, 0.0);
        assert_eq!(result.normalized_distance, 0.0);
        assert!(result.is_match);
    }

    #[test]
    fn test_time_stretched_beats_different_shape() {
        let engine = DtwEngine::default();
        let seq_a = vec![reach(0.0), reach(0.1), reach(0.2)];
        let stretched = vec![
            reach(0.0),
            reach(0.0),
            reach(0.1),
            reach(0.1),
            reach(0.2),
            reach(0.2),
        ];
        let different = vec![reach(0.4), reach(0.35), reach(0.3), reach(0.25)];

        let r_stretched = engine.compute(&seq_a, &stretched);
        let r_different = engine.compute(&seq_a, &different);
        assert!(r_stretched.normalized_distance < r_different.normalized_distance);
        assert!(r_stretched.is_match);
    }

    #[test]
    fn test_translation_does_not_matter() {
        let engine = DtwEngine::default();
        let a = vec![pose(0.1), pose(0.2), pose(0.3)];
        let b = vec![pose(0.0), pose(0.0)];
        assert!(engine.compute(&a, &b).normalized_distance < 1e-9);
    }

    #[test]
    fn test_empty_sequence() {
        let engine = DtwEngine::default();
        let empty: Vec<Vec<Keypoint>> = Vec::new();
        let result = engine.compute(&empty, &[pose(0.0)]);
        assert!(result.distance.is_infinite());
        assert_eq!(result.normalized_distance, 1.0);
        assert!(!result.is_match);
    }

    #[test]
    fn test_no_overlapping_joints_cost_one() {
        let engine = DtwEngine::default();
        let a = vec![vec![Keypoint::new("nose", 0.0, 0.0, 0.9)]];
        let b = vec![vec![Keypoint::new("left_knee", 0.0, 0.0, 0.9)]];
        let result = engine.compute(&a, &b);
        assert_eq!(result.distance, 1.0);
        assert_eq!(result.normalized_distance, 0.5);
    }
}
