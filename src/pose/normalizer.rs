//! Translation and scale invariant pose normalization.
//!
//! Poses are centred on a root joint (mid-hip, falling back to the nose) and
//! divided by the mean root-to-shoulder distance, so camera distance and
//! position do not affect comparisons.

use nalgebra::Vector3;

use crate::pose::keypoint::{Keypoint, find_keypoint};

/// Minimum confidence for a joint to take part in root selection or comparison.
pub const MIN_JOINT_SCORE: f64 = 0.3;

fn root_of(keypoints: &[Keypoint]) -> Option<Vector3<f64>> {
    let left_hip = find_keypoint(keypoints, "left_hip");
    let right_hip = find_keypoint(keypoints, "right_hip");

    if let (Some(l), Some(r)) = (left_hip, right_hip) {
        if l.score > MIN_JOINT_SCORE && r.score > MIN_JOINT_SCORE {
            return Some(Vector3::new(
                (l.x + r.x) / 2.0,
                (l.y + r.y) / 2.0,
                (l.z + r.z) / 2.0,
            ));
        }
    }

    find_keypoint(keypoints, "nose").map(|n| Vector3::new(n.x, n.y, n.z))
}

/// Normalize a keypoint set.
///
/// Returns the input unchanged when no root joint can be found.
pub fn normalize(keypoints: &[Keypoint]) -> Vec<Keypoint> {
    let Some(root) = root_of(keypoints) else {
        return keypoints.to_vec();
    };

    let mut scale = 1.0;
    if let (Some(ls), Some(rs)) = (
        find_keypoint(keypoints, "left_shoulder"),
        find_keypoint(keypoints, "right_shoulder"),
    ) {
        let dist_l = (ls.x - root.x).hypot(ls.y - root.y);
        let dist_r = (rs.x - root.x).hypot(rs.y - root.y);
        scale = (dist_l + dist_r) / 2.0;
    }
    if scale == 0.0 {
        scale = 1.0;
    }

    keypoints
        .iter()
        .map(|kp| Keypoint {
            name: kp.name.clone(),
            x: (kp.x - root.x) / scale,
            y: (kp.y - root.y) / scale,
            z: (kp.z - root.z) / scale,
            score: kp.score,
            is_predicted: kp.is_predicted,
        })
        .collect()
}

/// Mean planar distance between joints confidently present in both
/// already-normalized poses. `None` when no joint overlaps.
pub(crate) fn mean_joint_distance(a: &[Keypoint], b: &[Keypoint]) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;

    for kp_a in a {
        if let Some(kp_b) = find_keypoint(b, &kp_a.name) {
            if kp_a.score > MIN_JOINT_SCORE && kp_b.score > MIN_JOINT_SCORE {
                total += kp_a.distance_to(kp_b);
                count += 1;
            }
        }
    }

    (count > 0).then(|| total / count as f64)
}

/// Mean normalized joint distance between two raw poses.
pub fn pose_distance(a: &[Keypoint], b: &[Keypoint]) -> Option<f64> {
    mean_joint_distance(&normalize(a), &normalize(b))
}

/// Similarity in [0, 1]; 1 means identical after normalization.
pub fn similarity(a: &[Keypoint], b: &[Keypoint]) -> f64 {
    match pose_distance(a, b) {
        Some(avg) => (1.0 - avg * 2.0).max(0.0),
        None => 0.0,
    }
}
