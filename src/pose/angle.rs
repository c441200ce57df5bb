//! Joint angle geometry for ergonomic analysis.

use nalgebra::Vector2;
use serde::Serialize;

use crate::pose::keypoint::{Keypoint, find_keypoint};

/// Angle in degrees at `vertex` between the rays towards `a` and `c`.
///
/// Returns 0 when either ray has zero length.
pub fn joint_angle(a: &Keypoint, vertex: &Keypoint, c: &Keypoint) -> f64 {
    angle_between(a.position() - vertex.position(), c.position() - vertex.position())
}

fn angle_between(v1: Vector2<f64>, v2: Vector2<f64>) -> f64 {
    let denom = v1.norm() * v2.norm();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let cos = (v1.dot(&v2) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Body side for lateral joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    Left,
    #[default]
    Right,
}

impl Side {
    fn joint(self, part: &str) -> String {
        match self {
            Side::Left => format!("left_{part}"),
            Side::Right => format!("right_{part}"),
        }
    }
}

fn midpoint(a: &Keypoint, b: &Keypoint) -> Vector2<f64> {
    (a.position() + b.position()) / 2.0
}

/// Derived flexion angles for both sides of the body, in degrees.
///
/// Every accessor returns 0 when a required joint is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErgonomicAngles {
    pub trunk_flexion: f64,
    pub neck_flexion: f64,
    pub upper_arm_flexion_left: f64,
    pub upper_arm_flexion_right: f64,
    pub lower_arm_flexion_left: f64,
    pub lower_arm_flexion_right: f64,
    pub wrist_flexion_left: f64,
    pub wrist_flexion_right: f64,
    pub leg_flexion_left: f64,
    pub leg_flexion_right: f64,
}

impl ErgonomicAngles {
    pub fn from_keypoints(keypoints: &[Keypoint]) -> Self {
        Self {
            trunk_flexion: Self::trunk(keypoints),
            neck_flexion: Self::neck(keypoints),
            upper_arm_flexion_left: Self::upper_arm(keypoints, Side::Left),
            upper_arm_flexion_right: Self::upper_arm(keypoints, Side::Right),
            lower_arm_flexion_left: Self::lower_arm(keypoints, Side::Left),
            lower_arm_flexion_right: Self::lower_arm(keypoints, Side::Right),
            wrist_flexion_left: Self::wrist(keypoints, Side::Left),
            wrist_flexion_right: Self::wrist(keypoints, Side::Right),
            leg_flexion_left: Self::leg(keypoints, Side::Left),
            leg_flexion_right: Self::leg(keypoints, Side::Right),
        }
    }

    /// Shoulder flexion: 0 with the arm hanging along the torso, 90 when raised forward.
    pub fn upper_arm(keypoints: &[Keypoint], side: Side) -> f64 {
        let (Some(shoulder), Some(elbow), Some(hip)) = (
            find_keypoint(keypoints, &side.joint("shoulder")),
            find_keypoint(keypoints, &side.joint("elbow")),
            find_keypoint(keypoints, &side.joint("hip")),
        ) else {
            return 0.0;
        };
        joint_angle(hip, shoulder, elbow)
    }

    /// Included elbow angle.
    pub fn lower_arm(keypoints: &[Keypoint], side: Side) -> f64 {
        let (Some(shoulder), Some(elbow), Some(wrist)) = (
            find_keypoint(keypoints, &side.joint("shoulder")),
            find_keypoint(keypoints, &side.joint("elbow")),
            find_keypoint(keypoints, &side.joint("wrist")),
        ) else {
            return 0.0;
        };
        joint_angle(shoulder, elbow, wrist)
    }

    /// Deviation of the forearm from horizontal.
    pub fn wrist(keypoints: &[Keypoint], side: Side) -> f64 {
        let (Some(elbow), Some(wrist)) = (
            find_keypoint(keypoints, &side.joint("elbow")),
            find_keypoint(keypoints, &side.joint("wrist")),
        ) else {
            return 0.0;
        };
        let dy = (wrist.y - elbow.y).abs();
        let dx = (wrist.x - elbow.x).abs();
        dy.atan2(dx).to_degrees()
    }

    /// Lean of the head from vertical over the shoulder midpoint.
    pub fn neck(keypoints: &[Keypoint]) -> f64 {
        let (Some(nose), Some(ls), Some(rs)) = (
            find_keypoint(keypoints, "nose"),
            find_keypoint(keypoints, "left_shoulder"),
            find_keypoint(keypoints, "right_shoulder"),
        ) else {
            return 0.0;
        };
        let mid = midpoint(ls, rs);
        let dy = (nose.y - mid.y).abs();
        let dx = (nose.x - mid.x).abs();
        dx.atan2(dy).to_degrees()
    }

    /// Lean of the shoulder midpoint from vertical over the hip midpoint.
    pub fn trunk(keypoints: &[Keypoint]) -> f64 {
        let (Some(ls), Some(rs), Some(lh), Some(rh)) = (
            find_keypoint(keypoints, "left_shoulder"),
            find_keypoint(keypoints, "right_shoulder"),
            find_keypoint(keypoints, "left_hip"),
            find_keypoint(keypoints, "right_hip"),
        ) else {
            return 0.0;
        };
        let d = midpoint(ls, rs) - midpoint(lh, rh);
        d.x.abs().atan2(d.y.abs()).to_degrees()
    }

    /// Included knee angle.
    pub fn leg(keypoints: &[Keypoint], side: Side) -> f64 {
        let (Some(hip), Some(knee), Some(ankle)) = (
            find_keypoint(keypoints, &side.joint("hip")),
            find_keypoint(keypoints, &side.joint("knee")),
            find_keypoint(keypoints, &side.joint("ankle")),
        ) else {
            return 0.0;
        };
        joint_angle(hip, knee, ankle)
    }
}
