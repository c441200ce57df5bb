//! Temporal keypoint smoothing with short-term occlusion prediction.

use std::collections::HashMap;

use nalgebra::Vector2;

use crate::pose::keypoint::{Keypoint, find_keypoint};

/// Score below which a joint is considered occluded.
const OCCLUSION_SCORE: f64 = 0.25;
/// Frames a joint may be extrapolated before the raw detection is passed through.
const MAX_PERSISTENCE: u32 = 20;
const SCORE_DECAY: f64 = 0.92;
const FRICTION: f64 = 0.8;
/// Both ends of a bone must exceed this score to update its learned length.
const BONE_SCORE: f64 = 0.6;
const BONE_SLACK: f64 = 1.2;

/// Child joint -> parent joint for limb leashing.
const TOPOLOGY: &[(&str, &str)] = &[
    ("left_elbow", "left_shoulder"),
    ("left_wrist", "left_elbow"),
    ("right_elbow", "right_shoulder"),
    ("right_wrist", "right_elbow"),
    ("left_knee", "left_hip"),
    ("left_ankle", "left_knee"),
    ("right_knee", "right_hip"),
    ("right_ankle", "right_knee"),
];

fn parent_of(joint: &str) -> Option<&'static str> {
    TOPOLOGY
        .iter()
        .find(|(child, _)| *child == joint)
        .map(|(_, parent)| *parent)
}

/// Exponential moving average smoother.
///
/// Visible joints are blended with their previous position. Joints whose
/// score drops below 0.25 are extrapolated from a damped velocity for up to
/// 20 frames, flagged `is_predicted`, and kept within 1.2x of the learned
/// bone length from their parent joint.
#[derive(Debug, Clone)]
pub struct PoseSmoother {
    alpha: f64,
    prev: Option<Vec<Keypoint>>,
    velocities: HashMap<String, Vector2<f64>>,
    persistence: HashMap<String, u32>,
    bone_lengths: HashMap<String, f64>,
}

impl Default for PoseSmoother {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl PoseSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.1, 1.0),
            prev: None,
            velocities: HashMap::new(),
            persistence: HashMap::new(),
            bone_lengths: HashMap::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.1, 1.0);
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.velocities.clear();
        self.persistence.clear();
        self.bone_lengths.clear();
    }

    pub fn smooth(&mut self, keypoints: &[Keypoint]) -> Vec<Keypoint> {
        if keypoints.is_empty() {
            return Vec::new();
        }
        let Some(prev) = self.prev.take() else {
            self.prev = Some(keypoints.to_vec());
            return keypoints.to_vec();
        };

        self.update_bone_lengths(keypoints);

        let smoothed: Vec<Keypoint> = keypoints
            .iter()
            .map(|current| match find_keypoint(&prev, &current.name) {
                Some(previous) => self.smooth_joint(current, previous, &prev),
                None => {
                    self.persistence.insert(current.name.clone(), 0);
                    self.velocities.insert(current.name.clone(), Vector2::zeros());
                    current.clone()
                }
            })
            .collect();

        self.prev = Some(smoothed.clone());
        smoothed
    }

    fn smooth_joint(&mut self, current: &Keypoint, previous: &Keypoint, prev: &[Keypoint]) -> Keypoint {
        let name = current.name.as_str();
        let velocity = self.velocities.get(name).copied().unwrap_or_else(Vector2::zeros);

        if current.score < OCCLUSION_SCORE {
            let persistence = self.persistence.entry(name.to_string()).or_insert(0);
            *persistence += 1;
            if *persistence > MAX_PERSISTENCE {
                return current.clone();
            }

            let mut next = previous.position() + velocity * FRICTION;
            if let (Some(parent), Some(&bone)) = (
                parent_of(name).and_then(|p| find_keypoint(prev, p)),
                self.bone_lengths.get(name),
            ) {
                let offset = next - parent.position();
                let dist = offset.norm();
                let max_len = bone * BONE_SLACK;
                if dist > max_len {
                    next = parent.position() + offset * (max_len / dist);
                }
            }
            self.velocities.insert(name.to_string(), velocity * FRICTION);

            return Keypoint {
                x: next.x,
                y: next.y,
                score: previous.score * SCORE_DECAY,
                is_predicted: true,
                ..previous.clone()
            };
        }

        self.persistence.insert(name.to_string(), 0);
        let a = self.alpha;
        let delta = current.position() - previous.position();
        self.velocities
            .insert(name.to_string(), delta * a + velocity * (1.0 - a));

        Keypoint {
            x: a * current.x + (1.0 - a) * previous.x,
            y: a * current.y + (1.0 - a) * previous.y,
            is_predicted: false,
            ..current.clone()
        }
    }

    fn update_bone_lengths(&mut self, keypoints: &[Keypoint]) {
        for (child, parent) in TOPOLOGY {
            let (Some(c), Some(p)) = (find_keypoint(keypoints, child), find_keypoint(keypoints, parent))
            else {
                continue;
            };
            if c.score > BONE_SCORE && p.score > BONE_SCORE {
                let dist = c.distance_to(p);
                self.bone_lengths
                    .entry(child.to_string())
                    .and_modify(|len| *len = 0.1 * dist + 0.9 * *len)
                    .or_insert(dist);
            }
        }
    }
}
