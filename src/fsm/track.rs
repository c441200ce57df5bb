//! Per-entity state machine instance.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::pose::{Keypoint, PoseSmoother, find_keypoint};

/// A pose retained for sequence matching.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPose {
    pub timestamp: f64,
    pub keypoints: Vec<Keypoint>,
}

impl AsRef<[Keypoint]> for BufferedPose {
    fn as_ref(&self) -> &[Keypoint] {
        &self.keypoints
    }
}

/// One observed entity and its position in the model.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    /// Current state id
    pub state_id: String,
    pub state_entered_at: f64,
    pub last_seen: f64,
    /// Per-joint speed since the previous observation
    pub velocities: HashMap<String, f64>,
    pub pose_buffer: VecDeque<BufferedPose>,
    /// Start of continuous compliance with the current state's target
    pub(crate) match_started_at: Option<f64>,
    /// Hold timers keyed by transition position in the model
    pub(crate) candidates: HashMap<usize, f64>,
    pub(crate) end_of_sequence_logged: bool,
    smoother: Option<PoseSmoother>,
    capacity: usize,
}

impl Track {
    pub(crate) fn new(
        id: u64,
        state_id: String,
        timestamp: f64,
        capacity: usize,
        smoothing_alpha: Option<f64>,
    ) -> Self {
        Self {
            id,
            state_id,
            state_entered_at: timestamp,
            last_seen: timestamp,
            velocities: HashMap::new(),
            pose_buffer: VecDeque::with_capacity(capacity.min(256)),
            match_started_at: None,
            candidates: HashMap::new(),
            end_of_sequence_logged: false,
            smoother: smoothing_alpha.map(PoseSmoother::new),
            capacity,
        }
    }

    /// Most recent pose, empty before the first observation.
    pub fn keypoints(&self) -> &[Keypoint] {
        self.pose_buffer
            .back()
            .map(|p| p.keypoints.as_slice())
            .unwrap_or_default()
    }

    /// Time spent in the current state as of `now`.
    pub fn state_duration(&self, now: f64) -> f64 {
        now - self.state_entered_at
    }

    /// Record a new pose: smooth it, derive joint speeds and buffer it.
    pub(crate) fn observe(&mut self, keypoints: &[Keypoint], timestamp: f64) {
        let keypoints = match self.smoother.as_mut() {
            Some(smoother) => smoother.smooth(keypoints),
            None => keypoints.to_vec(),
        };

        let dt = timestamp - self.last_seen;
        self.velocities = match self.pose_buffer.back() {
            Some(prev) if dt > 0.0 => joint_speeds(&prev.keypoints, &keypoints, dt),
            _ => HashMap::new(),
        };
        self.last_seen = timestamp;

        if self.capacity == 0 {
            return;
        }
        while self.pose_buffer.len() >= self.capacity {
            self.pose_buffer.pop_front();
        }
        self.pose_buffer.push_back(BufferedPose {
            timestamp,
            keypoints,
        });
    }

    /// Enter a new state, clearing per-state timers.
    pub(crate) fn enter(&mut self, state_id: String, timestamp: f64) {
        self.state_id = state_id;
        self.state_entered_at = timestamp;
        self.match_started_at = None;
        self.candidates.clear();
        self.end_of_sequence_logged = false;
    }
}

fn joint_speeds(prev: &[Keypoint], curr: &[Keypoint], dt: f64) -> HashMap<String, f64> {
    curr.iter()
        .filter_map(|kp| {
            find_keypoint(prev, &kp.name).map(|p| (kp.name.clone(), kp.distance_to(p) / dt))
        })
        .collect()
}

/// Externally visible summary of a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub id: u64,
    /// State display name
    pub state: String,
    pub state_id: String,
    /// Time in the current state
    pub duration: f64,
    #[serde(rename = "isVA")]
    pub is_va: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f64) -> Vec<Keypoint> {
        vec![Keypoint::new("right_wrist", x, 0.5, 0.9)]
    }

    #[test]
    fn test_velocity_from_consecutive_poses() {
        let mut track = Track::new(1, "a".into(), 0.0, 10, None);
        track.observe(&pose(0.1), 0.0);
        assert!(track.velocities.is_empty());

        track.observe(&pose(0.3), 0.5);
        assert!((track.velocities["right_wrist"] - 0.4).abs() < 1e-9);

        // Same timestamp: no usable dt.
        track.observe(&pose(0.5), 0.5);
        assert!(track.velocities.is_empty());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut track = Track::new(1, "a".into(), 0.0, 3, None);
        for i in 0..5 {
            track.observe(&pose(i as f64), i as f64);
        }
        assert_eq!(track.pose_buffer.len(), 3);
        assert_eq!(track.pose_buffer.front().map(|p| p.timestamp), Some(2.0));
        assert_eq!(track.keypoints()[0].x, 4.0);
    }

    #[test]
    fn test_enter_clears_timers() {
        let mut track = Track::new(1, "a".into(), 0.0, 3, None);
        track.match_started_at = Some(1.0);
        track.candidates.insert(0, 1.0);
        track.enter("b".into(), 2.0);
        assert_eq!(track.state_id, "b");
        assert_eq!(track.state_entered_at, 2.0);
        assert!(track.match_started_at.is_none());
        assert!(track.candidates.is_empty());
    }
}
