//! Multi-track state machine driven by a loaded motion model.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dtw::{DtwConfig, DtwEngine};
use crate::error::ModelError;
use crate::frame::Frame;
use crate::fsm::cycle::{CycleBoundary, CycleStatistics};
use crate::fsm::model::{LoadedModel, Model, State};
use crate::fsm::rules::RuleContext;
use crate::fsm::timeline::{
    AnomalyKind, EventKind, EventLog, LogEntry, LogKind, TimelineEvent, classify,
};
use crate::fsm::track::{Track, TrackSnapshot};
use crate::pose::{Keypoint, find_keypoint, similarity};

/// Configuration for the [`StateMachineEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Tracks unseen for longer than this are dropped
    pub stale_after: f64,
    pub pose_buffer_capacity: usize,
    pub log_capacity: usize,
    /// Dwell time for states that do not declare `minDuration`
    pub default_min_duration: f64,
    /// Similarity to a state's reference pose that counts as compliant
    pub reference_similarity: f64,
    /// Minimum wrist confidence for region checks
    pub roi_min_score: f64,
    /// Enables per-track pose smoothing with this EMA factor
    pub smoothing_alpha: Option<f64>,
    pub dtw: DtwConfig,
    pub cycle_boundary: CycleBoundary,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: 2.0,
            pose_buffer_capacity: 1800,
            log_capacity: 50,
            default_min_duration: 0.5,
            reference_similarity: 0.75,
            roi_min_score: 0.3,
            smoothing_alpha: None,
            dtw: DtwConfig::default(),
            cycle_boundary: CycleBoundary::default(),
        }
    }
}

/// Host callbacks for engine events. Both default to no-ops.
pub trait EngineObserver {
    fn on_state_change(&mut self, _track_id: u64, _to_state: &str, _from_state: &str) {}

    fn on_cycle_complete(&mut self, _stats: &CycleStatistics) {}
}

/// Result of one processed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOutput<'a> {
    pub tracks: Vec<TrackSnapshot>,
    /// Newest first
    pub logs: &'a [LogEntry],
    pub timeline_events: &'a [TimelineEvent],
}

pub struct StateMachineEngine {
    config: EngineConfig,
    model: Option<Arc<LoadedModel>>,
    tracks: BTreeMap<u64, Track>,
    timeline: Vec<TimelineEvent>,
    log: EventLog,
    dtw: DtwEngine,
    observer: Option<Box<dyn EngineObserver>>,
    frame_count: u64,
}

impl Default for StateMachineEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl StateMachineEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            log: EventLog::new(config.log_capacity),
            dtw: DtwEngine::new(config.dtw),
            config,
            model: None,
            tracks: BTreeMap::new(),
            timeline: Vec::new(),
            observer: None,
            frame_count: 0,
        }
    }

    pub fn set_observer(&mut self, observer: impl EngineObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Validate and install a model, resetting all tracks and records.
    ///
    /// On error the previously loaded model stays active.
    pub fn load_model(&mut self, model: Model) -> Result<(), ModelError> {
        let name = model.name.clone();
        let loaded = LoadedModel::new(model).inspect_err(|err| {
            tracing::warn!(model = %name, error = %err, "rejected motion model");
        })?;
        tracing::info!(
            model = %name,
            states = loaded.states().len(),
            transitions = loaded.transitions().len(),
            "loaded motion model"
        );
        self.model = Some(Arc::new(loaded));
        self.reset();
        Ok(())
    }

    pub fn load_model_json(&mut self, json: &str) -> Result<(), ModelError> {
        self.load_model(Model::from_json(json)?)
    }

    /// Drop all tracks, logs and timeline events. The model is kept.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.timeline.clear();
        self.log.clear();
        self.frame_count = 0;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_deref().map(LoadedModel::model)
    }

    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn logs(&self) -> &[LogEntry] {
        self.log.entries()
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Aggregate cycle statistics over the whole timeline.
    pub fn cycle_statistics(&self) -> Option<CycleStatistics> {
        let model = self.model.as_deref()?;
        CycleStatistics::compute(&self.timeline, model, &self.config.cycle_boundary)
    }

    /// Advance every visible track by one frame.
    ///
    /// Poses without an id are keyed by their position in the frame, starting
    /// at 1. Without a loaded model the output is empty.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutput<'_> {
        let Some(model) = self.model.clone() else {
            return FrameOutput::default();
        };
        let now = frame.timestamp;
        self.frame_count += 1;

        for (index, pose) in frame.poses.iter().enumerate() {
            let id = pose.id.unwrap_or(index as u64 + 1);
            let mut track = match self.tracks.remove(&id) {
                Some(track) => track,
                None => self.spawn_track(&model, id, now),
            };
            track.observe(&pose.keypoints, now);
            self.update_track(&model, &mut track, frame);
            self.tracks.insert(id, track);
        }

        self.collect_stale(now);

        let tracks = self
            .tracks
            .values()
            .map(|t| TrackSnapshot {
                id: t.id,
                state: model.state_name(&t.state_id).to_string(),
                state_id: t.state_id.clone(),
                duration: t.state_duration(now),
                is_va: model.is_va(&t.state_id),
            })
            .collect();

        FrameOutput {
            tracks,
            logs: self.log.entries(),
            timeline_events: &self.timeline,
        }
    }

    fn spawn_track(&mut self, model: &LoadedModel, id: u64, now: f64) -> Track {
        let first = &model.states()[0];
        tracing::info!(track = id, state = %first.id, "entity detected");
        self.log.push(
            now,
            id,
            LogKind::System,
            format!("Operator {id} detected. Starting in {}", first.label()),
        );
        Track::new(
            id,
            first.id.clone(),
            now,
            self.config.pose_buffer_capacity,
            self.config.smoothing_alpha,
        )
    }

    fn collect_stale(&mut self, now: f64) {
        let stale_after = self.config.stale_after;
        let stale: Vec<u64> = self
            .tracks
            .values()
            .filter(|t| now - t.last_seen > stale_after)
            .map(|t| t.id)
            .collect();
        for id in stale {
            self.tracks.remove(&id);
            tracing::info!(track = id, "entity lost");
            self.log.push(now, id, LogKind::System, format!("Operator {id} lost"));
        }
    }

    fn update_track(&mut self, model: &LoadedModel, track: &mut Track, frame: &Frame) {
        let now = frame.timestamp;

        if let Some(index) = model.index_of(&track.state_id) {
            let state = &model.states()[index];
            if state.has_compliance_target() && self.is_compliant(state, track.keypoints()) {
                let started = *track.match_started_at.get_or_insert(now);
                let required = state.min_duration.unwrap_or(self.config.default_min_duration);
                if now - started >= required {
                    if let Some(next) = model.states().get(index + 1) {
                        self.transition(model, track, next.id.clone(), now, "Sequence Step Complete");
                        return;
                    }
                    if !track.end_of_sequence_logged
                        && !self.config.cycle_boundary.is_terminal(&track.state_id)
                    {
                        track.end_of_sequence_logged = true;
                        self.log.push(
                            now,
                            track.id,
                            LogKind::CycleComplete,
                            format!("Cycle finished in {:.1}s", track.state_duration(now)),
                        );
                    }
                }
            } else {
                track.match_started_at = None;
            }
        }

        let mut fired = None;
        for (position, transition) in model.transitions().iter().enumerate() {
            if transition.from != track.state_id {
                continue;
            }
            let satisfied = RuleContext {
                model,
                frame,
                track: &*track,
                others: &self.tracks,
                dtw: &self.dtw,
            }
            .condition(&transition.condition);

            if !satisfied {
                track.candidates.remove(&position);
                continue;
            }
            let hold = transition.hold_time();
            if hold <= 0.0 {
                fired = Some((transition.to.clone(), "Rule Triggered".to_string()));
                break;
            }
            let since = *track.candidates.entry(position).or_insert(now);
            let held = now - since;
            if held >= hold {
                fired = Some((transition.to.clone(), format!("Rule Triggered (Held {held:.1}s)")));
                break;
            }
        }

        if let Some((to, reason)) = fired {
            self.transition(model, track, to, now, &reason);
        }
    }

    /// A state with both a region and a reference pose needs both at once:
    /// a confident wrist inside the region and a pose similar enough to the
    /// reference. A state declaring only one is judged on that one.
    fn is_compliant(&self, state: &State, keypoints: &[Keypoint]) -> bool {
        if let Some(roi) = &state.roi {
            let inside = ["right_wrist", "left_wrist"].iter().any(|name| {
                find_keypoint(keypoints, name)
                    .is_some_and(|kp| kp.score >= self.config.roi_min_score && roi.contains(kp.x, kp.y))
            });
            if !inside {
                return false;
            }
        }
        match &state.reference_pose {
            Some(reference) => {
                similarity(keypoints, &reference.keypoints) >= self.config.reference_similarity
            }
            None => true,
        }
    }

    fn transition(&mut self, model: &LoadedModel, track: &mut Track, to: String, now: f64, reason: &str) {
        let from = track.state_id.clone();
        let from_name = model.state_name(&from).to_string();
        let to_name = model.state_name(&to).to_string();

        let anomaly = match (model.index_of(&from), model.index_of(&to)) {
            (Some(from_index), Some(to_index)) => classify(from_index, to_index),
            _ => None,
        };
        match anomaly {
            Some(AnomalyKind::Skip) => {
                tracing::info!(track = track.id, from = %from, to = %to, "sequence skip");
                self.log.push(
                    now,
                    track.id,
                    LogKind::Anomaly,
                    format!("Sequence Skip: Jumped from {from_name} to {to_name}"),
                );
            }
            Some(AnomalyKind::Regression) => {
                tracing::info!(track = track.id, from = %from, to = %to, "sequence regression");
                self.log.push(
                    now,
                    track.id,
                    LogKind::Anomaly,
                    format!("Regression: Reverted from {from_name} to {to_name}"),
                );
            }
            None => {}
        }

        self.timeline.push(TimelineEvent {
            track_id: track.id,
            state: from_name.clone(),
            state_id: from.clone(),
            start_time: track.state_entered_at,
            end_time: now,
            duration: now - track.state_entered_at,
            is_va: model.is_va(&from),
            kind: if anomaly.is_some() {
                EventKind::Anomaly
            } else {
                EventKind::Normal
            },
            anomaly,
        });

        tracing::debug!(track = track.id, from = %from, to = %to, reason, "state transition");
        self.log.push(
            now,
            track.id,
            LogKind::Transition,
            format!("{from_name} -> {to_name} ({reason})"),
        );
        track.enter(to.clone(), now);

        if self.config.cycle_boundary.is_sentinel(&to) {
            if let Some(stats) = CycleStatistics::compute(&self.timeline, model, &self.config.cycle_boundary) {
                tracing::info!(
                    cycles = stats.total_cycles,
                    avg_cycle_time = stats.avg_cycle_time,
                    "cycle boundary reached"
                );
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_cycle_complete(&stats);
                }
            }
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_state_change(track.id, &to, &from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Pose;

    const MODEL: &str = r#"{
        "name": "two step",
        "statesList": [
            { "id": "a", "name": "A", "roi": { "x": 0.0, "y": 0.0, "width": 0.5, "height": 0.5 } },
            { "id": "b", "name": "B", "isVA": true }
        ]
    }"#;

    fn frame(ts: f64, wrist: (f64, f64)) -> Frame {
        let mut frame = Frame::new(ts);
        frame.poses.push(Pose::new(
            Some(7),
            vec![Keypoint::new("right_wrist", wrist.0, wrist.1, 0.9)],
        ));
        frame
    }

    #[test]
    fn test_no_model_yields_empty_output() {
        let mut engine = StateMachineEngine::default();
        let out = engine.process_frame(&frame(0.0, (0.1, 0.1)));
        assert!(out.tracks.is_empty());
        assert!(out.logs.is_empty());
        assert_eq!(engine.frame_count(), 0);
    }

    #[test]
    fn test_roi_dwell_advances() {
        let mut engine = StateMachineEngine::default();
        engine.load_model_json(MODEL).unwrap();

        engine.process_frame(&frame(0.0, (0.1, 0.1)));
        engine.process_frame(&frame(0.3, (0.1, 0.1)));
        assert_eq!(engine.track(7).map(|t| t.state_id.as_str()), Some("a"));

        let out = engine.process_frame(&frame(0.5, (0.1, 0.1)));
        assert_eq!(out.tracks[0].state_id, "b");
        assert!(out.tracks[0].is_va);
        assert_eq!(out.timeline_events.len(), 1);
        assert_eq!(out.logs[0].kind, LogKind::Transition);
        assert_eq!(out.logs[0].message, "A -> B (Sequence Step Complete)");
    }

    #[test]
    fn test_leaving_roi_resets_dwell() {
        let mut engine = StateMachineEngine::default();
        engine.load_model_json(MODEL).unwrap();

        engine.process_frame(&frame(0.0, (0.1, 0.1)));
        engine.process_frame(&frame(0.4, (0.9, 0.9)));
        engine.process_frame(&frame(0.6, (0.1, 0.1)));
        engine.process_frame(&frame(1.0, (0.1, 0.1)));
        assert_eq!(engine.track(7).map(|t| t.state_id.as_str()), Some("a"));
        engine.process_frame(&frame(1.2, (0.1, 0.1)));
        assert_eq!(engine.track(7).map(|t| t.state_id.as_str()), Some("b"));
    }

    #[test]
    fn test_roi_and_reference_pose_both_required() {
        let json = r#"{ "statesList": [
            { "id": "a", "name": "A",
              "roi": { "x": 0.0, "y": 0.0, "width": 0.5, "height": 0.5 },
              "referencePose": [
                { "name": "left_shoulder", "x": 0.4, "y": 0.3, "score": 0.9 },
                { "name": "right_shoulder", "x": 0.6, "y": 0.3, "score": 0.9 },
                { "name": "left_hip", "x": 0.45, "y": 0.6, "score": 0.9 },
                { "name": "right_hip", "x": 0.55, "y": 0.6, "score": 0.9 },
                { "name": "left_wrist", "x": 0.9, "y": 0.9, "score": 0.9 },
                { "name": "right_wrist", "x": 0.1, "y": 0.1, "score": 0.9 }
              ] },
            { "id": "b", "name": "B" }
        ] }"#;
        let body = |ts: f64, left_wrist: (f64, f64)| {
            let mut frame = Frame::new(ts);
            frame.poses.push(Pose::new(
                Some(7),
                vec![
                    Keypoint::new("left_shoulder", 0.4, 0.3, 0.9),
                    Keypoint::new("right_shoulder", 0.6, 0.3, 0.9),
                    Keypoint::new("left_hip", 0.45, 0.6, 0.9),
                    Keypoint::new("right_hip", 0.55, 0.6, 0.9),
                    Keypoint::new("left_wrist", left_wrist.0, left_wrist.1, 0.9),
                    Keypoint::new("right_wrist", 0.1, 0.1, 0.9),
                ],
            ));
            frame
        };
        let mut engine = StateMachineEngine::default();
        engine.load_model_json(json).unwrap();

        // Wrist inside the region, but the posture is far from the reference.
        for i in 0..=10 {
            engine.process_frame(&body(i as f64 * 0.1, (0.1, 0.9)));
        }
        assert_eq!(engine.track(7).map(|t| t.state_id.as_str()), Some("a"));

        engine.process_frame(&body(1.1, (0.9, 0.9)));
        engine.process_frame(&body(1.4, (0.9, 0.9)));
        engine.process_frame(&body(1.7, (0.9, 0.9)));
        assert_eq!(engine.track(7).map(|t| t.state_id.as_str()), Some("b"));
    }

    #[test]
    fn test_end_of_sequence_logged_once() {
        let json = r#"{ "statesList": [
            { "id": "only", "name": "Only", "roi": { "x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0 }, "minDuration": 0 }
        ] }"#;
        let mut engine = StateMachineEngine::default();
        engine.load_model_json(json).unwrap();
        for i in 0..5 {
            engine.process_frame(&frame(i as f64 * 0.1, (0.5, 0.5)));
        }
        let finished = engine
            .logs()
            .iter()
            .filter(|l| l.kind == LogKind::CycleComplete)
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn test_rejected_model_keeps_previous() {
        let mut engine = StateMachineEngine::default();
        engine.load_model_json(MODEL).unwrap();
        assert!(matches!(
            engine.load_model_json(r#"{ "statesList": [] }"#),
            Err(ModelError::EmptyStates)
        ));
        assert_eq!(engine.model().map(|m| m.name.as_str()), Some("two step"));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "staleAfter": 5.0, "dtw": { "threshold": 0.3 } }"#).unwrap();
        assert_eq!(config.stale_after, 5.0);
        assert_eq!(config.log_capacity, 50);
        assert_eq!(config.dtw.threshold, 0.3);
        assert_eq!(config.dtw.window_fraction, 0.2);
    }
}
