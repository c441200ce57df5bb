use std::sync::{Arc, Mutex};

use motion_fsm::fsm::{AnomalyKind, EventKind, LogKind};
use motion_fsm::pose::Keypoint;
use motion_fsm::script::{self, ScriptContext};
use motion_fsm::{
    CycleStatistics, EngineObserver, Frame, FrameBuilder, ModelError, ScriptError,
    StateMachineEngine,
};

const ROI_MODEL: &str = r#"{
    "name": "roi chain",
    "statesList": [
        { "id": "a", "name": "A", "roi": { "x": 0.0, "y": 0.0, "width": 0.5, "height": 0.5 }, "minDuration": 0.5 },
        { "id": "b", "name": "B", "roi": { "x": 0.5, "y": 0.5, "width": 0.5, "height": 0.5 }, "minDuration": 0.5 },
        { "id": "c", "name": "C" }
    ]
}"#;

fn object_transition(id: &str, from: &str, to: &str, class: &str, hold: Option<f64>) -> String {
    let hold = hold.map(|h| format!(r#", "holdTime": {h}"#)).unwrap_or_default();
    format!(
        r#"{{ "id": "{id}", "from": "{from}", "to": "{to}"{hold}, "condition": {{
            "operator": "AND",
            "rules": [{{ "type": "OBJECT_IN_ROI", "params": {{
                "objectClass": "{class}", "roi": {{ "x": 0, "y": 0, "width": 1, "height": 1 }}
            }} }}]
        }} }}"#
    )
}

fn line_model(transitions: &[String]) -> String {
    format!(
        r#"{{
            "name": "assembly line",
            "statesList": [
                {{ "id": "s_start", "name": "Start" }},
                {{ "id": "pick", "name": "Pick", "isVA": true }},
                {{ "id": "place", "name": "Place", "isVA": true }},
                {{ "id": "complete", "name": "Complete" }}
            ],
            "transitions": [{}]
        }}"#,
        transitions.join(",")
    )
}

fn wrist_frame(ts: f64, wrist: (f64, f64)) -> Frame {
    FrameBuilder::new()
        .timestamp(ts)
        .pose_from_tuples(Some(1), [("right_wrist", wrist.0, wrist.1, 0.9)])
        .build()
}

fn object_frame(ts: f64, classes: &[&str]) -> Frame {
    classes
        .iter()
        .fold(
            FrameBuilder::new()
                .timestamp(ts)
                .pose_from_tuples(Some(1), [("nose", 0.5, 0.2, 0.9)]),
            |builder, class| builder.object(*class, [0.4, 0.4, 0.2, 0.2], 0.9),
        )
        .build()
}

fn state_of(engine: &StateMachineEngine, id: u64) -> Option<&str> {
    engine.track(id).map(|t| t.state_id.as_str())
}

#[test]
fn test_roi_dwell_transitions_once() {
    let mut engine = StateMachineEngine::default();
    engine.load_model_json(ROI_MODEL).unwrap();

    for i in 0..=10 {
        engine.process_frame(&wrist_frame(i as f64 * 0.1, (0.2, 0.2)));
    }

    assert_eq!(state_of(&engine, 1), Some("b"));
    let timeline = engine.timeline();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].state_id, "a");
    assert_eq!(timeline[0].kind, EventKind::Normal);
    assert_eq!(timeline[0].anomaly, None);
    assert_eq!(timeline[0].start_time, 0.0);
    assert_eq!(timeline[0].end_time, 0.5);
}

#[test]
fn test_transition_classification() {
    let model = line_model(&[
        object_transition("jump", "s_start", "place", "jump", None),
        object_transition("back", "place", "pick", "back", None),
        object_transition("forward", "pick", "place", "forward", None),
        object_transition("restart", "place", "s_start", "restart", None),
    ]);
    let mut engine = StateMachineEngine::default();
    engine.load_model_json(&model).unwrap();

    engine.process_frame(&object_frame(0.0, &[]));
    let out = engine.process_frame(&object_frame(1.0, &["jump"]));
    assert_eq!(out.tracks[0].state_id, "place");
    assert!(
        out.logs
            .iter()
            .any(|l| l.kind == LogKind::Anomaly && l.message == "Sequence Skip: Jumped from Start to Place")
    );

    let out = engine.process_frame(&object_frame(2.0, &["back"]));
    assert_eq!(out.tracks[0].state_id, "pick");
    assert!(
        out.logs
            .iter()
            .any(|l| l.message == "Regression: Reverted from Place to Pick")
    );

    engine.process_frame(&object_frame(3.0, &["forward"]));
    engine.process_frame(&object_frame(4.0, &["restart"]));
    assert_eq!(state_of(&engine, 1), Some("s_start"));

    let kinds: Vec<_> = engine
        .timeline()
        .iter()
        .map(|e| (e.state_id.as_str(), e.kind, e.anomaly))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("s_start", EventKind::Anomaly, Some(AnomalyKind::Skip)),
            ("place", EventKind::Anomaly, Some(AnomalyKind::Regression)),
            ("pick", EventKind::Normal, None),
            ("place", EventKind::Normal, None),
        ]
    );
    let anomalies = engine.logs().iter().filter(|l| l.kind == LogKind::Anomaly).count();
    assert_eq!(anomalies, 2);
}

#[test]
fn test_stale_tracks_are_dropped() {
    let mut engine = StateMachineEngine::default();
    engine.load_model_json(ROI_MODEL).unwrap();

    let both = FrameBuilder::new()
        .timestamp(0.0)
        .pose_from_tuples(Some(1), [("nose", 0.5, 0.2, 0.9)])
        .pose_from_tuples(Some(2), [("nose", 0.7, 0.2, 0.9)])
        .build();
    assert_eq!(engine.process_frame(&both).tracks.len(), 2);

    let out = engine.process_frame(&wrist_frame(2.0, (0.9, 0.9)));
    assert_eq!(out.tracks.len(), 2);

    let out = engine.process_frame(&wrist_frame(2.1, (0.9, 0.9)));
    assert_eq!(out.tracks.len(), 1);
    assert_eq!(out.tracks[0].id, 1);
    assert_eq!(out.logs[0].message, "Operator 2 lost");
    assert_eq!(out.logs[0].kind, LogKind::System);
}

#[test]
fn test_hold_time_requires_continuous_condition() {
    let model = line_model(&[object_transition("t1", "s_start", "pick", "part", Some(1.0))]);
    let mut engine = StateMachineEngine::default();
    engine.load_model_json(&model).unwrap();

    engine.process_frame(&object_frame(0.0, &[]));
    engine.process_frame(&object_frame(0.1, &["part"]));
    engine.process_frame(&object_frame(0.6, &["part"]));
    engine.process_frame(&object_frame(0.8, &[]));
    engine.process_frame(&object_frame(1.0, &["part"]));
    engine.process_frame(&object_frame(1.9, &["part"]));
    assert_eq!(state_of(&engine, 1), Some("s_start"));

    let out = engine.process_frame(&object_frame(2.0, &["part"]));
    assert_eq!(out.tracks[0].state_id, "pick");
    assert_eq!(out.logs[0].message, "Start -> Pick (Rule Triggered (Held 1.0s))");
}

#[derive(Default)]
struct Recorded {
    changes: Vec<(u64, String, String)>,
    cycles: Vec<CycleStatistics>,
}

struct Recorder(Arc<Mutex<Recorded>>);

impl EngineObserver for Recorder {
    fn on_state_change(&mut self, track_id: u64, to_state: &str, from_state: &str) {
        if let Ok(mut recorded) = self.0.lock() {
            recorded.changes.push((track_id, to_state.into(), from_state.into()));
        }
    }

    fn on_cycle_complete(&mut self, stats: &CycleStatistics) {
        if let Ok(mut recorded) = self.0.lock() {
            recorded.cycles.push(stats.clone());
        }
    }
}

#[test]
fn test_observer_receives_state_changes_and_cycles() {
    let model = line_model(&[
        object_transition("t1", "s_start", "pick", "pick", None),
        object_transition("t2", "pick", "place", "place", None),
        object_transition("t3", "place", "complete", "done", None),
        object_transition("t4", "complete", "s_start", "next", None),
    ]);
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let mut engine = StateMachineEngine::default();
    engine.set_observer(Recorder(Arc::clone(&recorded)));
    engine.load_model_json(&model).unwrap();

    engine.process_frame(&object_frame(0.0, &[]));
    engine.process_frame(&object_frame(1.0, &["pick"]));
    engine.process_frame(&object_frame(3.0, &["place"]));
    engine.process_frame(&object_frame(4.0, &["done"]));
    engine.process_frame(&object_frame(4.5, &["next"]));

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.changes.len(), 4);
    assert_eq!(recorded.changes[0], (1, "pick".to_string(), "s_start".to_string()));
    assert_eq!(recorded.changes[3], (1, "s_start".to_string(), "complete".to_string()));

    // Entering `complete` and re-entering `s_start` both report statistics.
    assert_eq!(recorded.cycles.len(), 2);
    let stats = &recorded.cycles[1];
    assert_eq!(stats.total_cycles, 1);
    assert_eq!(stats.latest_cycle.duration, 4.5);
    assert_eq!(stats.latest_cycle.va_duration, 3.0);
    assert!((stats.va_ratio - 3.0 / 4.5 * 100.0).abs() < 1e-9);

    let summary = engine.cycle_statistics().unwrap();
    assert_eq!(summary.total_cycles, 1);
}

#[test]
fn test_model_load_errors() {
    let mut engine = StateMachineEngine::default();

    let duplicate = r#"{ "statesList": [{ "id": "a" }, { "id": "a" }] }"#;
    assert!(matches!(
        engine.load_model_json(duplicate),
        Err(ModelError::DuplicateState(id)) if id == "a"
    ));

    let unknown = r#"{ "statesList": [{ "id": "a" }],
        "transitions": [{ "id": "t", "from": "a", "to": "missing", "condition": { "rules": [] } }] }"#;
    assert!(matches!(
        engine.load_model_json(unknown),
        Err(ModelError::UnknownState { state, .. }) if state == "missing"
    ));

    let bad_script = r#"{ "statesList": [{ "id": "a" }, { "id": "b" }],
        "transitions": [{ "id": "t", "from": "a", "to": "b", "condition": { "rules": [
            { "type": "ADVANCED_SCRIPT", "params": { "script": "elbow_thing.y < 1" } }
        ] } }] }"#;
    assert!(matches!(
        engine.load_model_json(bad_script),
        Err(ModelError::InvalidScript { source: ScriptError::UnknownIdentifier(_), .. })
    ));

    assert!(matches!(engine.load_model_json("{ not json"), Err(ModelError::Parse(_))));
    assert!(engine.model().is_none());
}

#[test]
fn test_script_rule_drives_transition() {
    let model = r#"{ "statesList": [{ "id": "idle", "name": "Idle" }, { "id": "raised", "name": "Raised" }],
        "transitions": [{ "id": "t", "from": "idle", "to": "raised", "condition": { "rules": [
            { "type": "ADVANCED_SCRIPT", "params": { "script": "right_wrist.y < nose.y" } }
        ] } }] }"#;
    let mut engine = StateMachineEngine::default();
    engine.load_model_json(model).unwrap();

    let frame = |ts: f64, wrist_y: f64| {
        FrameBuilder::new()
            .timestamp(ts)
            .pose_from_tuples(Some(1), [("nose", 0.5, 0.3, 0.9), ("right_wrist", 0.6, wrist_y, 0.9)])
            .build()
    };
    engine.process_frame(&frame(0.0, 0.6));
    assert_eq!(state_of(&engine, 1), Some("idle"));
    engine.process_frame(&frame(0.1, 0.2));
    assert_eq!(state_of(&engine, 1), Some("raised"));
}

#[test]
fn test_script_validation_and_missing_joints() {
    assert!(matches!(
        script::validate("shoulder_blade.x > 0"),
        Err(ScriptError::UnknownIdentifier(_))
    ));
    assert!(script::validate("left_wrist.y < 0.5").is_ok());

    let keypoints = vec![Keypoint::new("nose", 0.5, 0.2, 0.9)];
    assert!(!script::evaluate("left_wrist.y < 0.5", &ScriptContext::new(&keypoints)));
}
