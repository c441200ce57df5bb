//! Declarative motion model: ordered states, guarded transitions and the
//! rule variants their conditions are built from.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::pose::{Pose, Rect};
use crate::script::Script;

/// A motion model as authored by a host application.
///
/// State order is the expected work sequence; anomaly classification and
/// automatic advancement both depend on list position.
///
/// States are read from `statesList`, or from `states` when that key is absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawModel")]
pub struct Model {
    pub id: Option<String>,
    pub name: String,
    pub coordinate_system: CoordinateSystem,
    pub states_list: Vec<State>,
    pub transitions: Vec<Transition>,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawModel {
    id: Option<String>,
    name: String,
    coordinate_system: CoordinateSystem,
    states_list: Option<Vec<State>>,
    states: Option<Vec<State>>,
    transitions: Vec<Transition>,
}

impl From<RawModel> for Model {
    fn from(raw: RawModel) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            coordinate_system: raw.coordinate_system,
            states_list: raw.states_list.or(raw.states).unwrap_or_default(),
            transitions: raw.transitions,
        }
    }
}

impl Model {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Coordinate space for joint relation rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum CoordinateSystem {
    /// Keypoints are normalized around the body root first
    #[default]
    Normalized,
    /// Raw detector coordinates
    Screen,
}

impl From<String> for CoordinateSystem {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("screen") {
            CoordinateSystem::Screen
        } else {
            CoordinateSystem::Normalized
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "isVA", alias = "isVa")]
    pub is_va: bool,
    #[serde(default)]
    pub roi: Option<Rect>,
    #[serde(default)]
    pub reference_pose: Option<Pose>,
    #[serde(default)]
    pub min_duration: Option<f64>,
}

impl State {
    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    /// True if the state advances on its own once held long enough.
    pub fn has_compliance_target(&self) -> bool {
        self.roi.is_some() || self.reference_pose.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    #[serde(default)]
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub hold_time: Option<f64>,
}

impl Transition {
    /// Time the condition must hold continuously; zero fires immediately.
    pub fn hold_time(&self) -> f64 {
        self.hold_time.or(self.condition.hold_time).unwrap_or(0.0)
    }

    fn label(&self) -> String {
        if self.id.is_empty() {
            format!("{} -> {}", self.from, self.to)
        } else {
            self.id.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LogicOp {
    #[default]
    And,
    Or,
}

impl From<String> for LogicOp {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("or") {
            LogicOp::Or
        } else {
            LogicOp::And
        }
    }
}

/// A group of rules or nested groups joined by one operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub operator: LogicOp,
    pub rules: Vec<ConditionItem>,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub hold_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConditionItem {
    Group(Condition),
    Rule(RuleItem),
}

/// A rule with its per-item modifiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct RuleItem {
    pub rule: Rule,
    pub invert: bool,
    /// When false the rule fails if any involved joint was predicted
    pub trust_persistent: bool,
}

impl RuleItem {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            invert: false,
            trust_persistent: true,
        }
    }
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    invert: bool,
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

impl TryFrom<RawRule> for RuleItem {
    type Error = serde_json::Error;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let p = match raw.params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let trust_persistent = p.get("trustPersistent").and_then(Value::as_bool).unwrap_or(true);
        let rule = match raw.kind.as_str() {
            "POSE_ANGLE" => Rule::PoseAngle(params(p)?),
            "POSE_RELATION" => Rule::PoseRelation(params(p)?),
            "POSE_VELOCITY" => Rule::PoseVelocity(params(p)?),
            "POSE_MATCHING" => Rule::PoseMatching(params(p)?),
            "HAND_GESTURE" => Rule::HandGesture(params(p)?),
            "HAND_PROXIMITY" => Rule::HandProximity(params(p)?),
            "OBJECT_PROXIMITY" => Rule::ObjectProximity(params(p)?),
            "OBJECT_IN_ROI" => Rule::ObjectInRoi(params(p)?),
            "OPERATOR_PROXIMITY" => Rule::OperatorProximity(params(p)?),
            "TEACHABLE_MACHINE" => Rule::Classifier(params(p)?),
            "ROBOFLOW_DETECTION" => Rule::Detection(params(p)?),
            "SEQUENCE_MATCH" => Rule::SequenceMatch(params(p)?),
            "ADVANCED_SCRIPT" => Rule::Script(params(p)?),
            _ => Rule::Unknown(raw.kind.clone()),
        };
        Ok(Self {
            rule,
            invert: raw.invert,
            trust_persistent,
        })
    }
}

/// Comparison applied to a measured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Comparison {
    #[default]
    Lt,
    Gt,
    Le,
    Ge,
    /// Within 0.05
    Eq,
    Ne,
    /// Inclusive range `[value, value2]`
    Between,
    Unsupported,
}

const FUZZY_EQ: f64 = 0.05;

impl From<String> for Comparison {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "<" => Comparison::Lt,
            ">" => Comparison::Gt,
            "<=" => Comparison::Le,
            ">=" => Comparison::Ge,
            "=" | "==" => Comparison::Eq,
            "!=" => Comparison::Ne,
            "BETWEEN" => Comparison::Between,
            _ => Comparison::Unsupported,
        }
    }
}

impl Comparison {
    /// `upper` bounds `Between` and defaults to `target`.
    pub fn evaluate(self, value: f64, target: f64, upper: Option<f64>) -> bool {
        match self {
            Comparison::Lt => value < target,
            Comparison::Gt => value > target,
            Comparison::Le => value <= target,
            Comparison::Ge => value >= target,
            Comparison::Eq => (value - target).abs() < FUZZY_EQ,
            Comparison::Ne => (value - target).abs() >= FUZZY_EQ,
            Comparison::Between => value >= target && value <= upper.unwrap_or(target),
            Comparison::Unsupported => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    #[default]
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetType {
    #[default]
    Value,
    Point,
}

/// Reference to another track: a numeric id or one of `self`, `nearest`, `any`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrackRef {
    Id(u64),
    Keyword(String),
}

impl Default for TrackRef {
    fn default() -> Self {
        TrackRef::Keyword("nearest".to_string())
    }
}

impl TrackRef {
    /// Explicit track id, accepting numeric strings.
    pub fn id(&self) -> Option<u64> {
        match self {
            TrackRef::Id(id) => Some(*id),
            TrackRef::Keyword(s) => s.parse().ok(),
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, TrackRef::Keyword(s) if s.eq_ignore_ascii_case(keyword))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    Pointing,
    Fist,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngleParams {
    pub joint_a: String,
    pub joint_b: String,
    pub joint_c: String,
    pub operator: Comparison,
    pub value: f64,
    #[serde(default)]
    pub value2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationParams {
    pub joint_a: String,
    #[serde(default)]
    pub joint_b: Option<String>,
    #[serde(default)]
    pub component: Axis,
    pub operator: Comparison,
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub target_track_id: Option<TrackRef>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub value2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityParams {
    pub joint: String,
    pub operator: Comparison,
    pub value: f64,
    #[serde(default)]
    pub value2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseMatchParams {
    pub target_state_id: String,
    #[serde(default = "default_pose_match_threshold")]
    pub threshold: f64,
}

fn default_pose_match_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureParams {
    pub gesture: Gesture,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandProximityParams {
    /// Hand landmark index; falls back to the wrist (0) when out of range
    #[serde(default)]
    pub landmark: usize,
    pub body_part: String,
    pub distance: f64,
    #[serde(default)]
    pub operator: Comparison,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectProximityParams {
    pub object_class: String,
    pub joint: String,
    pub distance: f64,
    #[serde(default)]
    pub operator: Comparison,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRoiParams {
    pub object_class: String,
    pub roi: Rect,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorProximityParams {
    pub joint: String,
    #[serde(default)]
    pub target_track_id: TrackRef,
    pub distance: f64,
    #[serde(default)]
    pub operator: Comparison,
}

/// Parameters shared by the classifier and secondary detector rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMatchParams {
    #[serde(default)]
    pub model_id: Option<String>,
    pub target_class: String,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceParams {
    #[serde(default)]
    pub target_sequence: Vec<Pose>,
    #[serde(default = "default_sequence_threshold")]
    pub threshold: f64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_sequence_threshold() -> f64 {
    0.4
}

fn default_buffer_size() -> usize {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptParams {
    pub script: String,
}

/// A predicate over one frame of detections.
#[derive(Debug, Clone)]
pub enum Rule {
    PoseAngle(AngleParams),
    PoseRelation(RelationParams),
    PoseVelocity(VelocityParams),
    PoseMatching(PoseMatchParams),
    HandGesture(GestureParams),
    HandProximity(HandProximityParams),
    ObjectProximity(ObjectProximityParams),
    ObjectInRoi(ObjectRoiParams),
    OperatorProximity(OperatorProximityParams),
    /// Image classifier result (`TEACHABLE_MACHINE`)
    Classifier(ClassMatchParams),
    /// Secondary object detector output (`ROBOFLOW_DETECTION`)
    Detection(ClassMatchParams),
    SequenceMatch(SequenceParams),
    Script(ScriptParams),
    /// Unrecognized rule type; always false
    Unknown(String),
}

impl Rule {
    /// Body joints the rule reads from the current pose.
    pub fn joints(&self) -> Vec<&str> {
        match self {
            Rule::PoseAngle(p) => vec![p.joint_a.as_str(), p.joint_b.as_str(), p.joint_c.as_str()],
            Rule::PoseRelation(p) => {
                let mut joints = vec![p.joint_a.as_str()];
                joints.extend(p.joint_b.as_deref());
                joints
            }
            Rule::PoseVelocity(p) => vec![p.joint.as_str()],
            Rule::HandProximity(p) => vec![p.body_part.as_str()],
            Rule::ObjectProximity(p) => vec![p.joint.as_str()],
            Rule::OperatorProximity(p) => vec![p.joint.as_str()],
            _ => Vec::new(),
        }
    }
}

/// A validated model with precomputed lookups and compiled scripts.
#[derive(Debug)]
pub struct LoadedModel {
    model: Model,
    index: HashMap<String, usize>,
    scripts: HashMap<String, Script>,
}

impl LoadedModel {
    pub fn new(model: Model) -> Result<Self, ModelError> {
        if model.states_list.is_empty() {
            return Err(ModelError::EmptyStates);
        }

        let mut index = HashMap::with_capacity(model.states_list.len());
        for (i, state) in model.states_list.iter().enumerate() {
            if index.insert(state.id.clone(), i).is_some() {
                return Err(ModelError::DuplicateState(state.id.clone()));
            }
        }

        let mut scripts = HashMap::new();
        for transition in &model.transitions {
            for state in [&transition.from, &transition.to] {
                if !index.contains_key(state) {
                    return Err(ModelError::UnknownState {
                        transition: transition.label(),
                        state: state.clone(),
                    });
                }
            }
            collect_scripts(&transition.condition, &mut scripts).map_err(|source| {
                ModelError::InvalidScript {
                    transition: transition.label(),
                    source,
                }
            })?;
        }

        Ok(Self {
            model,
            index,
            scripts,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn states(&self) -> &[State] {
        &self.model.states_list
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.model.transitions
    }

    pub fn index_of(&self, state_id: &str) -> Option<usize> {
        self.index.get(state_id).copied()
    }

    pub fn state(&self, state_id: &str) -> Option<&State> {
        self.index_of(state_id).map(|i| &self.model.states_list[i])
    }

    pub fn state_name<'a>(&'a self, state_id: &'a str) -> &'a str {
        self.state(state_id).map_or(state_id, State::label)
    }

    pub fn is_va(&self, state_id: &str) -> bool {
        self.state(state_id).is_some_and(|s| s.is_va)
    }

    pub fn script(&self, source: &str) -> Option<&Script> {
        self.scripts.get(source)
    }
}

fn collect_scripts(
    condition: &Condition,
    scripts: &mut HashMap<String, Script>,
) -> Result<(), crate::error::ScriptError> {
    for item in &condition.rules {
        match item {
            ConditionItem::Group(group) => collect_scripts(group, scripts)?,
            ConditionItem::Rule(RuleItem {
                rule: Rule::Script(p),
                ..
            }) => {
                if !scripts.contains_key(&p.script) {
                    scripts.insert(p.script.clone(), Script::compile(&p.script)?);
                }
            }
            ConditionItem::Rule(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{
        "name": "Assembly",
        "states": [
            { "id": "s_start", "name": "Idle" },
            { "id": "reach", "name": "Reach", "isVA": true, "roi": { "x": 0.1, "y": 0.1, "width": 0.2, "height": 0.2 } }
        ],
        "transitions": [{
            "id": "t1", "from": "s_start", "to": "reach",
            "condition": {
                "operator": "OR",
                "holdTime": 1.5,
                "rules": [
                    { "type": "POSE_ANGLE", "params": { "jointA": "right_shoulder", "jointB": "right_elbow", "jointC": "right_wrist", "operator": "BETWEEN", "value": 30, "value2": 60 } },
                    { "operator": "AND", "invert": true, "rules": [
                        { "type": "ADVANCED_SCRIPT", "params": { "script": "nose.y < 0.5", "trustPersistent": false } }
                    ] },
                    { "type": "LASER_BEAM", "params": {} }
                ]
            }
        }]
    }"#;

    #[test]
    fn test_parse_model() {
        let model = Model::from_json(MODEL).unwrap();
        assert_eq!(model.states_list.len(), 2);
        assert!(model.states_list[1].is_va);
        assert_eq!(model.coordinate_system, CoordinateSystem::Normalized);

        let transition = &model.transitions[0];
        assert_eq!(transition.hold_time(), 1.5);
        assert_eq!(transition.condition.operator, LogicOp::Or);
        assert!(matches!(
            &transition.condition.rules[0],
            ConditionItem::Rule(RuleItem { rule: Rule::PoseAngle(p), .. }) if p.operator == Comparison::Between
        ));
        let ConditionItem::Group(group) = &transition.condition.rules[1] else {
            panic!("expected nested group");
        };
        assert!(group.invert);
        let ConditionItem::Rule(item) = &group.rules[0] else {
            panic!("expected rule");
        };
        assert!(!item.trust_persistent);
        assert!(matches!(
            &transition.condition.rules[2],
            ConditionItem::Rule(RuleItem { rule: Rule::Unknown(kind), .. }) if kind == "LASER_BEAM"
        ));
    }

    #[test]
    fn test_states_list_preferred_over_states() {
        let json = r#"{
            "statesList": [{ "id": "a" }, { "id": "b" }],
            "states": [{ "id": "legacy" }]
        }"#;
        let model = Model::from_json(json).unwrap();
        let ids: Vec<_> = model.states_list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        let legacy = Model::from_json(r#"{ "states": [{ "id": "legacy" }] }"#).unwrap();
        assert_eq!(legacy.states_list[0].id, "legacy");
        assert!(Model::from_json("{}").unwrap().states_list.is_empty());
    }

    #[test]
    fn test_loaded_model_lookups() {
        let loaded = LoadedModel::new(Model::from_json(MODEL).unwrap()).unwrap();
        assert_eq!(loaded.index_of("reach"), Some(1));
        assert_eq!(loaded.state_name("reach"), "Reach");
        assert_eq!(loaded.state_name("gone"), "gone");
        assert!(loaded.is_va("reach"));
        assert!(loaded.script("nose.y < 0.5").is_some());
    }

    #[test]
    fn test_malformed_known_rule_is_error() {
        let json = r#"{ "states": [{ "id": "a" }], "transitions": [{ "from": "a", "to": "a",
            "condition": { "rules": [{ "type": "POSE_ANGLE", "params": { "jointA": "x" } }] } }] }"#;
        assert!(matches!(Model::from_json(json), Err(ModelError::Parse(_))));
    }

    #[test]
    fn test_comparison() {
        assert!(Comparison::Eq.evaluate(1.02, 1.0, None));
        assert!(!Comparison::Ne.evaluate(1.02, 1.0, None));
        assert!(Comparison::Between.evaluate(45.0, 30.0, Some(60.0)));
        assert!(Comparison::Between.evaluate(30.0, 30.0, None));
        assert!(!Comparison::Unsupported.evaluate(1.0, 1.0, None));
        assert_eq!(Comparison::from("between".to_string()), Comparison::Between);
    }

    #[test]
    fn test_track_ref() {
        let r: TrackRef = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(r.id(), Some(7));
        let r: TrackRef = serde_json::from_str("3").unwrap();
        assert_eq!(r.id(), Some(3));
        assert!(TrackRef::default().is_keyword("nearest"));
    }
}
