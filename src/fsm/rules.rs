//! Evaluation of condition trees against one track and frame.
//!
//! Every check degrades to `false` when its inputs are missing.

use std::collections::BTreeMap;

use crate::dtw::DtwEngine;
use crate::fsm::model::{
    AngleParams, Axis, ClassMatchParams, Condition, ConditionItem, CoordinateSystem, Gesture,
    HandProximityParams, LoadedModel, LogicOp, ObjectProximityParams, ObjectRoiParams,
    OperatorProximityParams, PoseMatchParams, RelationParams, Rule, RuleItem, SequenceParams,
    TargetType, VelocityParams,
};
use crate::fsm::track::Track;
use crate::frame::Frame;
use crate::pose::{Keypoint, find_keypoint, joint_angle, normalize, similarity};
use crate::script::ScriptContext;

const INDEX_TIP: usize = 8;
const INDEX_MCP: usize = 5;
const MIN_SEQUENCE_FRAMES: usize = 10;
const CLASSIFIER_THRESHOLD: f64 = 0.8;
const DETECTION_THRESHOLD: f64 = 0.5;

/// Inputs visible to rules while one track is evaluated.
pub(crate) struct RuleContext<'a> {
    pub model: &'a LoadedModel,
    pub frame: &'a Frame,
    pub track: &'a Track,
    /// Every other live track
    pub others: &'a BTreeMap<u64, Track>,
    pub dtw: &'a DtwEngine,
}

impl RuleContext<'_> {
    fn keypoints(&self) -> &[Keypoint] {
        self.track.keypoints()
    }

    /// Evaluate a condition tree. An empty group is false.
    ///
    /// `invert` negates items inside the tree; it has no effect on the root.
    pub fn condition(&self, condition: &Condition) -> bool {
        if condition.rules.is_empty() {
            return false;
        }
        let mut items = condition.rules.iter().map(|item| self.item(item));
        match condition.operator {
            LogicOp::And => items.all(|ok| ok),
            LogicOp::Or => items.any(|ok| ok),
        }
    }

    fn item(&self, item: &ConditionItem) -> bool {
        match item {
            ConditionItem::Group(group) => self.condition(group) != group.invert,
            ConditionItem::Rule(rule) => self.rule_item(rule) != rule.invert,
        }
    }

    fn rule_item(&self, item: &RuleItem) -> bool {
        if !item.trust_persistent {
            let kps = self.keypoints();
            let predicted = item
                .rule
                .joints()
                .into_iter()
                .any(|joint| find_keypoint(kps, joint).is_some_and(|k| k.is_predicted));
            if predicted {
                return false;
            }
        }
        self.rule(&item.rule)
    }

    pub fn rule(&self, rule: &Rule) -> bool {
        match rule {
            Rule::PoseAngle(p) => self.pose_angle(p),
            Rule::PoseRelation(p) => self.pose_relation(p),
            Rule::PoseVelocity(p) => self.pose_velocity(p),
            Rule::PoseMatching(p) => self.pose_matching(p),
            Rule::HandGesture(p) => self.hand_gesture(p.gesture),
            Rule::HandProximity(p) => self.hand_proximity(p),
            Rule::ObjectProximity(p) => self.object_proximity(p),
            Rule::ObjectInRoi(p) => self.object_in_roi(p),
            Rule::OperatorProximity(p) => self.operator_proximity(p),
            Rule::Classifier(p) => self.classifier(p),
            Rule::Detection(p) => self.detection(p),
            Rule::SequenceMatch(p) => self.sequence_match(p),
            Rule::Script(p) => match self.model.script(&p.script) {
                Some(script) => script.evaluate(
                    &ScriptContext::new(self.keypoints()).with_classifiers(&self.frame.classifiers),
                ),
                None => false,
            },
            Rule::Unknown(kind) => {
                tracing::trace!(kind = %kind, "unknown rule type evaluated to false");
                false
            }
        }
    }

    fn pose_angle(&self, p: &AngleParams) -> bool {
        let kps = self.keypoints();
        let (Some(a), Some(b), Some(c)) = (
            find_keypoint(kps, &p.joint_a),
            find_keypoint(kps, &p.joint_b),
            find_keypoint(kps, &p.joint_c),
        ) else {
            return false;
        };
        p.operator.evaluate(joint_angle(a, b, c), p.value, p.value2)
    }

    fn pose_relation(&self, p: &RelationParams) -> bool {
        let own = match self.model.model().coordinate_system {
            CoordinateSystem::Screen => self.keypoints().to_vec(),
            CoordinateSystem::Normalized => normalize(self.keypoints()),
        };
        let Some(a) = find_keypoint(&own, &p.joint_a) else {
            return false;
        };
        let value_a = component(a, p.component);

        let target = match (p.target_type, p.joint_b.as_deref()) {
            (TargetType::Point, Some(joint_b)) => {
                let other_id = p
                    .target_track_id
                    .as_ref()
                    .filter(|r| !r.is_keyword("self"))
                    .and_then(|r| r.id());
                let b = match other_id {
                    Some(id) => self
                        .others
                        .get(&id)
                        .and_then(|t| find_keypoint(t.keypoints(), joint_b)),
                    None => find_keypoint(&own, joint_b),
                };
                match b {
                    Some(b) => component(b, p.component),
                    None => return false,
                }
            }
            _ => p.value,
        };
        p.operator.evaluate(value_a, target, p.value2)
    }

    fn pose_velocity(&self, p: &VelocityParams) -> bool {
        self.track
            .velocities
            .get(&p.joint)
            .is_some_and(|&speed| p.operator.evaluate(speed, p.value, p.value2))
    }

    fn pose_matching(&self, p: &PoseMatchParams) -> bool {
        self.model
            .state(&p.target_state_id)
            .and_then(|s| s.reference_pose.as_ref())
            .is_some_and(|reference| {
                similarity(self.keypoints(), &reference.keypoints) >= p.threshold
            })
    }

    fn hand_gesture(&self, gesture: Gesture) -> bool {
        self.frame.hands.iter().any(|hand| {
            let (Some(tip), Some(mcp)) = (hand.get(INDEX_TIP), hand.get(INDEX_MCP)) else {
                return false;
            };
            let detected = if tip.y < mcp.y {
                Gesture::Pointing
            } else {
                Gesture::Fist
            };
            detected == gesture
        })
    }

    fn hand_proximity(&self, p: &HandProximityParams) -> bool {
        let Some(body) = find_keypoint(self.keypoints(), &p.body_part) else {
            return false;
        };
        self.frame.hands.iter().any(|hand| {
            hand.get(p.landmark).or(hand.first()).is_some_and(|lm| {
                let dist = (lm.x - body.x).hypot(lm.y - body.y);
                p.operator.evaluate(dist, p.distance, None)
            })
        })
    }

    fn object_proximity(&self, p: &ObjectProximityParams) -> bool {
        let Some(joint) = find_keypoint(self.keypoints(), &p.joint) else {
            return false;
        };
        self.frame
            .objects
            .iter()
            .filter(|obj| obj.class.eq_ignore_ascii_case(&p.object_class))
            .any(|obj| {
                let (cx, cy) = obj.center();
                p.operator
                    .evaluate((cx - joint.x).hypot(cy - joint.y), p.distance, None)
            })
    }

    fn object_in_roi(&self, p: &ObjectRoiParams) -> bool {
        self.frame
            .objects
            .iter()
            .filter(|obj| obj.class.eq_ignore_ascii_case(&p.object_class))
            .any(|obj| {
                let (cx, cy) = obj.center();
                p.roi.contains(cx, cy)
            })
    }

    fn operator_proximity(&self, p: &OperatorProximityParams) -> bool {
        let Some(mine) = find_keypoint(self.keypoints(), &p.joint) else {
            return false;
        };
        let distance_to = |track: &Track| {
            find_keypoint(track.keypoints(), &p.joint).map(|theirs| mine.distance_to(theirs))
        };

        if p.target_track_id.is_keyword("any") {
            return self
                .others
                .values()
                .filter_map(distance_to)
                .any(|d| p.operator.evaluate(d, p.distance, None));
        }
        let distance = match p.target_track_id.id() {
            Some(id) => self.others.get(&id).and_then(distance_to),
            None => self
                .others
                .values()
                .filter_map(distance_to)
                .min_by(f64::total_cmp),
        };
        distance.is_some_and(|d| p.operator.evaluate(d, p.distance, None))
    }

    fn classifier(&self, p: &ClassMatchParams) -> bool {
        let threshold = p.threshold.unwrap_or(CLASSIFIER_THRESHOLD);
        self.frame
            .classifiers
            .iter()
            .filter(|(id, _)| p.model_id.as_ref().is_none_or(|m| m == *id))
            .any(|(_, pred)| {
                pred.class_name.eq_ignore_ascii_case(&p.target_class)
                    && pred.probability >= threshold
            })
    }

    fn detection(&self, p: &ClassMatchParams) -> bool {
        let threshold = p.threshold.unwrap_or(DETECTION_THRESHOLD);
        self.frame
            .detections
            .iter()
            .filter(|(id, _)| p.model_id.as_ref().is_none_or(|m| m == *id))
            .flat_map(|(_, dets)| dets)
            .any(|det| det.class.eq_ignore_ascii_case(&p.target_class) && det.confidence >= threshold)
    }

    fn sequence_match(&self, p: &SequenceParams) -> bool {
        let buffer = &self.track.pose_buffer;
        if buffer.len() < MIN_SEQUENCE_FRAMES || p.target_sequence.is_empty() {
            return false;
        }
        let take = buffer.len().min(p.buffer_size.max(1));
        let window: Vec<_> = buffer.range(buffer.len() - take..).collect();
        let result = self.dtw.compute(&window, &p.target_sequence);
        result.normalized_distance < p.threshold
    }
}

fn component(kp: &Keypoint, axis: Axis) -> f64 {
    match axis {
        Axis::X => kp.x,
        Axis::Y => kp.y,
        Axis::Z => kp.z,
    }
}
