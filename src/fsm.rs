//! Model-driven finite state machines, one per tracked entity.

mod cycle;
mod engine;
mod model;
mod rules;
mod timeline;
mod track;

pub use cycle::{Cycle, CycleBoundary, CycleStatistics};
pub use engine::{EngineConfig, EngineObserver, FrameOutput, StateMachineEngine};
pub use model::{
    AngleParams, Axis, ClassMatchParams, Comparison, Condition, ConditionItem, CoordinateSystem,
    Gesture, GestureParams, HandProximityParams, LoadedModel, LogicOp, Model, ObjectProximityParams,
    ObjectRoiParams, OperatorProximityParams, PoseMatchParams, RelationParams, Rule, RuleItem,
    ScriptParams, SequenceParams, State, TargetType, TrackRef, Transition, VelocityParams,
};
pub use timeline::{AnomalyKind, EventKind, EventLog, LogEntry, LogKind, TimelineEvent, classify};
pub use track::{BufferedPose, Track, TrackSnapshot};
