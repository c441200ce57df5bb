//! Work-element state machines and sequence compliance over streamed pose
//! detections.
//!
//! Hosts feed [`Frame`]s (poses, hands, objects and classifier results) into
//! either engine:
//!
//! - [`StateMachineEngine`] runs one finite state machine per tracked person,
//!   driven by a declarative [`Model`], and records a timeline of visited
//!   states with skip and regression anomalies.
//! - [`SequenceComplianceEngine`] follows a strictly ordered list of
//!   [`WorkElement`]s, matching the live pose window against golden motion
//!   sequences with DTW.

pub mod compliance;
pub mod dtw;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod integration;
pub mod pose;
pub mod script;

pub use compliance::{ComplianceConfig, ComplianceStatus, SequenceComplianceEngine, WorkElement};
pub use dtw::{DtwConfig, DtwEngine, DtwResult};
pub use error::{ModelError, ScriptError};
pub use frame::{ClassPrediction, Frame, Hand, Landmark, ObjectDetection};
pub use fsm::{
    CycleBoundary, CycleStatistics, EngineConfig, EngineObserver, FrameOutput, Model,
    StateMachineEngine,
};
pub use integration::{FrameBuilder, FrameSource, IterSource, MonitorPipeline};
pub use pose::{Keypoint, Pose, Rect};
pub use script::Script;
