//! Linear standard-work compliance: which element is the operator performing,
//! and is it the one expected next.

mod engine;
mod matcher;

pub use engine::{
    Anomaly, AnomalyDetail, CompletedStep, ComplianceConfig, ComplianceStatus,
    SequenceComplianceEngine,
};
pub use matcher::{ElementMatch, ElementMatcher, WorkElement};
