//! Integration module for connecting detector hosts with the state machine
//! engine.
//!
//! Hosts run pose, hand and object detection themselves and hand the results
//! over as [`Frame`](crate::frame::Frame)s, either built directly with
//! [`FrameBuilder`] or pulled from a [`FrameSource`].

mod builder;
mod pipeline;
mod source;

pub use builder::FrameBuilder;
pub use pipeline::MonitorPipeline;
pub use source::{FrameSource, IterSource};
