//! Dynamic time warping over pose sequences.
//!
//! Both matchers in this crate share one Sakoe-Chiba banded DTW core and
//! differ only in the per-frame cost: the [`DtwEngine`] compares normalized
//! poses, the [`MotionComparator`] compares raw joint feature vectors.

mod banded;
mod engine;
mod features;

pub use banded::{band_width, banded_dtw};
pub use engine::{DtwConfig, DtwEngine, DtwResult};
pub use features::{MOTION_JOINTS, MotionComparator, MotionComparison, motion_features};
