//! Pose primitives: keypoints, regions, normalization, joint angles and smoothing.

mod angle;
mod keypoint;
mod normalizer;
mod rect;
mod smoother;

pub use angle::{ErgonomicAngles, Side, joint_angle};
pub use keypoint::{KNOWN_JOINTS, Keypoint, Pose, find_keypoint, is_known_joint};
pub use normalizer::{MIN_JOINT_SCORE, normalize, pose_distance, similarity};
pub(crate) use normalizer::mean_joint_distance;
pub use rect::Rect;
pub use smoother::PoseSmoother;
