//! Pose module
//!
//! Turns detector landmark frames into normalized pose/expression samples.

pub mod estimator;
pub mod landmarks;
pub mod sample;

pub use estimator::PoseEstimator;
pub use landmarks::{LandmarkFrame, FACE_MESH_LANDMARKS};
pub use sample::{Param, ParamGroup, PoseSample, EXPRESSION_BOUNDS, ROTATION_BOUNDS};
