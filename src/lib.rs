//! Facerig - Face Tracking to VMC Motion Capture
//!
//! Turns a stream of face-mesh landmark frames into stable, tunable avatar
//! parameters:
//! - Neutral-pose calibration, exponential smoothing and precision mode
//! - Per-parameter sensitivity and deadzone mapping
//! - Output over the VMC protocol and to a virtual camera device

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pose;
pub mod session;
pub mod tracking;

pub use config::Config;
pub use error::{FacerigError, Result};
pub use output::{OutputDispatcher, OutputFrame, Sink, SinkHealth};
pub use pipeline::{Pipeline, Tuning};
pub use pose::{LandmarkFrame, Param, PoseSample};
pub use session::{SessionHandle, SessionStats, TrackingSession};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
