//! Tracking module
//!
//! Landmark sources feeding the capture loop:
//! - UDP source receiving face-mesh landmarks as JSON from an external detector
//! - Replay source yielding prepared frames (tests, offline runs)

pub mod udp;

pub use udp::UdpLandmarkSource;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::Result;
use crate::output::RasterFrame;
use crate::pose::LandmarkFrame;

/// One capture tick: detector landmarks plus the camera raster, if the
/// source passes one through
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub landmarks: LandmarkFrame,
    pub raster: Option<Arc<RasterFrame>>,
}

impl CapturedFrame {
    pub fn new(landmarks: LandmarkFrame) -> Self {
        Self {
            landmarks,
            raster: None,
        }
    }

    pub fn with_raster(mut self, raster: RasterFrame) -> Self {
        self.raster = Some(Arc::new(raster));
        self
    }
}

/// Producer of one [`CapturedFrame`] per capture tick
pub trait LandmarkSource: Send {
    /// Wait for the next frame; `Ok(None)` means the source is exhausted.
    ///
    /// Implementations must not wait indefinitely: when the detector goes
    /// quiet they yield a no-face frame instead.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<CapturedFrame>>> + Send;
}

/// Source yielding a fixed list of frames, optionally paced
pub struct ReplaySource {
    frames: VecDeque<CapturedFrame>,
    interval: Option<Interval>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = CapturedFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            interval: None,
        }
    }

    /// Yield at most one frame per `period`. Must be called inside a Tokio
    /// runtime.
    pub fn with_interval(mut self, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl LandmarkSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        if let Some(interval) = &mut self.interval {
            interval.tick().await;
        }
        Ok(self.frames.pop_front())
    }
}
