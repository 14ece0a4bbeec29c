//! Output module
//!
//! Final parameter frames fan out to a closed set of sinks:
//! - VMC over OSC/UDP (VSeeFace, VNyan, Warudo, etc.)
//! - Virtual camera frame passthrough
//! - VTube Studio plugin API over WebSocket

pub mod dispatcher;
pub mod virtual_camera;
pub mod vmc;
pub mod vtube_studio;

pub use dispatcher::{DispatchReport, OutputDispatcher};
pub use virtual_camera::VirtualCameraSink;
pub use vmc::NetworkSender;
pub use vtube_studio::VTubeStudioSink;

use std::fmt;
use std::sync::Arc;

use crate::error::OutputError;
use crate::pose::PoseSample;

/// Raw RGB24 raster passed through to the virtual camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; Self::expected_len(width, height)])
    }

    /// Byte length of an RGB24 frame of the given size
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Final parameters for one tick, consumed independently by every sink
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    sequence: u64,
    params: PoseSample,
    face_detected: bool,
    raster: Option<Arc<RasterFrame>>,
}

impl OutputFrame {
    pub fn new(sequence: u64, params: PoseSample, face_detected: bool) -> Self {
        Self {
            sequence,
            params,
            face_detected,
            raster: None,
        }
    }

    /// Attach the camera raster captured on the same tick
    pub fn with_raster(mut self, raster: Option<Arc<RasterFrame>>) -> Self {
        self.raster = raster;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn params(&self) -> &PoseSample {
        &self.params
    }

    pub fn face_detected(&self) -> bool {
        self.face_detected
    }

    pub fn raster(&self) -> Option<&RasterFrame> {
        self.raster.as_deref()
    }
}

/// Sink condition as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkHealth {
    Healthy,
    /// Last delivery failed; the sink keeps receiving frames
    Degraded,
    /// Sink gave up for the rest of the session
    Disabled,
}

impl fmt::Display for SinkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Output sink. New sink kinds are added as variants.
pub enum Sink {
    Network(NetworkSender),
    VirtualCamera(VirtualCameraSink),
    VTubeStudio(VTubeStudioSink),
}

impl Sink {
    /// Deliver one frame. Never blocks longer than the sink's write timeout.
    pub fn accept(&mut self, frame: &OutputFrame) -> Result<(), OutputError> {
        match self {
            Self::Network(sender) => sender.accept(frame),
            Self::VirtualCamera(camera) => camera.accept(frame),
            Self::VTubeStudio(vts) => vts.accept(frame),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Network(_) => "vmc",
            Self::VirtualCamera(_) => "virtual_camera",
            Self::VTubeStudio(_) => "vtube_studio",
        }
    }

    pub fn health(&self) -> SinkHealth {
        match self {
            Self::Network(sender) => sender.health(),
            Self::VirtualCamera(camera) => camera.health(),
            Self::VTubeStudio(vts) => vts.health(),
        }
    }
}

impl From<NetworkSender> for Sink {
    fn from(sender: NetworkSender) -> Self {
        Self::Network(sender)
    }
}

impl From<VirtualCameraSink> for Sink {
    fn from(camera: VirtualCameraSink) -> Self {
        Self::VirtualCamera(camera)
    }
}

impl From<VTubeStudioSink> for Sink {
    fn from(vts: VTubeStudioSink) -> Self {
        Self::VTubeStudio(vts)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("name", &self.name())
            .field("health", &self.health())
            .finish()
    }
}
