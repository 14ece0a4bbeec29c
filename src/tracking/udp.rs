//! Face-mesh landmark receiver
//!
//! Receives JSON-over-UDP packets from an external face-mesh detector:
//!
//! ```json
//! {"seq": 42, "face_detected": true, "landmarks": [[0.51, 0.43, -0.02], ...]}
//! ```
//!
//! Packets with a sequence number not newer than the last accepted one are
//! dropped. When nothing arrives within the no-face timeout a no-face frame is
//! produced so the output keeps its cadence.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use super::{CapturedFrame, LandmarkSource};
use crate::config::SourceConfig;
use crate::error::{Result, TrackingError};
use crate::pose::{LandmarkFrame, FACE_MESH_LANDMARKS};

const RECV_BUFFER_SIZE: usize = 65536;

/// A single JSON packet from the detector
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkPacket {
    /// Detector frame counter
    pub seq: u64,
    #[serde(default = "default_face_detected")]
    pub face_detected: bool,
    /// Normalized `[x, y, z]` face-mesh points
    #[serde(default)]
    pub landmarks: Vec<[f32; 3]>,
}

fn default_face_detected() -> bool {
    true
}

impl LandmarkPacket {
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, TrackingError> {
        serde_json::from_slice(bytes)
            .map_err(|e| TrackingError::PacketParse(format!("JSON parse error: {}", e)))
    }

    /// Convert to a landmark frame carrying the receiver's own sequence
    /// number. An incomplete mesh counts as no face.
    pub fn into_frame(self, sequence: u64) -> LandmarkFrame {
        if !self.face_detected {
            return LandmarkFrame::no_face(sequence);
        }
        if self.landmarks.len() < FACE_MESH_LANDMARKS {
            debug!(
                "Packet {} has {} of {} landmarks, treating as no face",
                self.seq,
                self.landmarks.len(),
                FACE_MESH_LANDMARKS
            );
            return LandmarkFrame::no_face(sequence);
        }
        let points = self
            .landmarks
            .into_iter()
            .map(glam::Vec3::from_array)
            .collect();
        LandmarkFrame::new(sequence, points)
    }
}

/// UDP landmark source
pub struct UdpLandmarkSource {
    config: SourceConfig,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
    /// Last accepted detector sequence number
    last_seq: Option<u64>,
    /// Monotonic frame sequence handed to the pipeline
    sequence: u64,
}

impl UdpLandmarkSource {
    /// Create a new source (does not bind yet)
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            config: config.clone(),
            socket: None,
            buf: vec![0; RECV_BUFFER_SIZE],
            last_seq: None,
            sequence: 0,
        }
    }

    /// Bind the UDP socket
    pub async fn start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.config.listen_address, self.config.port);
        let socket = UdpSocket::bind(&addr).await.map_err(|e| {
            TrackingError::SourceBind(format!("Failed to bind to {}: {}", addr, e))
        })?;

        info!("Landmark source listening on {}", addr);
        self.socket = Some(socket);
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

impl LandmarkSource for UdpLandmarkSource {
    async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        let timeout = Duration::from_millis(self.config.no_face_timeout_ms);

        loop {
            let socket = self.socket.as_ref().ok_or_else(|| {
                TrackingError::SourceReceive("source not started".to_string())
            })?;

            let received = tokio::time::timeout(timeout, socket.recv(&mut self.buf)).await;
            let size = match received {
                Err(_) => {
                    // a detector that went quiet may restart its counter
                    self.last_seq = None;
                    let sequence = self.next_sequence();
                    return Ok(Some(CapturedFrame::new(LandmarkFrame::no_face(sequence))));
                }
                Ok(Err(e)) => {
                    return Err(TrackingError::SourceReceive(e.to_string()).into());
                }
                Ok(Ok(size)) => size,
            };

            let packet = LandmarkPacket::parse(&self.buf[..size])?;
            if self.last_seq.is_some_and(|last| packet.seq <= last) {
                trace!("Dropping stale landmark packet {}", packet.seq);
                continue;
            }
            self.last_seq = Some(packet.seq);

            let sequence = self.next_sequence();
            return Ok(Some(CapturedFrame::new(packet.into_frame(sequence))));
        }
    }
}
