//! VMC protocol sender
//!
//! Sends the head bone rotation and VRM blendshape values to VMC receivers
//! (VSeeFace, VNyan, Warudo, etc.) over OSC/UDP. Every tick produces two
//! packets:
//! - `/VMC/Ext/Bone/Pos "Head" px py pz qx qy qz qw`
//! - one bundle of `/VMC/Ext/Blend/Val name value` messages closed by
//!   `/VMC/Ext/Blend/Apply`

use glam::{DQuat, EulerRot};
use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{info, trace};

use super::{OutputFrame, SinkHealth};
use crate::config::VmcConfig;
use crate::error::OutputError;
use crate::pose::estimator::HEAD_ANGLE_RANGE_DEG;
use crate::pose::PoseSample;

/// Default VMC receiver port
pub const DEFAULT_VMC_PORT: u16 = 39539;

pub const BONE_POS_ADDR: &str = "/VMC/Ext/Bone/Pos";
pub const BLEND_VAL_ADDR: &str = "/VMC/Ext/Blend/Val";
pub const BLEND_APPLY_ADDR: &str = "/VMC/Ext/Blend/Apply";
pub const HEAD_BONE: &str = "Head";

/// VRM 0.x preset blendshape names
pub mod blendshapes {
    pub const BLINK_L: &str = "Blink_L";
    pub const BLINK_R: &str = "Blink_R";
    pub const A: &str = "A";
    pub const I: &str = "I";
    pub const U: &str = "U";
    pub const E: &str = "E";
    pub const O: &str = "O";
    pub const JOY: &str = "Joy";
}

/// VRM blendshape values for one frame, each clamped to `[0, 1]`
pub fn blend_values(params: &PoseSample) -> [(&'static str, f32); 8] {
    let weight = |value: f64| value.clamp(0.0, 1.0) as f32;
    [
        (blendshapes::BLINK_L, weight(params.eye_left)),
        (blendshapes::BLINK_R, weight(params.eye_right)),
        (blendshapes::A, weight(params.mouth_open * 1.5)),
        (blendshapes::I, weight(params.mouth_wide * 0.5)),
        (blendshapes::U, weight(params.mouth_wide * 0.5)),
        (blendshapes::E, weight(params.mouth_wide * 0.3)),
        (blendshapes::O, weight(params.mouth_open * 0.8)),
        (blendshapes::JOY, weight(params.mouth_wide * 1.2)),
    ]
}

/// Head rotation for normalized yaw/pitch/roll (±1 is ±30°)
pub fn head_rotation(params: &PoseSample) -> DQuat {
    let range = (HEAD_ANGLE_RANGE_DEG as f64).to_radians();
    DQuat::from_euler(
        EulerRot::YXZ,
        params.yaw * range,
        params.pitch * range,
        params.roll * range,
    )
}

fn encode(packet: &OscPacket) -> Result<Vec<u8>, OutputError> {
    rosc::encoder::encode(packet).map_err(|e| OutputError::Encode(format!("{:?}", e)))
}

/// Encode one frame into its two wire packets (bone, blend bundle)
pub fn encode_frame(frame: &OutputFrame) -> Result<[Vec<u8>; 2], OutputError> {
    let q = head_rotation(frame.params());
    let bone = OscPacket::Message(OscMessage {
        addr: BONE_POS_ADDR.to_string(),
        args: vec![
            OscType::String(HEAD_BONE.to_string()),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(q.x as f32),
            OscType::Float(q.y as f32),
            OscType::Float(q.z as f32),
            OscType::Float(q.w as f32),
        ],
    });

    let mut content: Vec<OscPacket> = blend_values(frame.params())
        .iter()
        .map(|(name, value)| {
            OscPacket::Message(OscMessage {
                addr: BLEND_VAL_ADDR.to_string(),
                args: vec![OscType::String(name.to_string()), OscType::Float(*value)],
            })
        })
        .collect();
    content.push(OscPacket::Message(OscMessage {
        addr: BLEND_APPLY_ADDR.to_string(),
        args: Vec::new(),
    }));

    // timetag 1 means "immediately"
    let blend = OscPacket::Bundle(OscBundle {
        timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
        content,
    });

    Ok([encode(&bone)?, encode(&blend)?])
}

/// Best-effort VMC sender. No retries: a dropped frame is superseded by the
/// next one.
#[derive(Debug)]
pub struct NetworkSender {
    socket: UdpSocket,
    target: SocketAddr,
    health: SinkHealth,
    frames_sent: u64,
    failures: u64,
}

impl NetworkSender {
    /// Resolve the configured target and bind an ephemeral local socket
    pub fn new(config: &VmcConfig, write_timeout: Duration) -> Result<Self, OutputError> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| {
                OutputError::SenderBind(format!("{}:{}: {}", config.host, config.port, e))
            })?
            .next()
            .ok_or_else(|| {
                OutputError::SenderBind(format!(
                    "{}:{} did not resolve to an address",
                    config.host, config.port
                ))
            })?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)
            .map_err(|e| OutputError::SenderBind(format!("Failed to bind {}: {}", local, e)))?;
        socket
            .set_write_timeout(Some(write_timeout))
            .map_err(|e| OutputError::SenderBind(format!("Failed to set write timeout: {}", e)))?;

        info!("VMC sender targeting {}", target);
        Ok(Self::with_socket(socket, target))
    }

    /// Sender over an already bound socket
    pub fn with_socket(socket: UdpSocket, target: SocketAddr) -> Self {
        Self {
            socket,
            target,
            health: SinkHealth::Healthy,
            frames_sent: 0,
            failures: 0,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn health(&self) -> SinkHealth {
        self.health
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn accept(&mut self, frame: &OutputFrame) -> Result<(), OutputError> {
        let packets = encode_frame(frame)?;

        for packet in &packets {
            if let Err(e) = self.socket.send_to(packet, self.target) {
                self.failures += 1;
                self.health = SinkHealth::Degraded;
                return Err(OutputError::Send {
                    target: self.target.to_string(),
                    message: e.to_string(),
                });
            }
        }

        self.frames_sent += 1;
        self.health = SinkHealth::Healthy;
        trace!("VMC frame {} sent to {}", frame.sequence(), self.target);
        Ok(())
    }
}
