//! VTube Studio plugin API sender
//!
//! Injects tracking values into VTube Studio's default input parameters over
//! its WebSocket plugin API. The connection is opened on the first frame and
//! re-opened after a failure, at most once per reconnect interval.
//!
//! A plugin token has to be granted once in the VTube Studio popup. It is
//! logged when granted so it can be stored as `vtube_studio.auth_token`.

use serde_json::{json, Value};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};
use tungstenite::{Message, WebSocket};

use super::{OutputFrame, SinkHealth};
use crate::config::VTubeStudioConfig;
use crate::error::OutputError;
use crate::pose::estimator::HEAD_ANGLE_RANGE_DEG;
use crate::pose::PoseSample;

/// Default VTube Studio plugin API port
pub const DEFAULT_VTS_PORT: u16 = 8001;

pub const API_NAME: &str = "VTubeStudioPublicAPI";
pub const API_VERSION: &str = "1.0";

const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const TOKEN_GRANT_TIMEOUT: Duration = Duration::from_secs(30);

/// VTube Studio default input parameter ids
pub mod parameters {
    pub const FACE_ANGLE_X: &str = "FaceAngleX";
    pub const FACE_ANGLE_Y: &str = "FaceAngleY";
    pub const FACE_ANGLE_Z: &str = "FaceAngleZ";
    pub const EYE_OPEN_LEFT: &str = "EyeOpenLeft";
    pub const EYE_OPEN_RIGHT: &str = "EyeOpenRight";
    pub const MOUTH_OPEN: &str = "MouthOpen";
    pub const MOUTH_SMILE: &str = "MouthSmile";
}

/// Input parameter values for one frame. Angles are in degrees, eyes are
/// openness rather than closure.
pub fn parameter_values(params: &PoseSample) -> [(&'static str, f64); 7] {
    let degrees = HEAD_ANGLE_RANGE_DEG as f64;
    let unit = |value: f64| value.clamp(0.0, 1.0);
    [
        (parameters::FACE_ANGLE_X, params.yaw * degrees),
        (parameters::FACE_ANGLE_Y, params.pitch * degrees),
        (parameters::FACE_ANGLE_Z, params.roll * degrees),
        (parameters::EYE_OPEN_LEFT, unit(1.0 - params.eye_left)),
        (parameters::EYE_OPEN_RIGHT, unit(1.0 - params.eye_right)),
        (parameters::MOUTH_OPEN, unit(params.mouth_open)),
        (parameters::MOUTH_SMILE, unit(params.mouth_wide)),
    ]
}

fn request(message_type: &str, request_id: &str, data: Value) -> String {
    json!({
        "apiName": API_NAME,
        "apiVersion": API_VERSION,
        "requestID": request_id,
        "messageType": message_type,
        "data": data,
    })
    .to_string()
}

/// `InjectParameterDataRequest` for one frame
pub fn inject_request(frame: &OutputFrame, request_id: &str) -> String {
    let values: Vec<Value> = parameter_values(frame.params())
        .iter()
        .map(|(id, value)| json!({ "id": id, "value": value }))
        .collect();
    request(
        "InjectParameterDataRequest",
        request_id,
        json!({
            "faceFound": frame.face_detected(),
            "mode": "set",
            "parameterValues": values,
        }),
    )
}

/// The response's `data` if it has the expected type
fn expect_response(response: Value, expected: &str) -> Result<Value, String> {
    match response["messageType"].as_str() {
        Some(kind) if kind == expected => Ok(response["data"].clone()),
        Some("APIError") => Err(format!(
            "API error {}: {}",
            response["data"]["errorID"],
            response["data"]["message"].as_str().unwrap_or_default()
        )),
        other => Err(format!("unexpected response {:?}", other)),
    }
}

/// Send one request and wait for its JSON reply
fn exchange(socket: &mut WebSocket<TcpStream>, request: String) -> Result<Value, String> {
    socket
        .send(Message::text(request))
        .map_err(|e| e.to_string())?;
    loop {
        match socket.read().map_err(|e| e.to_string())? {
            Message::Text(text) => {
                return serde_json::from_str(&text).map_err(|e| format!("bad reply: {}", e))
            }
            Message::Close(_) => return Err("connection closed".to_string()),
            _ => continue,
        }
    }
}

pub struct VTubeStudioSink {
    target: SocketAddr,
    url: String,
    plugin_name: String,
    plugin_developer: String,
    token: Option<String>,
    io_timeout: Duration,
    socket: Option<WebSocket<TcpStream>>,
    retry_at: Option<Instant>,
    health: SinkHealth,
    requests: u64,
    frames_sent: u64,
    failures: u64,
}

impl VTubeStudioSink {
    /// Resolve the configured API address; connecting waits for the first frame
    pub fn new(config: &VTubeStudioConfig) -> Result<Self, OutputError> {
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

        info!("VTube Studio sender targeting {}", target);
        Ok(Self {
            target,
            url: format!("ws://{}", target),
            plugin_name: config.plugin_name.clone(),
            plugin_developer: config.plugin_developer.clone(),
            token: config.auth_token.clone(),
            io_timeout: Duration::from_millis(config.timeout_ms),
            socket: None,
            retry_at: None,
            health: SinkHealth::Healthy,
            requests: 0,
            frames_sent: 0,
            failures: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn health(&self) -> SinkHealth {
        self.health
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Plugin token in use, if one has been configured or granted
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn accept(&mut self, frame: &OutputFrame) -> Result<(), OutputError> {
        let mut socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                if self.retry_at.is_some_and(|at| Instant::now() < at) {
                    return Err(self.fail("not connected, waiting to retry".to_string()));
                }
                match self.connect() {
                    Ok(socket) => socket,
                    Err(message) => {
                        self.retry_at = Some(Instant::now() + RECONNECT_INTERVAL);
                        return Err(self.fail(message));
                    }
                }
            }
        };

        let request_id = self.next_request_id();
        let response = match exchange(&mut socket, inject_request(frame, &request_id)) {
            Ok(response) => response,
            Err(message) => {
                // connection is dropped; the next frame reconnects
                self.retry_at = None;
                return Err(self.fail(message));
            }
        };
        self.socket = Some(socket);

        expect_response(response, "InjectParameterDataResponse").map_err(|m| self.fail(m))?;
        self.frames_sent += 1;
        self.health = SinkHealth::Healthy;
        trace!("VTube Studio frame {} sent", frame.sequence());
        Ok(())
    }

    fn fail(&mut self, message: String) -> OutputError {
        self.failures += 1;
        self.health = SinkHealth::Degraded;
        OutputError::Send {
            target: self.url.clone(),
            message,
        }
    }

    fn next_request_id(&mut self) -> String {
        self.requests += 1;
        format!("facerig-{}", self.requests)
    }

    fn connect(&mut self) -> Result<WebSocket<TcpStream>, String> {
        let stream = TcpStream::connect_timeout(&self.target, self.io_timeout)
            .map_err(|e| format!("connect failed: {}", e))?;
        stream
            .set_read_timeout(Some(self.io_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.io_timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| e.to_string())?;

        let (mut socket, _) = tungstenite::client(self.url.as_str(), stream)
            .map_err(|e| format!("handshake failed: {}", e))?;
        self.authenticate(&mut socket)?;

        info!("Connected to VTube Studio at {}", self.url);
        Ok(socket)
    }

    fn authenticate(&mut self, socket: &mut WebSocket<TcpStream>) -> Result<(), String> {
        let token = match self.token.clone() {
            Some(token) => token,
            None => {
                let token = self.request_token(socket)?;
                info!(
                    "VTube Studio granted a plugin token, store it as vtube_studio.auth_token: {}",
                    token
                );
                self.token = Some(token.clone());
                token
            }
        };

        let request_id = self.next_request_id();
        let data = json!({
            "pluginName": self.plugin_name,
            "pluginDeveloper": self.plugin_developer,
            "authenticationToken": token,
        });
        let response = exchange(socket, request("AuthenticationRequest", &request_id, data))?;
        let data = expect_response(response, "AuthenticationResponse")?;

        if data["authenticated"].as_bool() != Some(true) {
            // a revoked token has to be granted again
            self.token = None;
            return Err(format!(
                "authentication rejected: {}",
                data["reason"].as_str().unwrap_or_default()
            ));
        }
        debug!("Authenticated with VTube Studio");
        Ok(())
    }

    /// Ask for a new token; waits for the operator to confirm in VTube Studio
    fn request_token(&mut self, socket: &mut WebSocket<TcpStream>) -> Result<String, String> {
        info!("Requesting a VTube Studio plugin token, confirm the prompt in VTube Studio");
        let request_id = self.next_request_id();
        let data = json!({
            "pluginName": self.plugin_name,
            "pluginDeveloper": self.plugin_developer,
        });

        let set_timeout = |socket: &WebSocket<TcpStream>, timeout| {
            socket
                .get_ref()
                .set_read_timeout(Some(timeout))
                .map_err(|e| e.to_string())
        };
        set_timeout(&*socket, TOKEN_GRANT_TIMEOUT)?;
        let response = exchange(socket, request("AuthenticationTokenRequest", &request_id, data));
        set_timeout(&*socket, self.io_timeout)?;

        let data = expect_response(response?, "AuthenticationTokenResponse")?;
        data["authenticationToken"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "token response without a token".to_string())
    }
}
