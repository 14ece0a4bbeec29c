//! Error types for Facerig

use thiserror::Error;

/// Main error type for Facerig
#[derive(Error, Debug)]
pub enum FacerigError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown parameter '{key}' in [{section}]")]
    UnknownParameter { section: String, key: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Landmark source errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Landmark source bind failed: {0}")]
    SourceBind(String),

    #[error("Landmark source receive error: {0}")]
    SourceReceive(String),

    #[error("Landmark packet parse error: {0}")]
    PacketParse(String),
}

/// Output sink errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("VMC sender setup failed: {0}")]
    SenderBind(String),

    #[error("OSC encode error: {0}")]
    Encode(String),

    #[error("VMC send to {target} failed: {message}")]
    Send { target: String, message: String },

    #[error("Virtual camera device open failed: {0}")]
    DeviceOpen(String),

    #[error("Virtual camera write failed: {0}")]
    DeviceWrite(String),

    #[error("Virtual camera not ready, frame dropped")]
    DeviceBusy,

    #[error("Rejected frame: expected {expected} bytes ({width}x{height} RGB), got {actual}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Sink '{0}' is disabled")]
    SinkDisabled(String),
}

/// Result type alias for Facerig operations
pub type Result<T> = std::result::Result<T, FacerigError>;
