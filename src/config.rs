//! Configuration parsing and management for Facerig

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, FacerigError};
use crate::output::vmc::DEFAULT_VMC_PORT;
use crate::output::vtube_studio::DEFAULT_VTS_PORT;
use crate::pipeline::calibration::DEFAULT_REQUIRED_SAMPLES;
use crate::pipeline::smoothing::{validate_alpha, DEFAULT_ALPHA};
use crate::pipeline::{PrecisionSettings, Tuning};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub source: SourceConfig,
    pub smoothing: SmoothingConfig,
    /// Parameter or group name -> output multiplier
    pub sensitivity: HashMap<String, f64>,
    /// Parameter or group name -> deadzone threshold
    pub deadzone: HashMap<String, f64>,
    pub precision: PrecisionSettings,
    pub calibration: CalibrationConfig,
    pub vmc: VmcConfig,
    pub virtual_camera: VirtualCameraConfig,
    pub vtube_studio: VTubeStudioConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FacerigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, FacerigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// First existing config file in the search paths
    pub fn find_path() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("facerig.toml"),
            PathBuf::from("config/facerig.toml"),
            dirs_path().join("facerig.toml"),
        ];
        paths.into_iter().find(|path| path.exists())
    }

    /// Load from `path`, or from the first file in the search paths.
    /// Returns the file actually used so it can be re-read later.
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), FacerigError> {
        match path.or_else(Self::find_path) {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                let config = Self::from_file(&path)?;
                Ok((config, Some(path)))
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Validate the configuration. The pipeline must not start on an error.
    pub fn validate(&self) -> Result<(), FacerigError> {
        let positive = |field: &str, value: u64| -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
            Ok(())
        };

        positive("capture.frame_width", self.capture.frame_width.into())?;
        positive("capture.frame_height", self.capture.frame_height.into())?;
        positive("capture.target_fps", self.capture.target_fps.into())?;

        positive("source.port", self.source.port.into())?;
        positive("source.no_face_timeout_ms", self.source.no_face_timeout_ms)?;

        validate_alpha("smoothing.alpha", self.smoothing.alpha)?;

        positive(
            "calibration.required_samples",
            self.calibration.required_samples as u64,
        )?;

        if self.vmc.enabled {
            if self.vmc.host.trim().is_empty() {
                return Err(ConfigError::invalid("vmc.host", "must not be empty").into());
            }
            positive("vmc.port", self.vmc.port.into())?;
        }

        if self.virtual_camera.enabled {
            if self.virtual_camera.device.as_os_str().is_empty() {
                return Err(
                    ConfigError::invalid("virtual_camera.device", "must not be empty").into(),
                );
            }
            positive("virtual_camera.width", self.virtual_camera.width.into())?;
            positive("virtual_camera.height", self.virtual_camera.height.into())?;
            positive("virtual_camera.fps", self.virtual_camera.fps.into())?;
        }

        if self.vtube_studio.enabled {
            if self.vtube_studio.host.trim().is_empty() {
                return Err(ConfigError::invalid("vtube_studio.host", "must not be empty").into());
            }
            positive("vtube_studio.port", self.vtube_studio.port.into())?;
            positive("vtube_studio.timeout_ms", self.vtube_studio.timeout_ms)?;
        }

        positive("dispatch.write_timeout_ms", self.dispatch.write_timeout_ms)?;
        positive("dispatch.drain_timeout_ms", self.dispatch.drain_timeout_ms)?;

        // smoothing overrides, sensitivity, deadzone and precision
        Tuning::from_config(self)?;

        Ok(())
    }
}

/// Camera / stream selection consumed by the acquisition layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: u32,
    /// Network stream used instead of a local camera
    pub stream_url: Option<String>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            stream_url: None,
            frame_width: 640,
            frame_height: 480,
            target_fps: 30,
        }
    }
}

/// Landmark source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub listen_address: String,
    pub port: u16,
    /// Silence after which a no-face frame is produced
    pub no_face_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 12347,
            no_face_timeout_ms: 100,
        }
    }
}

/// Smoothing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weight of the previous output in `[0, 1)`
    pub alpha: f64,
    pub head_alpha: Option<f64>,
    pub eyes_alpha: Option<f64>,
    pub mouth_alpha: Option<f64>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            head_alpha: None,
            eyes_alpha: None,
            mouth_alpha: None,
        }
    }
}

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub required_samples: usize,
    pub auto_commit: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            required_samples: DEFAULT_REQUIRED_SAMPLES,
            auto_commit: true,
        }
    }
}

/// VMC sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmcConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for VmcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_VMC_PORT,
        }
    }
}

/// Virtual camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualCameraConfig {
    pub enabled: bool,
    /// Device node or FIFO receiving raw RGB24 frames
    pub device: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: PathBuf::from("/dev/video10"),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// VTube Studio plugin API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VTubeStudioConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub plugin_name: String,
    pub plugin_developer: String,
    /// Token granted by VTube Studio; requested on first connect when unset
    pub auth_token: Option<String>,
    /// Connect and per-request timeout
    pub timeout_ms: u64,
}

impl Default for VTubeStudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_VTS_PORT,
            plugin_name: "Facerig".to_string(),
            plugin_developer: "Facerig".to_string(),
            auth_token: None,
            timeout_ms: 250,
        }
    }
}

/// Output dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single network send
    pub write_timeout_ms: u64,
    /// Upper bound on waiting for each sink when the session stops
    pub drain_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 20,
            drain_timeout_ms: 500,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("facerig");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/facerig");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/facerig");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("facerig");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Param;
    use std::io::Write;

    fn invalid_field(result: Result<(), FacerigError>) -> String {
        match result {
            Err(FacerigError::Config(ConfigError::InvalidValue { field, .. })) => field,
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.target_fps, 30);
        assert_eq!(config.smoothing.alpha, 0.7);
        assert_eq!(config.vmc.port, 39539);
        assert!(config.vmc.enabled);
        assert!(!config.virtual_camera.enabled);
        assert!(!config.precision.enabled);
        assert_eq!(config.calibration.required_samples, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [smoothing]
            alpha = 0.5
            mouth_alpha = 0.2

            [sensitivity]
            head = 1.5
            roll = 0.5

            [deadzone]
            eyes = 0.1

            [precision]
            enabled = true
            multiplier = 2.0
            mouth = false

            [vmc]
            host = "192.168.1.20"
            port = 39540
        "#;

        let config = Config::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.vmc.host, "192.168.1.20");

        let tuning = Tuning::from_config(&config).unwrap();
        assert_eq!(tuning.smoothing.alpha(Param::Yaw), 0.5);
        assert_eq!(tuning.smoothing.alpha(Param::MouthOpen), 0.2);
        assert_eq!(tuning.mapper.sensitivity().get(Param::Pitch), 1.5);
        assert_eq!(tuning.mapper.sensitivity().get(Param::Roll), 0.5);
        assert_eq!(tuning.mapper.deadzone().get(Param::EyeRight), 0.1);
        assert!(tuning.precision.is_enabled());
        assert!(!tuning.precision.settings().mouth);
    }

    #[test]
    fn test_rejects_alpha_one() {
        let config = Config::from_str("[smoothing]\nalpha = 1.0").unwrap();
        assert_eq!(invalid_field(config.validate()), "smoothing.alpha");

        let config = Config::from_str("[smoothing]\neyes_alpha = 1.5").unwrap();
        assert_eq!(invalid_field(config.validate()), "smoothing.eyes_alpha");
    }

    #[test]
    fn test_rejects_negative_deadzone() {
        let config = Config::from_str("[deadzone]\nyaw = -0.1").unwrap();
        assert_eq!(invalid_field(config.validate()), "deadzone.yaw");
    }

    #[test]
    fn test_accepts_negative_sensitivity() {
        let config = Config::from_str("[sensitivity]\nyaw = -1.0").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let config = Config::from_str("[sensitivity]\nears = 2.0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(FacerigError::Config(ConfigError::UnknownParameter { .. }))
        ));
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = Config::default();
        config.calibration.required_samples = 0;
        assert_eq!(
            invalid_field(config.validate()),
            "calibration.required_samples"
        );

        let mut config = Config::default();
        config.virtual_camera.enabled = true;
        config.virtual_camera.fps = 0;
        assert_eq!(invalid_field(config.validate()), "virtual_camera.fps");

        let mut config = Config::default();
        config.precision.multiplier = -2.0;
        assert_eq!(invalid_field(config.validate()), "precision.multiplier");

        let mut config = Config::default();
        config.vtube_studio.enabled = true;
        config.vtube_studio.timeout_ms = 0;
        assert_eq!(invalid_field(config.validate()), "vtube_studio.timeout_ms");
    }

    #[test]
    fn test_parse_vtube_studio() {
        let config = Config::from_str(
            "[vtube_studio]\nenabled = true\nport = 8002\nauth_token = \"abc\"",
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.vtube_studio.port, 8002);
        assert_eq!(config.vtube_studio.auth_token.as_deref(), Some("abc"));
        assert_eq!(config.vtube_studio.plugin_name, "Facerig");
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_str("[smoothing\nalpha = 0.5"),
            Err(FacerigError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calibration]\nrequired_samples = 10\nauto_commit = false").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.calibration.required_samples, 10);
        assert!(!config.calibration.auto_commit);

        assert!(matches!(
            Config::from_file("/nonexistent/facerig.toml"),
            Err(FacerigError::Config(ConfigError::ReadFile(_)))
        ));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[vmc]\nport = 40000").unwrap();

        let (config, used) = Config::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.vmc.port, 40000);
        assert_eq!(used.as_deref(), Some(file.path()));

        assert!(Config::load(Some(PathBuf::from("/nonexistent/facerig.toml"))).is_err());
    }
}
