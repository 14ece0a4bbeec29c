//! Per-frame pose/expression sample
//!
//! Normalized ranges:
//! - `yaw`, `pitch`, `roll`: `[-1, 1]`, where ±1 corresponds to ±30° of head rotation
//! - `eye_left`, `eye_right`: eye closure in `[0, 1]` (0 = open, 1 = closed)
//! - `mouth_open`, `mouth_wide`: `[0, 1]`

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Sub};

/// Bounds for head rotation parameters
pub const ROTATION_BOUNDS: (f64, f64) = (-1.0, 1.0);

/// Bounds for eye and mouth parameters
pub const EXPRESSION_BOUNDS: (f64, f64) = (0.0, 1.0);

/// One tracked parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Yaw,
    Pitch,
    Roll,
    EyeLeft,
    EyeRight,
    MouthOpen,
    MouthWide,
}

impl Param {
    pub const ALL: [Param; 7] = [
        Self::Yaw,
        Self::Pitch,
        Self::Roll,
        Self::EyeLeft,
        Self::EyeRight,
        Self::MouthOpen,
        Self::MouthWide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yaw => "yaw",
            Self::Pitch => "pitch",
            Self::Roll => "roll",
            Self::EyeLeft => "eye_left",
            Self::EyeRight => "eye_right",
            Self::MouthOpen => "mouth_open",
            Self::MouthWide => "mouth_wide",
        }
    }

    /// Parse a parameter name; accepts the `head_` prefixed rotation names too
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "yaw" | "head_yaw" => Some(Self::Yaw),
            "pitch" | "head_pitch" => Some(Self::Pitch),
            "roll" | "head_roll" => Some(Self::Roll),
            "eye_left" => Some(Self::EyeLeft),
            "eye_right" => Some(Self::EyeRight),
            "mouth_open" => Some(Self::MouthOpen),
            "mouth_wide" => Some(Self::MouthWide),
            _ => None,
        }
    }

    pub fn group(&self) -> ParamGroup {
        match self {
            Self::Yaw | Self::Pitch | Self::Roll => ParamGroup::Head,
            Self::EyeLeft | Self::EyeRight => ParamGroup::Eyes,
            Self::MouthOpen | Self::MouthWide => ParamGroup::Mouth,
        }
    }

    /// Documented normalized `(min, max)` for this parameter
    pub fn bounds(&self) -> (f64, f64) {
        match self.group() {
            ParamGroup::Head => ROTATION_BOUNDS,
            ParamGroup::Eyes | ParamGroup::Mouth => EXPRESSION_BOUNDS,
        }
    }

    pub fn clamp_value(&self, value: f64) -> f64 {
        let (min, max) = self.bounds();
        value.clamp(min, max)
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter groups used for group-wide tuning keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamGroup {
    Head,
    Eyes,
    Mouth,
}

impl ParamGroup {
    pub const ALL: [ParamGroup; 3] = [Self::Head, Self::Eyes, Self::Mouth];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Eyes => "eyes",
            Self::Mouth => "mouth",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "head" | "head_rotation" => Some(Self::Head),
            "eyes" | "eye_blink" => Some(Self::Eyes),
            "mouth" => Some(Self::Mouth),
            _ => None,
        }
    }

    pub fn params(&self) -> &'static [Param] {
        match self {
            Self::Head => &[Param::Yaw, Param::Pitch, Param::Roll],
            Self::Eyes => &[Param::EyeLeft, Param::EyeRight],
            Self::Mouth => &[Param::MouthOpen, Param::MouthWide],
        }
    }
}

/// Scalar pose/expression set derived from one landmark frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSample {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub eye_left: f64,
    pub eye_right: f64,
    pub mouth_open: f64,
    pub mouth_wide: f64,
}

impl PoseSample {
    pub const ZERO: PoseSample = PoseSample {
        yaw: 0.0,
        pitch: 0.0,
        roll: 0.0,
        eye_left: 0.0,
        eye_right: 0.0,
        mouth_open: 0.0,
        mouth_wide: 0.0,
    };

    /// Sample with every parameter set to `value`
    pub fn splat(value: f64) -> Self {
        Self::ZERO.map(|_, _| value)
    }

    pub fn get(&self, param: Param) -> f64 {
        match param {
            Param::Yaw => self.yaw,
            Param::Pitch => self.pitch,
            Param::Roll => self.roll,
            Param::EyeLeft => self.eye_left,
            Param::EyeRight => self.eye_right,
            Param::MouthOpen => self.mouth_open,
            Param::MouthWide => self.mouth_wide,
        }
    }

    pub fn set(&mut self, param: Param, value: f64) {
        match param {
            Param::Yaw => self.yaw = value,
            Param::Pitch => self.pitch = value,
            Param::Roll => self.roll = value,
            Param::EyeLeft => self.eye_left = value,
            Param::EyeRight => self.eye_right = value,
            Param::MouthOpen => self.mouth_open = value,
            Param::MouthWide => self.mouth_wide = value,
        }
    }

    /// Create a new sample with one parameter changed
    pub fn with(mut self, param: Param, value: f64) -> Self {
        self.set(param, value);
        self
    }

    /// Apply `f` to every parameter
    pub fn map(self, mut f: impl FnMut(Param, f64) -> f64) -> Self {
        let mut out = self;
        for param in Param::ALL {
            out.set(param, f(param, self.get(param)));
        }
        out
    }

    /// Combine two samples parameter by parameter
    pub fn zip_with(self, other: PoseSample, mut f: impl FnMut(Param, f64, f64) -> f64) -> Self {
        self.map(|param, value| f(param, value, other.get(param)))
    }

    /// Clamp every parameter to its documented bounds
    pub fn clamped(self) -> Self {
        self.map(|param, value| param.clamp_value(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, f64)> + '_ {
        Param::ALL.into_iter().map(move |param| (param, self.get(param)))
    }

    pub fn is_finite(&self) -> bool {
        self.iter().all(|(_, value)| value.is_finite())
    }
}

impl Add for PoseSample {
    type Output = PoseSample;

    fn add(self, rhs: PoseSample) -> PoseSample {
        self.zip_with(rhs, |_, a, b| a + b)
    }
}

impl Sub for PoseSample {
    type Output = PoseSample;

    fn sub(self, rhs: PoseSample) -> PoseSample {
        self.zip_with(rhs, |_, a, b| a - b)
    }
}

impl Div<f64> for PoseSample {
    type Output = PoseSample;

    fn div(self, rhs: f64) -> PoseSample {
        self.map(|_, value| value / rhs)
    }
}
