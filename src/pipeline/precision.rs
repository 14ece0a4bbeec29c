//! Precision mode: amplify deviation from the calibrated neutral

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pose::{Param, ParamGroup, PoseSample};

/// Precision mode settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionSettings {
    pub enabled: bool,
    pub multiplier: f64,
    /// Per-group toggles; a disabled group passes through unchanged
    pub head: bool,
    pub eyes: bool,
    pub mouth: bool,
    /// Hold the previous adjusted value when a parameter moves less than
    /// `noise_threshold` between ticks
    pub noise_reduction: bool,
    pub noise_threshold: f64,
}

impl Default for PrecisionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            multiplier: 1.5,
            head: true,
            eyes: true,
            mouth: true,
            noise_reduction: true,
            noise_threshold: 0.01,
        }
    }
}

impl PrecisionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(ConfigError::invalid(
                "precision.multiplier",
                format!("must be a finite value >= 0, got {}", self.multiplier),
            ));
        }
        if !self.noise_threshold.is_finite() || self.noise_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "precision.noise_threshold",
                format!("must be a finite value >= 0, got {}", self.noise_threshold),
            ));
        }
        Ok(())
    }

    pub fn group_enabled(&self, group: ParamGroup) -> bool {
        match group {
            ParamGroup::Head => self.head,
            ParamGroup::Eyes => self.eyes,
            ParamGroup::Mouth => self.mouth,
        }
    }

    fn applies_to(&self, param: Param) -> bool {
        self.enabled && self.group_enabled(param.group())
    }
}

/// Scales each parameter by the precision multiplier, clamped to its bounds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrecisionAdjuster {
    settings: PrecisionSettings,
}

impl PrecisionAdjuster {
    pub fn new(settings: PrecisionSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &PrecisionSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn apply(&self, sample: &PoseSample) -> PoseSample {
        if !self.settings.enabled {
            return *sample;
        }
        sample.map(|param, value| {
            if self.settings.applies_to(param) {
                param.clamp_value(value * self.settings.multiplier)
            } else {
                value
            }
        })
    }

    /// Suppress sub-threshold jitter against the previous adjusted output.
    /// Covers every parameter, not just the amplified groups.
    pub fn reduce_noise(&self, adjusted: &PoseSample, previous: Option<&PoseSample>) -> PoseSample {
        match previous {
            Some(previous) if self.settings.enabled && self.settings.noise_reduction => {
                adjusted.zip_with(*previous, |_, current, prev| {
                    if (current - prev).abs() < self.settings.noise_threshold {
                        prev
                    } else {
                        current
                    }
                })
            }
            _ => *adjusted,
        }
    }
}
