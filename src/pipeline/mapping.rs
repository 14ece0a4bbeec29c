//! Sensitivity and deadzone mapping to final output values

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::pose::{Param, ParamGroup, PoseSample};

pub const DEFAULT_SENSITIVITY: f64 = 1.0;
pub const DEFAULT_DEADZONE: f64 = 0.05;

/// Resolve a `name -> value` table into one value per parameter.
///
/// Group keys (`head`, `eyes`, `mouth`) are applied first so individual
/// parameter keys override them. Two keys naming the same parameter or group
/// (`yaw` and `head_yaw`, say) are rejected.
fn resolve_table(
    section: &str,
    table: &HashMap<String, f64>,
    default: f64,
) -> Result<[f64; 7], ConfigError> {
    let mut values = [default; 7];
    let mut params: HashMap<Param, (&str, f64)> = HashMap::new();
    let mut groups: HashMap<ParamGroup, (&str, f64)> = HashMap::new();

    for (key, &value) in table {
        let previous = if let Some(param) = Param::from_name(key) {
            params.insert(param, (key.as_str(), value))
        } else if let Some(group) = ParamGroup::from_name(key) {
            groups.insert(group, (key.as_str(), value))
        } else {
            return Err(ConfigError::UnknownParameter {
                section: section.to_string(),
                key: key.clone(),
            });
        };
        if let Some((other, _)) = previous {
            return Err(ConfigError::invalid(
                format!("{}.{}", section, key),
                format!("sets the same target as '{}'", other),
            ));
        }
    }

    for (group, (_, value)) in groups {
        for &param in group.params() {
            values[param as usize] = value;
        }
    }
    for (param, (_, value)) in params {
        values[param as usize] = value;
    }

    Ok(values)
}

/// Per-parameter output multiplier. Negative values invert a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityProfile {
    values: [f64; 7],
}

impl Default for SensitivityProfile {
    fn default() -> Self {
        Self {
            values: [DEFAULT_SENSITIVITY; 7],
        }
    }
}

impl SensitivityProfile {
    pub fn from_table(table: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        let profile = Self {
            values: resolve_table("sensitivity", table, DEFAULT_SENSITIVITY)?,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn with(mut self, param: Param, multiplier: f64) -> Result<Self, ConfigError> {
        self.values[param as usize] = multiplier;
        self.validate()?;
        Ok(self)
    }

    pub fn get(&self, param: Param) -> f64 {
        self.values[param as usize]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for param in Param::ALL {
            if !self.get(param).is_finite() {
                return Err(ConfigError::invalid(
                    format!("sensitivity.{}", param),
                    "multiplier must be finite",
                ));
            }
        }
        Ok(())
    }
}

/// Per-parameter magnitude below which output is forced to zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadzoneProfile {
    values: [f64; 7],
}

impl Default for DeadzoneProfile {
    fn default() -> Self {
        Self {
            values: [DEFAULT_DEADZONE; 7],
        }
    }
}

impl DeadzoneProfile {
    /// Profile with the same threshold everywhere
    pub fn uniform(threshold: f64) -> Result<Self, ConfigError> {
        let profile = Self {
            values: [threshold; 7],
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_table(table: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        let profile = Self {
            values: resolve_table("deadzone", table, DEFAULT_DEADZONE)?,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn with(mut self, param: Param, threshold: f64) -> Result<Self, ConfigError> {
        self.values[param as usize] = threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn get(&self, param: Param) -> f64 {
        self.values[param as usize]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for param in Param::ALL {
            let threshold = self.get(param);
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::invalid(
                    format!("deadzone.{}", param),
                    format!("threshold must be a finite value >= 0, got {}", threshold),
                ));
            }
        }
        Ok(())
    }
}

/// Sensitivity scaling followed by a hard deadzone cutoff
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterMapper {
    sensitivity: SensitivityProfile,
    deadzone: DeadzoneProfile,
}

impl ParameterMapper {
    pub fn new(sensitivity: SensitivityProfile, deadzone: DeadzoneProfile) -> Self {
        Self {
            sensitivity,
            deadzone,
        }
    }

    pub fn sensitivity(&self) -> &SensitivityProfile {
        &self.sensitivity
    }

    pub fn deadzone(&self) -> &DeadzoneProfile {
        &self.deadzone
    }

    /// Scale each parameter, then zero it if its magnitude is under the
    /// threshold. Values above the threshold pass through unscaled by the
    /// deadzone and unclamped.
    pub fn apply(&self, sample: &PoseSample) -> PoseSample {
        sample.map(|param, value| {
            let scaled = value * self.sensitivity.get(param);
            if scaled.abs() < self.deadzone.get(param) {
                0.0
            } else {
                scaled
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_alias_keys_conflict() {
        let result = SensitivityProfile::from_table(&table(&[("yaw", 2.0), ("head_yaw", 3.0)]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = DeadzoneProfile::from_table(&table(&[("head", 0.1), ("head_rotation", 0.2)]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        // a group and one of its parameters is an override, not a conflict
        let profile =
            SensitivityProfile::from_table(&table(&[("head", 2.0), ("yaw", 3.0)])).unwrap();
        assert_eq!(profile.get(Param::Yaw), 3.0);
        assert_eq!(profile.get(Param::Roll), 2.0);
    }

    #[test]
    fn test_sensitivity_then_deadzone() {
        let mapper = ParameterMapper::new(
            SensitivityProfile::default().with(Param::Yaw, 2.0).unwrap(),
            DeadzoneProfile::uniform(0.1).unwrap(),
        );

        let below = mapper.apply(&PoseSample::ZERO.with(Param::Yaw, 0.04));
        assert_eq!(below.yaw, 0.0);

        let above = mapper.apply(&PoseSample::ZERO.with(Param::Yaw, 0.06));
        assert!((above.yaw - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_deadzone_is_hard_cutoff() {
        let mapper = ParameterMapper::new(
            SensitivityProfile::default(),
            DeadzoneProfile::uniform(0.2).unwrap(),
        );
        let mapped = mapper.apply(&PoseSample::ZERO.with(Param::Pitch, -0.2));
        assert_eq!(mapped.pitch, -0.2);
        let mapped = mapper.apply(&PoseSample::ZERO.with(Param::Pitch, -0.19));
        assert_eq!(mapped.pitch, 0.0);
    }

    #[test]
    fn test_output_not_clamped() {
        let mapper = ParameterMapper::new(
            SensitivityProfile::default().with(Param::MouthOpen, 3.0).unwrap(),
            DeadzoneProfile::default(),
        );
        let mapped = mapper.apply(&PoseSample::ZERO.with(Param::MouthOpen, 0.5));
        assert!((mapped.mouth_open - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_sensitivity_inverts() {
        let mapper = ParameterMapper::new(
            SensitivityProfile::default().with(Param::Roll, -1.0).unwrap(),
            DeadzoneProfile::default(),
        );
        let mapped = mapper.apply(&PoseSample::ZERO.with(Param::Roll, 0.5));
        assert_eq!(mapped.roll, -0.5);
    }

    #[test]
    fn test_zeroed_value_is_stable() {
        let mapper = ParameterMapper::default();
        let once = mapper.apply(&PoseSample::splat(0.01));
        assert_eq!(once, PoseSample::ZERO);
        assert_eq!(mapper.apply(&once), once);
    }

    #[test]
    fn test_table_groups_then_params() {
        let sensitivity =
            SensitivityProfile::from_table(&table(&[("head", 2.0), ("yaw", 0.5), ("mouth", 1.2)]))
                .unwrap();
        assert_eq!(sensitivity.get(Param::Yaw), 0.5);
        assert_eq!(sensitivity.get(Param::Pitch), 2.0);
        assert_eq!(sensitivity.get(Param::Roll), 2.0);
        assert_eq!(sensitivity.get(Param::EyeLeft), DEFAULT_SENSITIVITY);
        assert_eq!(sensitivity.get(Param::MouthWide), 1.2);
    }

    #[test]
    fn test_table_rejects_bad_entries() {
        assert_eq!(
            DeadzoneProfile::from_table(&table(&[("nose", 0.1)])),
            Err(ConfigError::UnknownParameter {
                section: "deadzone".to_string(),
                key: "nose".to_string(),
            })
        );
        assert!(DeadzoneProfile::from_table(&table(&[("eye_left", -0.01)])).is_err());
        assert!(SensitivityProfile::from_table(&table(&[("pitch", f64::NAN)])).is_err());
        assert!(DeadzoneProfile::uniform(0.0).is_ok());
    }
}
