//! Exponential smoothing of calibrated samples

use crate::error::ConfigError;
use crate::pose::{Param, ParamGroup, PoseSample};

/// Default weight of the previous output
pub const DEFAULT_ALPHA: f64 = 0.7;

/// Reject alphas the filter cannot run with: `1.0` would freeze the output
pub fn validate_alpha(field: &str, alpha: f64) -> Result<f64, ConfigError> {
    if !alpha.is_finite() || !(0.0..1.0).contains(&alpha) {
        return Err(ConfigError::invalid(
            field,
            format!("must be in [0, 1), got {}", alpha),
        ));
    }
    Ok(alpha)
}

/// Per-group smoothing strength (weight of history, higher is smoother)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingStrength {
    head: f64,
    eyes: f64,
    mouth: f64,
}

impl Default for SmoothingStrength {
    fn default() -> Self {
        Self {
            head: DEFAULT_ALPHA,
            eyes: DEFAULT_ALPHA,
            mouth: DEFAULT_ALPHA,
        }
    }
}

impl SmoothingStrength {
    /// Same alpha for every parameter
    pub fn uniform(alpha: f64) -> Result<Self, ConfigError> {
        let alpha = validate_alpha("smoothing.alpha", alpha)?;
        Ok(Self {
            head: alpha,
            eyes: alpha,
            mouth: alpha,
        })
    }

    pub fn per_group(head: f64, eyes: f64, mouth: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            head: validate_alpha("smoothing.head_alpha", head)?,
            eyes: validate_alpha("smoothing.eyes_alpha", eyes)?,
            mouth: validate_alpha("smoothing.mouth_alpha", mouth)?,
        })
    }

    pub fn group(&self, group: ParamGroup) -> f64 {
        match group {
            ParamGroup::Head => self.head,
            ParamGroup::Eyes => self.eyes,
            ParamGroup::Mouth => self.mouth,
        }
    }

    pub fn alpha(&self, param: Param) -> f64 {
        self.group(param.group())
    }
}

/// Per-parameter exponential moving average over its own previous output
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    last: Option<PoseSample>,
}

impl Smoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// `smoothed = alpha * previous + (1 - alpha) * sample`; the first call
    /// seeds `previous` with the sample itself, non-finite components as 0
    pub fn apply(&mut self, sample: &PoseSample, strength: &SmoothingStrength) -> PoseSample {
        let smoothed = match self.last {
            None => sample.map(|_, value| if value.is_finite() { value } else { 0.0 }),
            Some(previous) => previous.zip_with(*sample, |param, prev, value| {
                if !value.is_finite() {
                    return prev;
                }
                let alpha = strength.alpha(param);
                alpha * prev + (1.0 - alpha) * value
            }),
        };
        self.last = Some(smoothed);
        smoothed
    }

    /// Last smoothed output
    pub fn last(&self) -> Option<PoseSample> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut smoother = Smoother::new();
        let sample = PoseSample::splat(0.4);
        assert_eq!(smoother.apply(&sample, &SmoothingStrength::default()), sample);
        assert_eq!(smoother.last(), Some(sample));
    }

    #[test]
    fn test_history_weight() {
        let strength = SmoothingStrength::uniform(0.7).unwrap();
        let mut smoother = Smoother::new();
        smoother.apply(&PoseSample::ZERO, &strength);

        let smoothed = smoother.apply(&PoseSample::ZERO.with(Param::Yaw, 1.0), &strength);
        assert!((smoothed.yaw - 0.3).abs() < 1e-12);
        assert_eq!(smoothed.pitch, 0.0);

        // previous is the smoothed output, not the raw input
        let smoothed = smoother.apply(&PoseSample::ZERO.with(Param::Yaw, 1.0), &strength);
        assert!((smoothed.yaw - 0.51).abs() < 1e-12);
    }

    #[test]
    fn test_zero_alpha_follows_input() {
        let strength = SmoothingStrength::uniform(0.0).unwrap();
        let mut smoother = Smoother::new();
        smoother.apply(&PoseSample::ZERO, &strength);
        let sample = PoseSample::splat(0.9);
        assert_eq!(smoother.apply(&sample, &strength), sample);
    }

    #[test]
    fn test_per_group_alpha() {
        let strength = SmoothingStrength::per_group(0.5, 0.0, 0.9).unwrap();
        let mut smoother = Smoother::new();
        smoother.apply(&PoseSample::ZERO, &strength);

        let smoothed = smoother.apply(&PoseSample::splat(1.0), &strength);
        assert!((smoothed.roll - 0.5).abs() < 1e-12);
        assert!((smoothed.eye_right - 1.0).abs() < 1e-12);
        assert!((smoothed.mouth_wide - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_input_holds_previous() {
        let strength = SmoothingStrength::default();
        let mut smoother = Smoother::new();
        smoother.apply(&PoseSample::splat(0.2), &strength);

        let glitch = PoseSample::splat(0.2).with(Param::Yaw, f64::NAN);
        let smoothed = smoother.apply(&glitch, &strength);
        assert_eq!(smoothed.yaw, 0.2);
        assert!(smoothed.is_finite());
    }

    #[test]
    fn test_non_finite_first_sample_seeds_neutral() {
        let strength = SmoothingStrength::uniform(0.5).unwrap();
        let mut smoother = Smoother::new();

        let first = PoseSample::splat(0.4).with(Param::Pitch, f64::NAN);
        let seeded = smoother.apply(&first, &strength);
        assert_eq!(seeded.pitch, 0.0);
        assert_eq!(seeded.yaw, 0.4);

        let next = smoother.apply(&PoseSample::splat(0.4), &strength);
        assert!(next.is_finite());
        assert!((next.pitch - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_reset_reseeds() {
        let strength = SmoothingStrength::default();
        let mut smoother = Smoother::new();
        smoother.apply(&PoseSample::splat(0.8), &strength);
        smoother.reset();
        assert_eq!(smoother.last(), None);

        let sample = PoseSample::splat(-0.3);
        assert_eq!(smoother.apply(&sample, &strength), sample);
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        assert!(SmoothingStrength::uniform(1.0).is_err());
        assert!(SmoothingStrength::uniform(-0.1).is_err());
        assert!(SmoothingStrength::uniform(f64::NAN).is_err());
        assert!(SmoothingStrength::per_group(0.5, 0.5, 1.2).is_err());
        assert!(SmoothingStrength::uniform(0.99).is_ok());
    }
}
