//! Per-tick transformation pipeline
//!
//! calibration -> smoothing -> precision -> sensitivity/deadzone. The
//! operator-tunable part is held in an immutable [`Tuning`] snapshot so one
//! tick always sees one consistent set of profiles.

pub mod calibration;
pub mod mapping;
pub mod precision;
pub mod smoothing;

pub use calibration::{
    CalibrationNotice, CalibrationState, CalibrationStatus, Calibrator, CollectOutcome,
};
pub use mapping::{DeadzoneProfile, ParameterMapper, SensitivityProfile};
pub use precision::{PrecisionAdjuster, PrecisionSettings};
pub use smoothing::{Smoother, SmoothingStrength};

use tracing::debug;

use crate::config::Config;
use crate::error::ConfigError;
use crate::output::OutputFrame;
use crate::pose::{LandmarkFrame, PoseEstimator, PoseSample};

/// Operator-tunable profiles, swapped as a whole between ticks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tuning {
    pub smoothing: SmoothingStrength,
    pub precision: PrecisionAdjuster,
    pub mapper: ParameterMapper,
}

impl Tuning {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let smoothing = &config.smoothing;
        let smoothing = SmoothingStrength::per_group(
            smoothing.head_alpha.unwrap_or(smoothing.alpha),
            smoothing.eyes_alpha.unwrap_or(smoothing.alpha),
            smoothing.mouth_alpha.unwrap_or(smoothing.alpha),
        )?;

        Ok(Self {
            smoothing,
            precision: PrecisionAdjuster::new(config.precision)?,
            mapper: ParameterMapper::new(
                SensitivityProfile::from_table(&config.sensitivity)?,
                DeadzoneProfile::from_table(&config.deadzone)?,
            ),
        })
    }
}

/// Stateful part of the pipeline: calibration offset, smoothing history and
/// the last precision output. Each instance is independent; nothing is shared
/// between sessions.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    estimator: PoseEstimator,
    calibrator: Calibrator,
    smoother: Smoother,
    last_precise: Option<PoseSample>,
}

impl Pipeline {
    pub fn new(estimator: PoseEstimator, calibrator: Calibrator) -> Self {
        Self {
            estimator,
            calibrator,
            smoother: Smoother::new(),
            last_precise: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PoseEstimator::for_frame_size(config.capture.frame_width, config.capture.frame_height),
            Calibrator::new(config.calibration.required_samples)
                .with_auto_commit(config.calibration.auto_commit),
        )
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut Calibrator {
        &mut self.calibrator
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn reset_smoothing(&mut self) {
        self.smoother.reset();
        self.last_precise = None;
    }

    /// Run one tick for a landmark frame
    pub fn process(&mut self, frame: &LandmarkFrame, tuning: &Tuning) -> OutputFrame {
        let sample = self.estimator.estimate(frame);
        if frame.face_detected() && sample.is_none() {
            debug!(
                "Frame {} has a face but no usable pose ({} points)",
                frame.sequence(),
                frame.points().len()
            );
        }
        self.process_sample(sample, frame.sequence(), tuning)
    }

    /// Run one tick for an already derived sample; `None` is a no-face tick
    /// and repeats the last smoothed value
    pub fn process_sample(
        &mut self,
        sample: Option<PoseSample>,
        sequence: u64,
        tuning: &Tuning,
    ) -> OutputFrame {
        let face_detected = sample.is_some();

        let smoothed = match sample {
            Some(raw) => {
                if self.calibrator.state() == CalibrationState::Collecting {
                    let outcome = self.calibrator.collect_calibration_sample(&raw, true);
                    if let CollectOutcome::Ignored(notice) = outcome {
                        debug!("Calibration sample ignored: {}", notice);
                    }
                }
                let calibrated = self.calibrator.apply(&raw);
                self.smoother.apply(&calibrated, &tuning.smoothing)
            }
            None => self.smoother.last().unwrap_or(PoseSample::ZERO),
        };

        let adjusted = tuning.precision.apply(&smoothed);
        let adjusted = tuning
            .precision
            .reduce_noise(&adjusted, self.last_precise.as_ref());
        self.last_precise = tuning.precision.is_enabled().then_some(adjusted);
        let params = tuning.mapper.apply(&adjusted);

        OutputFrame::new(sequence, params, face_detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Param;

    fn tuning_without_deadzone(alpha: f64) -> Tuning {
        Tuning {
            smoothing: SmoothingStrength::uniform(alpha).unwrap(),
            mapper: ParameterMapper::new(
                SensitivityProfile::default(),
                DeadzoneProfile::uniform(0.0).unwrap(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_face_repeats_last_smoothed() {
        let tuning = tuning_without_deadzone(0.5);
        let mut pipeline = Pipeline::default();

        let first = pipeline.process_sample(Some(PoseSample::splat(0.4)), 1, &tuning);
        assert!(first.face_detected());

        let gap = pipeline.process_sample(None, 2, &tuning);
        assert!(!gap.face_detected());
        assert_eq!(gap.params(), first.params());
        assert_eq!(gap.sequence(), 2);

        let gap = pipeline.process_sample(None, 3, &tuning);
        assert_eq!(gap.params(), first.params());
    }

    #[test]
    fn test_no_face_before_any_sample_is_neutral() {
        let mut pipeline = Pipeline::default();
        let frame = pipeline.process(&LandmarkFrame::no_face(1), &Tuning::default());
        assert_eq!(frame.params(), &PoseSample::ZERO);
        assert!(!frame.face_detected());
    }

    #[test]
    fn test_calibration_runs_inside_pipeline() {
        let tuning = tuning_without_deadzone(0.0);
        let mut pipeline = Pipeline::new(PoseEstimator::default(), Calibrator::new(2));
        pipeline.calibrator_mut().start_calibration();

        let neutral = PoseSample::ZERO.with(Param::Yaw, 0.2);
        pipeline.process_sample(Some(neutral), 1, &tuning);
        pipeline.process_sample(None, 2, &tuning);
        let out = pipeline.process_sample(Some(neutral), 3, &tuning);

        assert!(pipeline.calibrator().is_calibrated());
        assert!(out.params().yaw.abs() < 1e-12);
    }

    #[test]
    fn test_stage_order() {
        let tuning = Tuning {
            smoothing: SmoothingStrength::uniform(0.0).unwrap(),
            precision: PrecisionAdjuster::new(PrecisionSettings {
                enabled: true,
                multiplier: 2.0,
                ..Default::default()
            })
            .unwrap(),
            mapper: ParameterMapper::new(
                SensitivityProfile::default().with(Param::Yaw, 3.0).unwrap(),
                DeadzoneProfile::uniform(0.1).unwrap(),
            ),
        };
        let mut pipeline = Pipeline::default();

        // 0.6 * 2 clamps to 1.0 before sensitivity scales it to 3.0
        let out = pipeline.process_sample(Some(PoseSample::ZERO.with(Param::Yaw, 0.6)), 1, &tuning);
        assert!((out.params().yaw - 3.0).abs() < 1e-12);

        // 0.01 * 2 * 3 = 0.06 < 0.1
        let small = PoseSample::ZERO.with(Param::Yaw, 0.01);
        let out = pipeline.process_sample(Some(small), 2, &tuning);
        assert_eq!(out.params().yaw, 0.0);
    }

    #[test]
    fn test_precision_noise_gate_across_ticks() {
        let tuning = Tuning {
            precision: PrecisionAdjuster::new(PrecisionSettings {
                enabled: true,
                multiplier: 1.0,
                noise_threshold: 0.05,
                ..Default::default()
            })
            .unwrap(),
            ..tuning_without_deadzone(0.0)
        };
        let roll = |value| Some(PoseSample::ZERO.with(Param::Roll, value));
        let mut pipeline = Pipeline::default();

        pipeline.process_sample(roll(0.3), 1, &tuning);
        let out = pipeline.process_sample(roll(0.33), 2, &tuning);
        assert_eq!(out.params().roll, 0.3);

        let out = pipeline.process_sample(roll(0.4), 3, &tuning);
        assert!((out.params().roll - 0.4).abs() < 1e-12);

        // a smoothing reset forgets the held output too
        pipeline.reset_smoothing();
        let out = pipeline.process_sample(roll(0.42), 4, &tuning);
        assert!((out.params().roll - 0.42).abs() < 1e-12);
    }

    #[test]
    fn test_independent_pipelines() {
        let tuning = tuning_without_deadzone(0.7);
        let mut a = Pipeline::default();
        let mut b = Pipeline::default();
        a.process_sample(Some(PoseSample::splat(0.9)), 1, &tuning);

        let out = b.process_sample(Some(PoseSample::splat(0.1)), 1, &tuning);
        assert_eq!(out.params(), &PoseSample::splat(0.1));
    }

    #[test]
    fn test_tuning_from_default_config() {
        let tuning = Tuning::from_config(&Config::default()).unwrap();
        assert_eq!(tuning.smoothing, SmoothingStrength::default());
        assert!(!tuning.precision.is_enabled());
        assert_eq!(tuning.mapper.deadzone().get(Param::Roll), mapping::DEFAULT_DEADZONE);
    }
}
