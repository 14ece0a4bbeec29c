//! Neutral-pose calibration
//!
//! A calibration session averages a fixed number of face-detected samples and
//! commits the mean as the offset subtracted from every later sample.

use std::fmt;

use tracing::{debug, info};

use crate::pose::PoseSample;

/// Samples averaged by one calibration session unless configured otherwise
pub const DEFAULT_REQUIRED_SAMPLES: usize = 30;

/// Calibration session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Collecting,
    Committed,
}

/// Calibration state with collection progress, for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    Idle,
    Collecting { collected: usize, required: usize },
    Committed,
}

/// Reason a calibration call was ignored. Misuse is reported, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationNotice {
    /// No calibration session is collecting
    NotCollecting,
    /// Sample came from a frame without a detected face
    NoFace,
    /// Commit requested before any valid sample was collected
    NoSamples,
}

impl fmt::Display for CalibrationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCollecting => f.write_str("calibration is not collecting"),
            Self::NoFace => f.write_str("sample without a detected face"),
            Self::NoSamples => f.write_str("no calibration samples collected"),
        }
    }
}

/// Result of offering one sample to the calibrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectOutcome {
    Ignored(CalibrationNotice),
    /// Sample accumulated; threshold not reached yet
    Collected { collected: usize, required: usize },
    /// Threshold reached; waiting for an explicit commit
    Ready { collected: usize },
    /// Threshold reached and the mean was committed automatically
    Committed(PoseSample),
}

impl CollectOutcome {
    /// Whether enough samples have been collected
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Committed(_))
    }
}

/// Learns and applies the neutral-pose offset
#[derive(Debug, Clone)]
pub struct Calibrator {
    required_samples: usize,
    auto_commit: bool,
    state: CalibrationState,
    offset: Option<PoseSample>,
    /// Running sum of the current session; memory stays constant per session
    sum: PoseSample,
    count: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_SAMPLES)
    }
}

impl Calibrator {
    pub fn new(required_samples: usize) -> Self {
        Self {
            required_samples: required_samples.max(1),
            auto_commit: true,
            state: CalibrationState::Idle,
            offset: None,
            sum: PoseSample::ZERO,
            count: 0,
        }
    }

    /// Commit automatically once the threshold is reached (default: on)
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn status(&self) -> CalibrationStatus {
        match self.state {
            CalibrationState::Idle => CalibrationStatus::Idle,
            CalibrationState::Collecting => CalibrationStatus::Collecting {
                collected: self.count,
                required: self.required_samples,
            },
            CalibrationState::Committed => CalibrationStatus::Committed,
        }
    }

    /// Collection progress in percent
    pub fn progress(&self) -> f64 {
        match self.state {
            CalibrationState::Idle => 0.0,
            CalibrationState::Collecting => {
                (self.count as f64 / self.required_samples as f64 * 100.0).min(100.0)
            }
            CalibrationState::Committed => 100.0,
        }
    }

    pub fn required_samples(&self) -> usize {
        self.required_samples
    }

    /// Committed neutral pose, if any
    pub fn offset(&self) -> Option<PoseSample> {
        self.offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.state == CalibrationState::Committed
    }

    /// Begin a new session, discarding any in-progress accumulation.
    /// A previously committed offset stays in effect until the new commit.
    pub fn start_calibration(&mut self) {
        self.sum = PoseSample::ZERO;
        self.count = 0;
        self.state = CalibrationState::Collecting;
        info!(
            "Calibration started, collecting {} samples",
            self.required_samples
        );
    }

    pub fn collect_calibration_sample(
        &mut self,
        sample: &PoseSample,
        face_detected: bool,
    ) -> CollectOutcome {
        if self.state != CalibrationState::Collecting {
            return CollectOutcome::Ignored(CalibrationNotice::NotCollecting);
        }
        if !face_detected || !sample.is_finite() {
            return CollectOutcome::Ignored(CalibrationNotice::NoFace);
        }

        self.sum = self.sum + *sample;
        self.count += 1;
        debug!(
            "Calibration sample {}/{}",
            self.count, self.required_samples
        );

        if self.count < self.required_samples {
            return CollectOutcome::Collected {
                collected: self.count,
                required: self.required_samples,
            };
        }

        if self.auto_commit {
            match self.commit() {
                Ok(offset) => CollectOutcome::Committed(offset),
                Err(notice) => CollectOutcome::Ignored(notice),
            }
        } else {
            CollectOutcome::Ready {
                collected: self.count,
            }
        }
    }

    /// Commit the mean of the collected samples as the new offset.
    ///
    /// Allowed before the threshold as long as at least one sample was
    /// collected.
    pub fn commit(&mut self) -> Result<PoseSample, CalibrationNotice> {
        if self.state != CalibrationState::Collecting {
            return Err(CalibrationNotice::NotCollecting);
        }
        if self.count == 0 {
            return Err(CalibrationNotice::NoSamples);
        }

        let offset = self.sum / self.count as f64;
        self.offset = Some(offset);
        self.state = CalibrationState::Committed;
        self.sum = PoseSample::ZERO;
        info!(
            "Calibration committed from {} samples: yaw={:.3} pitch={:.3} roll={:.3}",
            self.count, offset.yaw, offset.pitch, offset.roll
        );
        self.count = 0;

        Ok(offset)
    }

    /// Subtract the committed offset; identity when there is none
    pub fn apply(&self, sample: &PoseSample) -> PoseSample {
        match self.offset {
            Some(offset) => (*sample - offset).clamped(),
            None => *sample,
        }
    }

    /// Back to Idle with no offset
    pub fn reset(&mut self) {
        self.state = CalibrationState::Idle;
        self.offset = None;
        self.sum = PoseSample::ZERO;
        self.count = 0;
        info!("Calibration reset");
    }
}
