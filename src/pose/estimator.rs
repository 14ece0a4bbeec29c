//! Landmark frame to pose sample derivation
//!
//! Head rotation is recovered from a face-aligned basis (cheek-to-cheek axis and
//! chin-to-forehead axis), eye closure from the eye aspect ratio, and mouth
//! shape from lip gap and mouth corner distance.

use glam::{Vec2, Vec3};

use super::landmarks::{index, LandmarkFrame};
use super::sample::PoseSample;

/// Head rotation (degrees) that maps to a normalized value of ±1
pub const HEAD_ANGLE_RANGE_DEG: f32 = 30.0;

/// Eye aspect ratio of a fully open eye
const EAR_OPEN: f32 = 0.3;
/// EAR drop from open to fully closed
const EAR_CLOSING_RANGE: f32 = 0.15;

/// Lip gap (normalized image units) below which the mouth reads as closed
const MOUTH_OPEN_MIN: f32 = 0.02;
const MOUTH_OPEN_RANGE: f32 = 0.06;

/// Neutral mouth corner distance (normalized image units)
const MOUTH_WIDE_MIN: f32 = 0.1;
const MOUTH_WIDE_RANGE: f32 = 0.1;

/// Derives a [`PoseSample`] from a face-mesh [`LandmarkFrame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimator {
    /// Frame width / height, used to undo the per-axis normalization of `x`
    aspect: f32,
}

impl Default for PoseEstimator {
    fn default() -> Self {
        Self::for_frame_size(640, 480)
    }
}

impl PoseEstimator {
    pub fn new(aspect: f32) -> Self {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        Self { aspect }
    }

    pub fn for_frame_size(width: u32, height: u32) -> Self {
        if height == 0 {
            return Self::new(1.0);
        }
        Self::new(width as f32 / height as f32)
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Estimate the pose for one frame.
    ///
    /// Returns `None` when no face was detected, the mesh is incomplete, or the
    /// geometry is degenerate; callers treat all three as a no-face tick.
    pub fn estimate(&self, frame: &LandmarkFrame) -> Option<PoseSample> {
        if !frame.face_detected() || !frame.has_full_mesh() {
            return None;
        }

        let (yaw, pitch, roll) = self.head_rotation(frame)?;
        let sample = PoseSample {
            yaw: normalize_angle(yaw),
            pitch: normalize_angle(pitch),
            roll: normalize_angle(roll),
            eye_left: self.eye_closure(frame, &index::EYE_LEFT)?,
            eye_right: self.eye_closure(frame, &index::EYE_RIGHT)?,
            mouth_open: mouth_open(frame)?,
            mouth_wide: mouth_wide(frame)?,
        };

        if sample.is_finite() {
            Some(sample.clamped())
        } else {
            None
        }
    }

    /// Point in a right-handed, y-up space with `x` and `y` on the same scale
    fn head_space(&self, frame: &LandmarkFrame, i: usize) -> Option<Vec3> {
        frame
            .point(i)
            .map(|p| Vec3::new(p.x * self.aspect, -p.y, -p.z))
    }

    fn image_space(&self, frame: &LandmarkFrame, i: usize) -> Option<Vec2> {
        frame.point(i).map(|p| Vec2::new(p.x * self.aspect, p.y))
    }

    /// (yaw, pitch, roll) in degrees
    fn head_rotation(&self, frame: &LandmarkFrame) -> Option<(f32, f32, f32)> {
        let right = (self.head_space(frame, index::CHEEK_LEFT)?
            - self.head_space(frame, index::CHEEK_RIGHT)?)
        .normalize_or_zero();
        let up_raw =
            self.head_space(frame, index::FOREHEAD)? - self.head_space(frame, index::CHIN)?;
        let up = (up_raw - right * up_raw.dot(right)).normalize_or_zero();

        if right == Vec3::ZERO || up == Vec3::ZERO {
            return None;
        }

        let forward = right.cross(up);
        let yaw = forward.x.atan2(forward.z);
        let pitch = forward.y.clamp(-1.0, 1.0).asin();
        let roll = right.y.atan2(right.x);

        Some((yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees()))
    }

    fn eye_closure(&self, frame: &LandmarkFrame, eye: &[usize; 6]) -> Option<f64> {
        let mut p = [Vec2::ZERO; 6];
        for (slot, &i) in p.iter_mut().zip(eye.iter()) {
            *slot = self.image_space(frame, i)?;
        }

        let width = p[0].distance(p[3]);
        if width <= f32::EPSILON {
            return Some(0.0);
        }
        let ear = (p[1].distance(p[5]) + p[2].distance(p[4])) / (2.0 * width);
        Some(((EAR_OPEN - ear) / EAR_CLOSING_RANGE).clamp(0.0, 1.0) as f64)
    }
}

fn normalize_angle(degrees: f32) -> f64 {
    (degrees.clamp(-HEAD_ANGLE_RANGE_DEG, HEAD_ANGLE_RANGE_DEG) / HEAD_ANGLE_RANGE_DEG) as f64
}

fn mouth_open(frame: &LandmarkFrame) -> Option<f64> {
    let mut gap = 0.0;
    for (&upper, &lower) in index::LIP_UPPER_INNER
        .iter()
        .zip(index::LIP_LOWER_INNER.iter())
    {
        gap += (frame.point(upper)?.y - frame.point(lower)?.y).abs();
    }
    gap /= index::LIP_UPPER_INNER.len() as f32;

    Some(((gap - MOUTH_OPEN_MIN) / MOUTH_OPEN_RANGE).clamp(0.0, 1.0) as f64)
}

fn mouth_wide(frame: &LandmarkFrame) -> Option<f64> {
    let left = frame.point(index::MOUTH_CORNER_LEFT)?;
    let right = frame.point(index::MOUTH_CORNER_RIGHT)?;
    let distance = Vec2::new(left.x, left.y).distance(Vec2::new(right.x, right.y));

    Some(((distance - MOUTH_WIDE_MIN) / MOUTH_WIDE_RANGE).clamp(0.0, 1.0) as f64)
}
