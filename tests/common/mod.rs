//! Synthetic face-mesh frames for integration tests
#![allow(dead_code)]

use facerig::pose::landmarks::{index, FACE_MESH_LANDMARKS};
use facerig::LandmarkFrame;
use glam::{EulerRot, Quat, Vec3};

/// Face shape parameters in head space (y up, z toward the camera)
#[derive(Debug, Clone, Copy)]
pub struct SyntheticFace {
    pub yaw_deg: f32,
    pub pitch_deg: f32,
    pub roll_deg: f32,
    /// Upper/lower eyelid gap; 0.009 is a fully open eye
    pub eye_gap: f32,
    /// Inner lip gap; 0.02 or less reads as closed
    pub lip_gap: f32,
    /// Mouth corner distance; 0.1 or less reads as neutral width
    pub mouth_width: f32,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            eye_gap: 0.009,
            lip_gap: 0.0,
            mouth_width: 0.1,
        }
    }
}

impl SyntheticFace {
    pub fn looking(yaw_deg: f32, pitch_deg: f32) -> Self {
        Self {
            yaw_deg,
            pitch_deg,
            ..Default::default()
        }
    }

    /// Project into detector coordinates for a square (aspect 1.0) frame
    pub fn frame(&self, sequence: u64) -> LandmarkFrame {
        let rotation = Quat::from_euler(
            EulerRot::YXZ,
            self.yaw_deg.to_radians(),
            -self.pitch_deg.to_radians(),
            self.roll_deg.to_radians(),
        );
        let points = self
            .head_points()
            .into_iter()
            .map(|p| {
                let r = rotation * p;
                Vec3::new(0.5 + r.x, 0.5 - r.y, -r.z)
            })
            .collect();
        LandmarkFrame::new(sequence, points)
    }

    fn head_points(&self) -> Vec<Vec3> {
        let mut pts = vec![Vec3::ZERO; FACE_MESH_LANDMARKS];
        pts[index::NOSE_TIP] = Vec3::new(0.0, 0.0, 0.05);
        pts[index::FOREHEAD] = Vec3::new(0.0, 0.12, 0.0);
        pts[index::CHIN] = Vec3::new(0.0, -0.12, 0.0);
        pts[index::CHEEK_RIGHT] = Vec3::new(-0.08, 0.0, 0.0);
        pts[index::CHEEK_LEFT] = Vec3::new(0.08, 0.0, 0.0);

        for (eye, cx) in [(index::EYE_RIGHT, -0.04), (index::EYE_LEFT, 0.04)] {
            let (cy, half_gap) = (0.04, self.eye_gap / 2.0);
            pts[eye[0]] = Vec3::new(cx - 0.015, cy, 0.0);
            pts[eye[3]] = Vec3::new(cx + 0.015, cy, 0.0);
            pts[eye[1]] = Vec3::new(cx - 0.005, cy + half_gap, 0.0);
            pts[eye[2]] = Vec3::new(cx + 0.005, cy + half_gap, 0.0);
            pts[eye[4]] = Vec3::new(cx + 0.005, cy - half_gap, 0.0);
            pts[eye[5]] = Vec3::new(cx - 0.005, cy - half_gap, 0.0);
        }

        for (k, (&upper, &lower)) in index::LIP_UPPER_INNER
            .iter()
            .zip(index::LIP_LOWER_INNER.iter())
            .enumerate()
        {
            let x = (k as f32 - 1.0) * 0.01;
            pts[upper] = Vec3::new(x, -0.05, 0.0);
            pts[lower] = Vec3::new(x, -0.05 - self.lip_gap, 0.0);
        }

        pts[index::MOUTH_CORNER_RIGHT] = Vec3::new(-self.mouth_width / 2.0, -0.05, 0.0);
        pts[index::MOUTH_CORNER_LEFT] = Vec3::new(self.mouth_width / 2.0, -0.05, 0.0);
        pts
    }
}
