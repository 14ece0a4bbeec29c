//! Landmark frames produced by the external face-mesh detector
//!
//! Points follow the MediaPipe face-mesh convention: `x` and `y` are normalized
//! to the image width/height (origin top-left, `y` down) and `z` is depth on
//! roughly the same scale as `x`, smaller values being closer to the camera.

use glam::Vec3;

/// Number of points in a face-mesh frame (refined meshes carry 478; the extra
/// iris points are ignored)
pub const FACE_MESH_LANDMARKS: usize = 468;

/// Semantic face-mesh indices used for pose derivation
pub mod index {
    pub const NOSE_TIP: usize = 1;
    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;
    /// Cheek on the image-left side (the subject's right)
    pub const CHEEK_RIGHT: usize = 234;
    /// Cheek on the image-right side (the subject's left)
    pub const CHEEK_LEFT: usize = 454;

    /// Right eye contour: outer corner, two upper lid points, inner corner,
    /// two lower lid points (paired with the upper points in reverse order)
    pub const EYE_RIGHT: [usize; 6] = [33, 160, 158, 133, 153, 144];
    pub const EYE_LEFT: [usize; 6] = [362, 385, 387, 263, 373, 380];

    pub const LIP_UPPER_INNER: [usize; 3] = [13, 82, 312];
    pub const LIP_LOWER_INNER: [usize; 3] = [14, 87, 317];
    pub const MOUTH_CORNER_RIGHT: usize = 61;
    pub const MOUTH_CORNER_LEFT: usize = 291;
}

/// One detector result for one capture tick. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    sequence: u64,
    face_detected: bool,
    points: Vec<Vec3>,
}

impl LandmarkFrame {
    /// Frame with a detected face
    pub fn new(sequence: u64, points: Vec<Vec3>) -> Self {
        Self {
            sequence,
            face_detected: true,
            points,
        }
    }

    /// Frame for a tick where the detector found no face
    pub fn no_face(sequence: u64) -> Self {
        Self {
            sequence,
            face_detected: false,
            points: Vec::new(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn face_detected(&self) -> bool {
        self.face_detected
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).copied()
    }

    /// Whether every face-mesh index used for pose derivation is present
    pub fn has_full_mesh(&self) -> bool {
        self.points.len() >= FACE_MESH_LANDMARKS
    }
}
