//! Feature - a single observation of a map Point from one camera Frame.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;

use super::types::{FeatureId, FrameId, PointId};

/// One observation tying a Point to the Frame that saw it.
///
/// The capture pose and the level-0 image are stored by value / shared
/// handle so the observation stays usable after the Frame itself is gone.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: FeatureId,

    /// The Point this feature observes.
    pub point: PointId,

    /// The Frame this feature was extracted in.
    pub frame_id: FrameId,

    /// Pixel position on pyramid level 0.
    pub px: Vector2<f64>,

    /// Unit bearing vector in the camera frame at capture time.
    pub f: Vector3<f64>,

    /// World-to-camera pose of the capture frame.
    pub pose_cw: SE3,

    /// Pyramid level the feature was extracted on.
    pub level: usize,

    /// Shi-Tomasi score at extraction time.
    pub score: f64,

    /// Level-0 image of the capture frame, used as warp reference.
    pub img: Arc<GrayImage>,
}

impl Feature {
    /// Camera centre of the capture frame, in world coordinates.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.pose_cw.inverse().translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_camera_center_inverts_pose() {
        let pose_cw = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, 0.0, -0.2),
            translation: Vector3::new(1.0, -2.0, 0.5),
        };
        let ftr = Feature {
            id: FeatureId::new(0),
            point: PointId::new(0),
            frame_id: FrameId(0),
            px: Vector2::zeros(),
            f: Vector3::z(),
            pose_cw: pose_cw.clone(),
            level: 0,
            score: 0.0,
            img: Arc::new(GrayImage::new(1, 1)),
        };
        // The camera centre maps to the origin of the camera frame.
        let origin = pose_cw.transform_point(&ftr.camera_center());
        assert_relative_eq!(origin, Vector3::zeros(), epsilon = 1e-12);
    }
}
