//! Point - a 3D landmark promoted from the LiDAR cloud, observed by a
//! bounded history of camera views.

use nalgebra::Vector3;

use super::feature::Feature;
use super::types::{FeatureId, PointId};

/// Maximum number of retained observations per point.
pub const MAX_OBS: usize = 20;

/// Observations farther than 60° from the current bearing are useless as
/// warp references.
const MIN_VIEW_COS: f64 = 0.5;

/// A 3D map point with its multi-view observation history.
///
/// The world position is fixed at creation. `value` holds the most recent
/// Shi-Tomasi score measured on this point's projection.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: PointId,

    /// 3D position in the world frame. Fixed once assigned.
    pub pos: Vector3<f64>,

    /// Latest corner score at creation or observation time.
    pub value: f64,

    /// Observation history, oldest first. Every feature's `point` refers
    /// back to this point; length stays ≤ `MAX_OBS`.
    pub obs: Vec<Feature>,
}

impl Point {
    pub fn new(id: PointId, pos: Vector3<f64>) -> Self {
        Self {
            id,
            pos,
            value: 0.0,
            obs: Vec::new(),
        }
    }

    /// Attach a new observation.
    pub fn add_observation(&mut self, ftr: Feature) {
        debug_assert_eq!(ftr.point, self.id);
        self.obs.push(ftr);
    }

    /// Detach and return the observation with the given id.
    pub fn remove_observation(&mut self, id: FeatureId) -> Option<Feature> {
        let idx = self.obs.iter().position(|ftr| ftr.id == id)?;
        Some(self.obs.remove(idx))
    }

    /// The most recently attached observation.
    pub fn last_observation(&self) -> Option<&Feature> {
        self.obs.last()
    }

    pub fn num_observations(&self) -> usize {
        self.obs.len()
    }

    /// The observation whose capture bearing is closest to the bearing from
    /// `frame_pos`, provided the angle between them stays below 60°.
    pub fn close_view_obs(&self, frame_pos: &Vector3<f64>) -> Option<&Feature> {
        let obs_dir = (frame_pos - self.pos).normalize();
        let mut best: Option<&Feature> = None;
        let mut best_cos = 0.0;
        for ftr in &self.obs {
            let dir = (ftr.camera_center() - self.pos).normalize();
            let cos_angle = obs_dir.dot(&dir);
            if cos_angle > best_cos {
                best_cos = cos_angle;
                best = Some(ftr);
            }
        }
        if best_cos < MIN_VIEW_COS {
            return None;
        }
        best
    }

    /// The observation whose capture bearing differs most from the bearing
    /// from `frame_pos`; the eviction candidate when the history saturates.
    pub fn furthest_view_obs(&self, frame_pos: &Vector3<f64>) -> Option<&Feature> {
        let obs_dir = (frame_pos - self.pos).normalize();
        let mut worst: Option<&Feature> = None;
        let mut worst_cos = f64::INFINITY;
        for ftr in &self.obs {
            let dir = (ftr.camera_center() - self.pos).normalize();
            let cos_angle = obs_dir.dot(&dir);
            if cos_angle < worst_cos {
                worst_cos = cos_angle;
                worst = Some(ftr);
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::GrayImage;
    use nalgebra::{UnitQuaternion, Vector2};

    use crate::geometry::SE3;
    use crate::map::types::FrameId;

    use super::*;

    /// Observation of the origin from a camera at `center`, looking back at
    /// the point.
    fn obs_from(point: PointId, id: u64, center: Vector3<f64>) -> Feature {
        let pose_wc = SE3 {
            rotation: UnitQuaternion::identity(),
            translation: center,
        };
        Feature {
            id: FeatureId::new(id),
            point,
            frame_id: FrameId(id),
            px: Vector2::new(100.0, 100.0),
            f: Vector3::z(),
            pose_cw: pose_wc.inverse(),
            level: 0,
            score: 10.0,
            img: Arc::new(GrayImage::new(1, 1)),
        }
    }

    #[test]
    fn test_close_view_picks_smallest_angle() {
        let id = PointId::new(0);
        let mut pt = Point::new(id, Vector3::zeros());
        pt.add_observation(obs_from(id, 0, Vector3::new(0.0, 0.0, -2.0)));
        pt.add_observation(obs_from(id, 1, Vector3::new(1.0, 0.0, -2.0)));
        pt.add_observation(obs_from(id, 2, Vector3::new(2.0, 0.0, -2.0)));

        let best = pt
            .close_view_obs(&Vector3::new(0.9, 0.0, -2.0))
            .expect("view within 60 degrees");
        assert_eq!(best.id, FeatureId::new(1));
    }

    #[test]
    fn test_close_view_rejects_beyond_60_degrees() {
        let id = PointId::new(0);
        let mut pt = Point::new(id, Vector3::zeros());
        // Single observation along -z; query bearing at ~90° from it.
        pt.add_observation(obs_from(id, 0, Vector3::new(0.0, 0.0, -2.0)));
        assert!(pt.close_view_obs(&Vector3::new(2.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_furthest_view_picks_largest_angle() {
        let id = PointId::new(0);
        let mut pt = Point::new(id, Vector3::zeros());
        pt.add_observation(obs_from(id, 0, Vector3::new(0.0, 0.0, -2.0)));
        pt.add_observation(obs_from(id, 1, Vector3::new(2.0, 0.0, -1.0)));

        let worst = pt
            .furthest_view_obs(&Vector3::new(0.0, 0.0, -3.0))
            .unwrap();
        assert_eq!(worst.id, FeatureId::new(1));
    }

    #[test]
    fn test_remove_observation() {
        let id = PointId::new(0);
        let mut pt = Point::new(id, Vector3::zeros());
        pt.add_observation(obs_from(id, 0, Vector3::new(0.0, 0.0, -2.0)));
        pt.add_observation(obs_from(id, 1, Vector3::new(1.0, 0.0, -2.0)));

        let removed = pt.remove_observation(FeatureId::new(0)).unwrap();
        assert_eq!(removed.id, FeatureId::new(0));
        assert_eq!(pt.num_observations(), 1);
        assert!(pt.remove_observation(FeatureId::new(0)).is_none());
    }
}
