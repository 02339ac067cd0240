//! Persistent visual map: a voxel-indexed arena of Points with bounded
//! multi-view observation histories.

pub mod feature;
pub mod frame;
pub mod point;
pub mod types;
pub mod voxel;

use std::collections::HashMap;

pub use feature::Feature;
pub use frame::{scene_depth, Frame, FrameFeature};
pub use point::{Point, MAX_OBS};
pub use types::{FeatureId, FrameId, PointId};
pub use voxel::{voxel_grid_downsample, VoxelKey};

/// The persistent visual map.
///
/// Points live in a flat arena keyed by `PointId`; a voxel hash indexes
/// them spatially at bucket granularity `voxel_size`. A point joins exactly
/// one bucket at insertion time and is never re-bucketed or removed, so the
/// map only grows.
#[derive(Debug)]
pub struct SparseMap {
    points: HashMap<PointId, Point>,
    voxels: HashMap<VoxelKey, Vec<PointId>>,
    next_point_id: u64,
    next_feature_id: u64,
    voxel_size: f64,
}

impl SparseMap {
    pub fn new(voxel_size: f64) -> Self {
        Self {
            points: HashMap::new(),
            voxels: HashMap::new(),
            next_point_id: 0,
            next_feature_id: 0,
            voxel_size,
        }
    }

    /// Generate a new unique Point ID.
    pub fn next_point_id(&mut self) -> PointId {
        let id = PointId::new(self.next_point_id);
        self.next_point_id += 1;
        id
    }

    /// Generate a new unique Feature ID.
    pub fn next_feature_id(&mut self) -> FeatureId {
        let id = FeatureId::new(self.next_feature_id);
        self.next_feature_id += 1;
        id
    }

    /// Insert a point into the arena and append it to its voxel bucket.
    pub fn insert_point(&mut self, pt: Point) {
        let key = VoxelKey::from_position(&pt.pos, self.voxel_size);
        self.voxels.entry(key).or_default().push(pt.id);
        self.points.insert(pt.id, pt);
    }

    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.points.get(&id)
    }

    pub fn point_mut(&mut self, id: PointId) -> Option<&mut Point> {
        self.points.get_mut(&id)
    }

    /// The bucket for a voxel key, if occupied.
    pub fn voxel(&self, key: &VoxelKey) -> Option<&[PointId]> {
        self.voxels.get(key).map(|bucket| bucket.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;

    #[test]
    fn test_insert_buckets_by_position() {
        let mut map = SparseMap::new(0.5);
        let a = map.next_point_id();
        let b = map.next_point_id();
        map.insert_point(Point::new(a, Vector3::new(0.1, 0.1, 0.1)));
        map.insert_point(Point::new(b, Vector3::new(0.2, 0.2, 0.2)));

        let key = VoxelKey::from_position(&Vector3::new(0.1, 0.1, 0.1), 0.5);
        let bucket = map.voxel(&key).unwrap();
        // Same bucket, insertion order preserved, no deduplication.
        assert_eq!(bucket, &[a, b]);
        assert_eq!(map.num_points(), 2);
        assert_eq!(map.num_voxels(), 1);
    }

    #[test]
    fn test_negative_positions_use_floored_keys() {
        let mut map = SparseMap::new(0.5);
        let id = map.next_point_id();
        map.insert_point(Point::new(id, Vector3::new(-0.1, -0.1, -0.1)));

        assert!(map
            .voxel(&VoxelKey { x: -1, y: -1, z: -1 })
            .is_some());
        assert!(map.voxel(&VoxelKey { x: 0, y: 0, z: 0 }).is_none());
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut map = SparseMap::new(0.5);
        assert_eq!(map.next_point_id(), PointId::new(0));
        assert_eq!(map.next_point_id(), PointId::new(1));
        assert_eq!(map.next_feature_id(), FeatureId::new(0));
        assert_eq!(map.next_feature_id(), FeatureId::new(1));
    }
}
