//! Voxel hashing for the visual map and the cloud downsample filter.

use std::collections::HashMap;

use nalgebra::Vector3;

/// Integer triple indexing a sparse 3D grid.
///
/// Components floor toward −∞, so negative coordinates land in the voxel
/// below them rather than the one toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelKey {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl VoxelKey {
    pub fn from_position(p: &Vector3<f64>, voxel_size: f64) -> Self {
        Self {
            x: (p.x / voxel_size).floor() as i64,
            y: (p.y / voxel_size).floor() as i64,
            z: (p.z / voxel_size).floor() as i64,
        }
    }
}

/// Voxel-grid filter: one centroid per occupied leaf.
///
/// Output order follows the first occupancy of each leaf, so the result is
/// deterministic in the input order.
pub fn voxel_grid_downsample(cloud: &[Vector3<f64>], leaf_size: f64) -> Vec<Vector3<f64>> {
    let mut slots: HashMap<VoxelKey, usize> = HashMap::new();
    let mut sums: Vec<(Vector3<f64>, usize)> = Vec::new();

    for p in cloud {
        let key = VoxelKey::from_position(p, leaf_size);
        match slots.get(&key) {
            Some(&idx) => {
                sums[idx].0 += p;
                sums[idx].1 += 1;
            }
            None => {
                slots.insert(key, sums.len());
                sums.push((*p, 1));
            }
        }
    }

    sums.into_iter().map(|(sum, n)| sum / n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_key_floors_toward_negative_infinity() {
        let key = VoxelKey::from_position(&Vector3::new(-0.1, 0.1, -0.6), 0.5);
        assert_eq!(key, VoxelKey { x: -1, y: 0, z: -2 });
    }

    #[test]
    fn test_key_on_positive_boundary() {
        let key = VoxelKey::from_position(&Vector3::new(0.5, 1.0, 0.0), 0.5);
        assert_eq!(key, VoxelKey { x: 1, y: 2, z: 0 });
    }

    #[test]
    fn test_downsample_merges_points_in_one_leaf() {
        let cloud = vec![
            Vector3::new(0.01, 0.01, 0.01),
            Vector3::new(0.05, 0.05, 0.05),
            Vector3::new(1.0, 1.0, 1.0),
        ];
        let down = voxel_grid_downsample(&cloud, 0.2);
        assert_eq!(down.len(), 2);
        assert_relative_eq!(down[0], Vector3::new(0.03, 0.03, 0.03), epsilon = 1e-12);
        assert_relative_eq!(down[1], Vector3::new(1.0, 1.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_downsample_keeps_first_touch_order() {
        let cloud = vec![
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(5.01, 0.0, 0.0),
        ];
        let down = voxel_grid_downsample(&cloud, 0.2);
        assert_eq!(down.len(), 2);
        assert!(down[0].x > 4.0);
        assert_eq!(down[1].x, 0.0);
    }
}
