//! Per-frame working set of map points associated to the current image.

use crate::map::PointId;

/// Parallel arrays describing the points selected for photometric
/// alignment this frame, rebuilt by every association pass.
#[derive(Debug, Default)]
pub struct SubMap {
    /// Selected map points.
    pub points: Vec<PointId>,

    /// Reference patches, three pyramid levels concatenated per point.
    pub patches: Vec<Vec<f32>>,

    /// Pyramid search level chosen by the warp for each point.
    pub search_levels: Vec<usize>,

    /// Current photometric error per point.
    pub errors: Vec<f32>,

    /// Pre-filter (propagated-pose) photometric error per point.
    pub propa_errors: Vec<f32>,

    /// Grid cell each point won.
    pub cell_index: Vec<usize>,
}

impl SubMap {
    pub fn reset(&mut self) {
        self.points.clear();
        self.patches.clear();
        self.search_levels.clear();
        self.errors.clear();
        self.propa_errors.clear();
        self.cell_index.clear();
    }

    pub fn push(
        &mut self,
        point: PointId,
        patch: Vec<f32>,
        search_level: usize,
        error: f32,
        cell: usize,
    ) {
        self.points.push(point);
        self.patches.push(patch);
        self.search_levels.push(search_level);
        self.errors.push(error);
        self.propa_errors.push(error);
        self.cell_index.push(cell);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_reset() {
        let mut submap = SubMap::default();
        submap.push(PointId::new(7), vec![0.0; 192], 1, 12.5, 42);

        assert_eq!(submap.len(), 1);
        assert_eq!(submap.errors[0], 12.5);
        assert_eq!(submap.propa_errors[0], 12.5);

        submap.reset();
        assert!(submap.is_empty());
        assert!(submap.patches.is_empty());
    }
}
