//! Core ID types for the visual map structures.

/// Unique identifier for a camera Frame.
///
/// FrameIds are assigned by a process-wide monotone counter when Frames are
/// constructed. They serve as lightweight handles for cross-referencing
/// without needing Arc/Rc, which simplifies ownership and avoids cyclic
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Unique identifier for a map Point within a `SparseMap`.
///
/// PointIds are assigned sequentially when Points are created. A Point
/// represents a 3D landmark promoted from the LiDAR cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointId(pub u64);

impl PointId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Unique identifier for a Feature observation.
///
/// FeatureIds are assigned sequentially across the whole map; besides
/// identifying an observation inside its Point, they key the per-reference
/// affine-warp cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureId(pub u64);

impl FeatureId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "O{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_equality() {
        assert_eq!(PointId::new(42), PointId::new(42));
        assert_ne!(PointId::new(42), PointId::new(43));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", FrameId(7)), "F7");
        assert_eq!(format!("{}", PointId::new(123)), "P123");
        assert_eq!(format!("{}", FeatureId::new(5)), "O5");
    }

    #[test]
    fn test_id_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<PointId, &str> = HashMap::new();
        map.insert(PointId::new(1), "first");
        map.insert(PointId::new(2), "second");

        assert_eq!(map.get(&PointId::new(1)), Some(&"first"));
        assert_eq!(map.get(&PointId::new(3)), None);
    }
}
