//! SE(3) rigid-body transform used for camera and body poses.
//!
//! Follows the `T_target_source` naming convention: a transform `T_cw`
//! maps points from world coordinates into camera coordinates.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// A rigid transform in SE(3): rotation followed by translation.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build from a rotation matrix and a translation vector.
    ///
    /// The matrix is assumed to be a proper rotation; no orthonormalization
    /// is performed beyond the quaternion conversion.
    pub fn from_matrix(rotation: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
        Self {
            rotation,
            translation,
        }
    }

    /// The rotation as a 3×3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transform: if `self` maps a→b, the result maps b→a.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        Self {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    /// Composition: `self.compose(&other)` applies `other` first, then `self`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Apply the transform to a 3D point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_roundtrip() {
        let p = Vector3::new(1.0, -2.0, 3.0);
        let t = SE3::identity();
        assert_relative_eq!(t.transform_point(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_cancels() {
        let t = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            translation: Vector3::new(0.5, 1.5, -0.7),
        };
        let p = Vector3::new(2.0, 0.0, 4.0);
        let q = t.inverse().transform_point(&t.transform_point(&p));
        assert_relative_eq!(q, p, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_sequential_apply() {
        let a = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.0, 0.4, 0.0),
            translation: Vector3::new(1.0, 0.0, 0.0),
        };
        let b = SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.2, 0.0, -0.1),
            translation: Vector3::new(0.0, -1.0, 2.0),
        };
        let p = Vector3::new(0.3, 0.6, 0.9);
        let composed = a.compose(&b).transform_point(&p);
        let sequential = a.transform_point(&b.transform_point(&p));
        assert_relative_eq!(composed, sequential, epsilon = 1e-12);
    }

    #[test]
    fn test_from_matrix_preserves_rotation() {
        let rot = Rotation3::from_euler_angles(0.3, 0.1, -0.2);
        let t = SE3::from_matrix(&rot.into_inner(), Vector3::zeros());
        assert_relative_eq!(t.rotation_matrix(), rot.into_inner(), epsilon = 1e-12);
    }
}
