//! SO(3) Lie group utilities for the error-state filter.
//!
//! Provides skew-symmetric matrix construction and the exponential /
//! logarithm maps used by the error-state boxplus and boxminus operators.

use nalgebra::{Matrix3, Vector3};

/// Small angle threshold for numerical stability.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-7;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map: axis-angle vector φ → rotation matrix, via Rodrigues.
///
/// For small angles (|φ| < ε):
/// ```text
/// Exp(φ) ≈ I + [φ]×
/// ```
pub fn exp_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() + skew(phi);
    }

    let axis = phi / theta;
    let skew_axis = skew(&axis);
    Matrix3::identity() + theta.sin() * skew_axis + (1.0 - theta.cos()) * skew_axis * skew_axis
}

/// Logarithm map: rotation matrix → axis-angle vector.
///
/// The rotation angle is recovered from the trace; the axis from the
/// antisymmetric part. Near the identity the first-order extraction of the
/// antisymmetric part is used directly.
pub fn log_so3(rot: &Matrix3<f64>) -> Vector3<f64> {
    let cos_theta = (0.5 * (rot.trace() - 1.0)).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();

    let omega = 0.5
        * Vector3::new(
            rot[(2, 1)] - rot[(1, 2)],
            rot[(0, 2)] - rot[(2, 0)],
            rot[(1, 0)] - rot[(0, 1)],
        );

    if theta < SMALL_ANGLE_THRESHOLD {
        return omega;
    }

    let sin_theta = theta.sin();
    if sin_theta.abs() < SMALL_ANGLE_THRESHOLD {
        // Angle near π: recover the axis from the diagonal of R + I.
        let diag = Vector3::new(
            (0.5 * (rot[(0, 0)] + 1.0)).max(0.0).sqrt(),
            (0.5 * (rot[(1, 1)] + 1.0)).max(0.0).sqrt(),
            (0.5 * (rot[(2, 2)] + 1.0)).max(0.0).sqrt(),
        );
        let axis = if diag.norm() > 0.0 {
            diag / diag.norm()
        } else {
            Vector3::x()
        };
        return theta * axis;
    }

    omega * (theta / sin_theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(4.0, 5.0, 6.0);

        let cross_direct = v.cross(&u);
        let cross_skew = skew(&v) * u;

        assert_relative_eq!(cross_direct, cross_skew, epsilon = 1e-12);
    }

    #[test]
    fn test_skew_antisymmetric() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let skew_v = skew(&v);

        assert_relative_eq!(skew_v, -skew_v.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_identity_at_zero() {
        let rot = exp_so3(&Vector3::zeros());
        assert_relative_eq!(rot, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_is_rotation() {
        let rot = exp_so3(&Vector3::new(0.3, -0.4, 0.5));
        assert_relative_eq!(rot * rot.transpose(), Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(rot.determinant(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_log_exp_roundtrip() {
        let phi = Vector3::new(0.2, -0.1, 0.4);
        let recovered = log_so3(&exp_so3(&phi));
        assert_relative_eq!(recovered, phi, epsilon = 1e-10);
    }

    #[test]
    fn test_log_exp_roundtrip_small_angle() {
        let phi = Vector3::new(1e-9, -2e-9, 3e-9);
        let recovered = log_so3(&exp_so3(&phi));
        assert_relative_eq!(recovered, phi, epsilon = 1e-15);
    }
}
