//! Pinhole camera model with optional radial-tangential distortion.
//!
//! The tracker only needs a thin projection surface: `project`, `unproject`,
//! the projection Jacobian `dpi`, and the safe-border test `in_frame`.

use nalgebra::{SMatrix, Vector2, Vector3};

/// Number of fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 8;

/// Calibrated pinhole camera.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Radial-tangential distortion coefficients (k1, k2, p1, p2).
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    has_distortion: bool,
}

impl PinholeCamera {
    /// Distortion-free pinhole camera.
    pub fn new(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            has_distortion: false,
        }
    }

    /// Pinhole camera with radial-tangential distortion.
    #[allow(clippy::too_many_arguments)]
    pub fn with_distortion(
        width: u32,
        height: u32,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        k1: f64,
        k2: f64,
        p1: f64,
        p2: f64,
    ) -> Self {
        let has_distortion = k1 != 0.0 || k2 != 0.0 || p1 != 0.0 || p2 != 0.0;
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            k1,
            k2,
            p1,
            p2,
            has_distortion,
        }
    }

    /// Distortion displacement at normalized image coordinates.
    fn distortion(&self, p: Vector2<f64>) -> Vector2<f64> {
        let mx2 = p.x * p.x;
        let my2 = p.y * p.y;
        let mxy = p.x * p.y;
        let rho2 = mx2 + my2;
        let rad = self.k1 * rho2 + self.k2 * rho2 * rho2;
        Vector2::new(
            p.x * rad + 2.0 * self.p1 * mxy + self.p2 * (rho2 + 2.0 * mx2),
            p.y * rad + 2.0 * self.p2 * mxy + self.p1 * (rho2 + 2.0 * my2),
        )
    }

    /// Project a camera-frame point (z > 0) to pixel coordinates.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Vector2<f64> {
        let mut uv = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        if self.has_distortion {
            uv += self.distortion(uv);
        }
        Vector2::new(self.fx * uv.x + self.cx, self.fy * uv.y + self.cy)
    }

    /// Project ignoring distortion. Used for the sparse depth image, which
    /// only feeds the coarse depth-continuity test.
    pub fn project_pinhole(&self, p_cam: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        )
    }

    /// Back-project a pixel to a unit bearing vector in the camera frame.
    ///
    /// Distortion is inverted by fixed-point iteration.
    pub fn unproject(&self, uv: &Vector2<f64>) -> Vector3<f64> {
        let mx_d = (uv.x - self.cx) / self.fx;
        let my_d = (uv.y - self.cy) / self.fy;
        let distorted = Vector2::new(mx_d, my_d);

        let undistorted = if self.has_distortion {
            let mut p = distorted;
            for _ in 0..UNDISTORT_ITERATIONS {
                p = distorted - self.distortion(p);
            }
            p
        } else {
            distorted
        };

        Vector3::new(undistorted.x, undistorted.y, 1.0).normalize()
    }

    /// Jacobian of the pinhole projection with respect to the camera-frame
    /// point, ∂uv/∂p:
    ///
    /// ```text
    /// | fx/z    0    -fx·x/z² |
    /// |  0     fy/z  -fy·y/z² |
    /// ```
    pub fn dpi(&self, p_cam: &Vector3<f64>) -> SMatrix<f64, 2, 3> {
        let z_inv = 1.0 / p_cam.z;
        let z_inv_2 = z_inv * z_inv;
        SMatrix::<f64, 2, 3>::new(
            self.fx * z_inv,
            0.0,
            -self.fx * p_cam.x * z_inv_2,
            0.0,
            self.fy * z_inv,
            -self.fy * p_cam.y * z_inv_2,
        )
    }

    /// True iff the pixel lies at least `border` pixels inside every side.
    pub fn in_frame(&self, uv: &Vector2<f64>, border: i64) -> bool {
        let u = uv.x.floor() as i64;
        let v = uv.y.floor() as i64;
        u >= border
            && u < self.width as i64 - border
            && v >= border
            && v < self.height as i64 - border
    }
}
