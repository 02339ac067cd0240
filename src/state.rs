//! Shared navigation state of the odometry estimator.
//!
//! The full estimator owns an 18-dimensional error state (attitude,
//! position, velocity, gyro bias, accelerometer bias, gravity). The visual
//! subsystem is the exclusive writer of the attitude/position block and the
//! top-left 6×6 of the covariance for the duration of a `detect` call; the
//! remaining dimensions pass through the update untouched.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::geometry::{exp_so3, log_so3};

/// Dimension of the full error state.
pub const DIM_STATE: usize = 18;

/// Initial diagonal covariance of the full state.
const INIT_COV: f64 = 1e-4;

/// Error-state vector: rot(0..3), pos(3..6), vel(6..9), bg(9..12),
/// ba(12..15), gravity(15..18).
pub type StateVector = SVector<f64, DIM_STATE>;

/// Full-state covariance.
pub type StateCov = SMatrix<f64, DIM_STATE, DIM_STATE>;

/// Propagated navigation state with covariance.
#[derive(Debug, Clone)]
pub struct NavState {
    /// Attitude of the IMU frame in the world frame (R_wi).
    pub rot_end: Matrix3<f64>,
    /// Position of the IMU frame in the world frame.
    pub pos_end: Vector3<f64>,
    /// Velocity in the world frame.
    pub vel_end: Vector3<f64>,
    /// Gyroscope bias.
    pub bias_g: Vector3<f64>,
    /// Accelerometer bias.
    pub bias_a: Vector3<f64>,
    /// Gravity vector in the world frame.
    pub gravity: Vector3<f64>,
    /// Covariance of the error state.
    pub cov: StateCov,
}

impl NavState {
    pub fn new() -> Self {
        Self {
            rot_end: Matrix3::identity(),
            pos_end: Vector3::zeros(),
            vel_end: Vector3::zeros(),
            bias_g: Vector3::zeros(),
            bias_a: Vector3::zeros(),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            cov: StateCov::identity() * INIT_COV,
        }
    }

    /// Retraction: apply an error-state increment on the manifold.
    ///
    /// The attitude block composes on the right (`R ← R·Exp(δφ)`); all other
    /// blocks are additive.
    pub fn boxplus(&mut self, delta: &StateVector) {
        let d_rot: Vector3<f64> = delta.fixed_rows::<3>(0).into_owned();
        self.rot_end *= exp_so3(&d_rot);
        self.pos_end += delta.fixed_rows::<3>(3).into_owned();
        self.vel_end += delta.fixed_rows::<3>(6).into_owned();
        self.bias_g += delta.fixed_rows::<3>(9).into_owned();
        self.bias_a += delta.fixed_rows::<3>(12).into_owned();
        self.gravity += delta.fixed_rows::<3>(15).into_owned();
    }

    /// Inverse retraction: the error-state increment from `other` to `self`,
    /// i.e. `other.boxplus(self.boxminus(other))` recovers `self`.
    pub fn boxminus(&self, other: &NavState) -> StateVector {
        let mut delta = StateVector::zeros();
        let d_rot = log_so3(&(other.rot_end.transpose() * self.rot_end));
        delta.fixed_rows_mut::<3>(0).copy_from(&d_rot);
        delta
            .fixed_rows_mut::<3>(3)
            .copy_from(&(self.pos_end - other.pos_end));
        delta
            .fixed_rows_mut::<3>(6)
            .copy_from(&(self.vel_end - other.vel_end));
        delta
            .fixed_rows_mut::<3>(9)
            .copy_from(&(self.bias_g - other.bias_g));
        delta
            .fixed_rows_mut::<3>(12)
            .copy_from(&(self.bias_a - other.bias_a));
        delta
            .fixed_rows_mut::<3>(15)
            .copy_from(&(self.gravity - other.gravity));
        delta
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::new()
    }
}
