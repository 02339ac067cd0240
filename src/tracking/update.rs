//! Iterated error-state Kalman update driven by photometric residuals.
//!
//! The outer loop sweeps pyramid levels 2 → 0; each level runs Gauss-Newton
//! style iterations that assemble per-pixel residuals and image Jacobians
//! chained through the projection and the SE(3) kinematics, then fold them
//! into a measurement update restricted to the six pose dimensions of the
//! shared state.

use nalgebra::{DMatrix, DVector, RowVector2, SMatrix, SVector};
use tracing::debug;

use crate::geometry::skew;
use crate::state::{NavState, StateCov};

use super::tracker::{VisualTracker, UPDATE_LEVELS};

/// Initial "last error" each pyramid level starts from, so the first
/// iteration of a level is always accepted.
const INITIAL_ERROR: f32 = 1e10;

/// Degrees per radian as used by the convergence gate.
const RAD_TO_DEG: f64 = 57.3;

impl VisualTracker {
    /// Run the photometric update over all pyramid levels and commit the
    /// refined pose to the current frame. The covariance shrinks by
    /// `cov -= G·cov` when the final error improved.
    pub(super) fn refine_pose(&mut self, state: &mut NavState, state_propagat: &NavState) {
        if self.submap.is_empty() {
            return;
        }

        let mut last_error = INITIAL_ERROR;
        for level in (0..UPDATE_LEVELS).rev() {
            last_error = self.update_state_level(level, state, state_propagat);
        }
        if last_error < INITIAL_ERROR {
            let cov = state.cov;
            state.cov -= self.gain * cov;
        }
        self.update_frame_state(state);
        debug!(error = last_error, "photometric update finished");
    }

    /// One pyramid level of iterated updates. Returns the level's final
    /// mean residual.
    fn update_state_level(
        &mut self,
        level: usize,
        state: &mut NavState,
        state_propagat: &NavState,
    ) -> f32 {
        let total_points = self.submap.len();
        if total_points == 0 {
            return 0.0;
        }

        let patch_size = self.config.patch_size;
        let patch_area = self.config.patch_area();
        let patch_half = (patch_size / 2) as i64;
        let img = self
            .frame
            .as_ref()
            .expect("detect builds the frame first")
            .img0
            .clone();
        let width = img.width() as i64;
        let height = img.height() as i64;

        let h_dim = total_points * patch_area;
        let mut z = DVector::<f64>::zeros(h_dim);
        let mut h_sub = DMatrix::<f64>::zeros(h_dim, 6);

        let mut old_state = state.clone();
        let mut last_error = INITIAL_ERROR;
        let mut ekf_end = false;

        for _iteration in 0..self.config.max_iterations {
            let mut error = 0.0f32;
            let mut n_meas = 0usize;

            let rwi = state.rot_end;
            let pwi = state.pos_end;
            let rcw = self.rci * rwi.transpose();
            let pcw = -(self.rci * rwi.transpose()) * pwi + self.pci;
            let jdp_dt = self.rci * rwi.transpose();

            for i in 0..total_points {
                let search_level = self.submap.search_levels[i];
                let pyramid_level = level + search_level;
                let scale = 1i64 << pyramid_level;

                let Some(pt) = self.map.point(self.submap.points[i]) else {
                    continue;
                };

                let pf = rcw * pt.pos + pcw;
                if pf.z <= 0.0 {
                    zero_rows(&mut h_sub, &mut z, i, patch_area);
                    continue;
                }
                let pc = self.camera.project(&pf);
                let jdpi = self.camera.dpi(&pf);
                let p_hat = skew(&pf);

                let u_i = (pc.x / scale as f64).floor() as i64 * scale;
                let v_i = (pc.y / scale as f64).floor() as i64 * scale;
                // Sampling reaches one stride beyond the patch on every
                // side for the central-difference gradients.
                let reach = (patch_half + 1) * scale;
                if u_i - reach < 0 || u_i + reach >= width || v_i - reach < 0 || v_i + reach >= height
                {
                    zero_rows(&mut h_sub, &mut z, i, patch_area);
                    continue;
                }

                let subpix_u = (pc.x - u_i as f64) / scale as f64;
                let subpix_v = (pc.y - v_i as f64) / scale as f64;
                let w_tl = (1.0 - subpix_u) * (1.0 - subpix_v);
                let w_tr = subpix_u * (1.0 - subpix_v);
                let w_bl = (1.0 - subpix_u) * subpix_v;
                let w_br = subpix_u * subpix_v;

                let p_ref = &self.submap.patches[i];
                let mut patch_error = 0.0f32;

                for x in 0..patch_size {
                    let bv = v_i + (x as i64 - patch_half) * scale;
                    for y in 0..patch_size {
                        let bu = u_i + (y as i64 - patch_half) * scale;
                        // Stride-aligned samples around (bu, bv).
                        let sample = |dx: i64, dy: i64| -> f64 {
                            img.get_pixel(
                                (bu + dx * scale) as u32,
                                (bv + dy * scale) as u32,
                            )[0] as f64
                        };

                        let du = 0.5
                            * ((w_tl * sample(1, 0)
                                + w_tr * sample(2, 0)
                                + w_bl * sample(1, 1)
                                + w_br * sample(2, 1))
                                - (w_tl * sample(-1, 0)
                                    + w_tr * sample(0, 0)
                                    + w_bl * sample(-1, 1)
                                    + w_br * sample(0, 1)));
                        let dv = 0.5
                            * ((w_tl * sample(0, 1)
                                + w_tr * sample(1, 1)
                                + w_bl * sample(0, 2)
                                + w_br * sample(1, 2))
                                - (w_tl * sample(0, -1)
                                    + w_tr * sample(1, -1)
                                    + w_bl * sample(0, 0)
                                    + w_br * sample(1, 0)));

                        let jimg = RowVector2::new(du, dv) / scale as f64;
                        let jdphi = jimg * jdpi * p_hat;
                        let jdp = -(jimg * jdpi);
                        let jdr = jdphi * self.jdphi_dr + jdp * self.jdp_dr;
                        let jdt = jdp * jdp_dt;

                        let cur = w_tl * sample(0, 0)
                            + w_tr * sample(1, 0)
                            + w_bl * sample(0, 1)
                            + w_br * sample(1, 1);
                        let res =
                            cur - p_ref[patch_area * level + x * patch_size + y] as f64;

                        let row = i * patch_area + x * patch_size + y;
                        z[row] = res;
                        for c in 0..3 {
                            h_sub[(row, c)] = jdr[c];
                            h_sub[(row, 3 + c)] = jdt[c];
                        }

                        patch_error += (res * res) as f32;
                        n_meas += 1;
                    }
                }

                self.submap.errors[i] = patch_error;
                error += patch_error;
            }

            if n_meas == 0 {
                break;
            }
            let mean_error = error / n_meas as f32;

            if mean_error <= last_error {
                old_state = state.clone();
                last_error = mean_error;

                // Gain restricted to the six pose dimensions; every other
                // state dimension receives no direct measurement.
                let mut h_t_h6 = SMatrix::<f64, 6, 6>::zeros();
                let tmp = h_sub.transpose() * &h_sub;
                for r in 0..6 {
                    for c in 0..6 {
                        h_t_h6[(r, c)] = tmp[(r, c)];
                    }
                }
                let mut h_t_h = StateCov::zeros();
                h_t_h.fixed_view_mut::<6, 6>(0, 0).copy_from(&h_t_h6);

                let Some(prior_info) = (state.cov / self.config.img_point_cov).try_inverse()
                else {
                    break;
                };
                let Some(k_1) = (h_t_h + prior_info).try_inverse() else {
                    break;
                };

                let h_t_z_dyn = h_sub.transpose() * &z;
                let mut h_t_z = SVector::<f64, 6>::zeros();
                for r in 0..6 {
                    h_t_z[r] = h_t_z_dyn[r];
                }

                let k_block: SMatrix<f64, 18, 6> = k_1.fixed_view::<18, 6>(0, 0).into_owned();
                self.gain = StateCov::zeros();
                self.gain
                    .fixed_view_mut::<18, 6>(0, 0)
                    .copy_from(&(k_block * h_t_h6));

                let vec = state_propagat.boxminus(state);
                let vec6: SVector<f64, 6> = vec.fixed_rows::<6>(0).into_owned();
                let solution = -(k_block * h_t_z) + vec
                    - self.gain.fixed_view::<18, 6>(0, 0) * vec6;
                state.boxplus(&solution);

                let rot_add = solution.fixed_rows::<3>(0).norm();
                let t_add = solution.fixed_rows::<3>(3).norm();
                if rot_add * RAD_TO_DEG < 0.001 && t_add * 100.0 < 0.001 {
                    ekf_end = true;
                }
            } else {
                *state = old_state.clone();
                ekf_end = true;
            }

            if ekf_end {
                break;
            }
        }

        last_error
    }
}

fn zero_rows(h_sub: &mut DMatrix<f64>, z: &mut DVector<f64>, i: usize, patch_area: usize) {
    for row in i * patch_area..(i + 1) * patch_area {
        z[row] = 0.0;
        for c in 0..6 {
            h_sub[(row, c)] = 0.0;
        }
    }
}
