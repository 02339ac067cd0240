//! Photometric tracker: the per-frame driver of the visual subsystem.
//!
//! Each `detect` call associates visual map points with the incoming image
//! through the selection grid, refines the shared pose with the iterated
//! photometric filter update, attaches new observations to the points that
//! earned them and grows the map from the de-skewed LiDAR cloud.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use anyhow::{ensure, Result};
use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::camera::PinholeCamera;
use crate::config::VisualConfig;
use crate::geometry::{skew, SE3};
use crate::imgproc::{extract_patch, shi_tomasi};
use crate::map::{
    voxel_grid_downsample, Feature, FeatureId, Frame, FrameFeature, Point, SparseMap, VoxelKey,
    MAX_OBS,
};
use crate::state::{NavState, StateCov};

use super::grid::{CellStatus, Grid};
use super::stage::Stage;
use super::submap::SubMap;
use super::warp::{best_search_level, warp_affine, warp_matrix_affine, Warp};

/// Pyramid levels built per frame.
const PYR_LEVELS: usize = 4;
/// Pyramid levels swept by the filter update (2 → 0).
pub(super) const UPDATE_LEVELS: usize = 3;
/// Visual map bucket granularity in metres.
const VOXEL_SIZE: f64 = 0.5;
/// Leaf size of the cloud downsample feeding association.
const LEAF_SIZE: f64 = 0.2;
/// Maximum depth jump tolerated inside a patch neighbourhood (metres).
const DEPTH_CONTINUITY_THRESH: f64 = 1.5;
/// Cloud size required to leave the bootstrap stage.
const MIN_BOOTSTRAP_CLOUD: usize = 10;

/// The visual subsystem of the odometry estimator.
pub struct VisualTracker {
    pub(super) config: VisualConfig,
    pub(super) camera: PinholeCamera,

    // Camera→IMU extrinsics and the constant Jacobian factors derived from
    // them (see `set_extrinsic`).
    pub(super) rci: Matrix3<f64>,
    pub(super) pci: Vector3<f64>,
    pub(super) jdphi_dr: Matrix3<f64>,
    pub(super) jdp_dr: Matrix3<f64>,

    /// Persistent voxel-indexed visual map.
    pub(super) map: SparseMap,
    pub(super) stage: Stage,
    /// Frame being processed; replaced on every `detect`.
    pub(super) frame: Option<Frame>,

    // Per-frame working set, reset at the start of each association pass.
    pub(super) grid: Grid,
    pub(super) submap: SubMap,
    warp_cache: HashMap<FeatureId, Warp>,

    /// Kalman gain times measurement Jacobian from the last accepted
    /// iteration; applied to the covariance after the pyramid sweep.
    pub(super) gain: StateCov,

    /// RGB copy of the current image for `display_keypatch`.
    pub(super) overlay: Option<RgbImage>,

    frame_count: usize,
}

impl VisualTracker {
    pub fn new(config: VisualConfig, camera: PinholeCamera) -> Self {
        let grid = Grid::new(camera.width, camera.height, config.grid_size);
        Self {
            config,
            camera,
            rci: Matrix3::identity(),
            pci: Vector3::zeros(),
            jdphi_dr: Matrix3::identity(),
            jdp_dr: Matrix3::identity(),
            map: SparseMap::new(VOXEL_SIZE),
            stage: Stage::FirstFrame,
            frame: None,
            grid,
            submap: SubMap::default(),
            warp_cache: HashMap::new(),
            gain: StateCov::zeros(),
            overlay: None,
            frame_count: 0,
        }
    }

    /// Compose the LiDAR→IMU and camera→LiDAR calibration into the
    /// camera→IMU constants and the fixed Jacobian factors of the
    /// photometric measurement model.
    pub fn set_extrinsic(
        &mut self,
        rot_li: &Matrix3<f64>,
        trans_li: &Vector3<f64>,
        rot_cl: &Matrix3<f64>,
        trans_cl: &Vector3<f64>,
    ) {
        let rli = rot_li.transpose();
        let pli = -(rot_li.transpose()) * trans_li;
        self.rci = rot_cl * rli;
        self.pci = rot_cl * pli + trans_cl;
        self.jdphi_dr = self.rci;
        let pic = -(self.rci.transpose()) * self.pci;
        self.jdp_dr = -self.rci * skew(&pic);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn map(&self) -> &SparseMap {
        &self.map
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Camera pose (T_cw) implied by the IMU state and the extrinsics.
    fn camera_pose(&self, state: &NavState) -> SE3 {
        let rot_cw = self.rci * state.rot_end.transpose();
        let pos_cw = -(self.rci * state.rot_end.transpose()) * state.pos_end + self.pci;
        SE3::from_matrix(&rot_cw, pos_cw)
    }

    /// Write the pose implied by `state` back into the current frame.
    pub(super) fn update_frame_state(&mut self, state: &NavState) {
        let pose = self.camera_pose(state);
        if let Some(frame) = self.frame.as_mut() {
            frame.pose_cw = pose;
        }
    }

    /// Process one camera image together with the de-skewed cloud of the
    /// same interval.
    ///
    /// `state` is the propagated estimate this call refines in place;
    /// `state_propagat` is the prior it stays anchored to. Only the pose
    /// block and the top-left 6×6 of the covariance are written.
    pub fn detect(
        &mut self,
        img: &GrayImage,
        cloud: &[Vector3<f64>],
        state: &mut NavState,
        state_propagat: &NavState,
    ) -> Result<()> {
        ensure!(
            img.width() == self.camera.width && img.height() == self.camera.height,
            "detect: image is {}x{} but the camera model expects {}x{}",
            img.width(),
            img.height(),
            self.camera.width,
            self.camera.height
        );
        let t_start = Instant::now();

        let pose = self.camera_pose(state);
        self.frame = Some(Frame::new(&self.camera, img.clone(), pose, PYR_LEVELS)?);
        self.overlay = Some(gray_to_rgb(img));

        if self.stage == Stage::FirstFrame && cloud.len() > MIN_BOOTSTRAP_CLOUD {
            if let Some(frame) = self.frame.as_mut() {
                frame.set_keyframe();
            }
            self.stage = Stage::DefaultFrame;
        }

        self.associate_from_map(cloud);
        self.expand_map(cloud);
        self.refine_pose(state, state_propagat);
        self.add_observations();

        self.frame_count += 1;
        debug!(
            frame = self.frame_count,
            submap = self.submap.len(),
            map_points = self.map.num_points(),
            elapsed_ms = t_start.elapsed().as_secs_f64() * 1e3,
            "visual update finished"
        );
        Ok(())
    }

    /// Association pass: project the cloud into a sparse depth image, fetch
    /// map points from the touched voxels, pick at most one candidate per
    /// grid cell and build its warped reference patch.
    fn associate_from_map(&mut self, cloud: &[Vector3<f64>]) {
        self.grid.reset();
        self.grid.reset_scores();
        self.submap.reset();
        self.warp_cache.clear();

        if self.map.is_empty() {
            return;
        }

        let frame = self.frame.as_ref().expect("detect builds the frame first");
        let border = self.config.border();
        let width = self.camera.width as usize;
        let cam_center = frame.camera_center();

        // Sparse depth image + set of voxels touched by the cloud. The
        // depth image only feeds the occlusion test below, it is not a
        // dense reconstruction.
        let cloud_down = voxel_grid_downsample(cloud, LEAF_SIZE);
        let mut depth_img = vec![0.0f32; width * self.camera.height as usize];
        let mut visited: Vec<VoxelKey> = Vec::new();
        let mut seen: HashSet<VoxelKey> = HashSet::new();
        for pt_w in &cloud_down {
            let key = VoxelKey::from_position(pt_w, VOXEL_SIZE);
            if seen.insert(key) {
                visited.push(key);
            }
            let pt_cam = frame.pose_cw.transform_point(pt_w);
            if pt_cam.z > 0.0 {
                let px = self.camera.project_pinhole(&pt_cam);
                if self.camera.in_frame(&px, border) {
                    depth_img[width * px.y as usize + px.x as usize] = pt_cam.z as f32;
                }
            }
        }

        // Gather candidates: the nearest point per cell wins (occlusion),
        // the cell score tracks the best corner response independently.
        for key in &visited {
            let Some(bucket) = self.map.voxel(key) else {
                continue;
            };
            for &pid in bucket {
                let Some(pt) = self.map.point(pid) else {
                    continue;
                };
                let pt_cam = frame.pose_cw.transform_point(&pt.pos);
                if pt_cam.z <= 0.0 {
                    continue;
                }
                let pc = self.camera.project(&pt_cam);
                if !self.camera.in_frame(&pc, border) {
                    continue;
                }

                let index = self.grid.cell_index(&pc);
                self.grid.status[index] = CellStatus::Map;

                let cur_dist = (pt.pos - cam_center).norm() as f32;
                if cur_dist <= self.grid.dist[index] {
                    self.grid.dist[index] = cur_dist;
                    self.grid.map_point[index] = Some(pid);
                }
                if pt.value as f32 >= self.grid.score[index] {
                    self.grid.score[index] = pt.value as f32;
                }
            }
        }

        // Per-cell refinement of the winners.
        let patch_size = self.config.patch_size;
        let patch_half = self.config.patch_half() as i64;
        let patch_area = self.config.patch_area();

        for i in 0..self.grid.len {
            if self.grid.status[i] != CellStatus::Map {
                continue;
            }
            let Some(pid) = self.grid.map_point[i] else {
                continue;
            };
            let Some(pt) = self.map.point(pid) else {
                continue;
            };

            let pt_cam = frame.pose_cw.transform_point(&pt.pos);
            let pc = self.camera.project(&pt_cam);

            // Depth continuity: a nearby cloud sample much closer than the
            // candidate means a probable occluder inside the patch.
            let mut occluded = false;
            'neighbourhood: for dv in -patch_half..=patch_half {
                for du in -patch_half..=patch_half {
                    if du == 0 && dv == 0 {
                        continue;
                    }
                    let col = pc.x as i64 + du;
                    let row = pc.y as i64 + dv;
                    let depth = depth_img[width * row as usize + col as usize];
                    if depth == 0.0 {
                        continue;
                    }
                    if (pt_cam.z - depth as f64).abs() > DEPTH_CONTINUITY_THRESH {
                        occluded = true;
                        break 'neighbourhood;
                    }
                }
            }
            if occluded {
                continue;
            }

            let Some(ref_ftr) = pt.close_view_obs(&cam_center) else {
                continue;
            };

            let warp = match self.warp_cache.get(&ref_ftr.id) {
                Some(warp) => warp.clone(),
                None => {
                    let a_cur_ref = warp_matrix_affine(
                        &self.camera,
                        &ref_ftr.px,
                        &ref_ftr.f,
                        (ref_ftr.camera_center() - pt.pos).norm(),
                        &frame.pose_cw.compose(&ref_ftr.pose_cw.inverse()),
                        self.config.patch_half(),
                    );
                    let warp = Warp {
                        search_level: best_search_level(&a_cur_ref, 2),
                        a_cur_ref,
                    };
                    self.warp_cache.insert(ref_ftr.id, warp.clone());
                    warp
                }
            };

            // Reference patch for the three update pyramid levels.
            let mut patch_wrap = vec![0.0f32; UPDATE_LEVELS * patch_area];
            let mut degenerate = false;
            for pyramid_level in 0..UPDATE_LEVELS {
                if !warp_affine(
                    &warp.a_cur_ref,
                    &ref_ftr.img,
                    &ref_ftr.px,
                    warp.search_level,
                    pyramid_level,
                    self.config.patch_half(),
                    &mut patch_wrap,
                ) {
                    degenerate = true;
                    break;
                }
            }
            if degenerate {
                continue;
            }

            // Photometric pre-filter against the current level-0 patch.
            let mut patch_cache = vec![0.0f32; patch_area];
            extract_patch(frame.pyramid.level(0), &pc, &mut patch_cache, 0, patch_size);

            if self.config.ncc_en
                && ncc(&patch_wrap[..patch_area], &patch_cache) < self.config.ncc_thre
            {
                continue;
            }

            let error: f32 = patch_wrap[..patch_area]
                .iter()
                .zip(&patch_cache)
                .map(|(w, c)| (w - c) * (w - c))
                .sum();
            if error > self.config.outlier_threshold as f32 * patch_area as f32 {
                continue;
            }

            self.submap
                .push(pid, patch_wrap, warp.search_level, error, i);
        }

        debug!(
            selected = self.submap.len(),
            voxels = visited.len(),
            "associated map points with the current frame"
        );
    }

    /// Map growth: promote the best-cornered cloud point of every cell that
    /// no map projection already claimed with a higher score.
    fn expand_map(&mut self, cloud: &[Vector3<f64>]) {
        // Statuses and winners reset; scores survive from the association
        // pass so growth has to beat the projected map points.
        self.grid.reset();

        let border = self.config.border();
        {
            let frame = self.frame.as_ref().expect("detect builds the frame first");
            let img = frame.pyramid.level(0);
            for pt_w in cloud {
                let pt_cam = frame.pose_cw.transform_point(pt_w);
                if pt_cam.z <= 0.0 {
                    continue;
                }
                let pc = self.camera.project(&pt_cam);
                if !self.camera.in_frame(&pc, border) {
                    continue;
                }
                let index = self.grid.cell_index(&pc);
                let cur_value = shi_tomasi(img, pc.x, pc.y) as f32;
                if cur_value > self.grid.score[index] {
                    self.grid.score[index] = cur_value;
                    self.grid.cloud_point[index] = Some(*pt_w);
                    self.grid.status[index] = CellStatus::PointCloud;
                }
            }
        }

        let mut added = 0usize;
        for i in 0..self.grid.len {
            if self.grid.status[i] != CellStatus::PointCloud {
                continue;
            }
            let Some(pt_w) = self.grid.cloud_point[i] else {
                continue;
            };

            let (pc, frame_id, pose_cw, img0) = {
                let frame = self.frame.as_ref().expect("detect builds the frame first");
                let pc = self.camera.project(&frame.pose_cw.transform_point(&pt_w));
                (pc, frame.id, frame.pose_cw.clone(), frame.img0.clone())
            };

            let score = self.grid.score[i] as f64;
            let pid = self.map.next_point_id();
            let fid = self.map.next_feature_id();

            let mut pt = Point::new(pid, pt_w);
            pt.value = score;
            pt.add_observation(Feature {
                id: fid,
                point: pid,
                frame_id,
                px: pc,
                f: self.camera.unproject(&pc),
                pose_cw,
                level: 0,
                score,
                img: img0,
            });
            self.map.insert_point(pt);

            if let Some(frame) = self.frame.as_mut() {
                frame.add_feature(FrameFeature {
                    id: fid,
                    point: pid,
                    px: pc,
                });
            }
            added += 1;
        }

        if added > 0 {
            debug!(added, "promoted cloud points into the visual map");
        }
    }

    /// Observation bookkeeping after the pose update: points whose view
    /// changed enough earn a new observation; saturated histories evict
    /// their most redundant view first.
    fn add_observations(&mut self) {
        if self.submap.is_empty() {
            return;
        }

        for i in 0..self.submap.len() {
            let pid = self.submap.points[i];

            let (pc, pose_cur, frame_id, frame_pos, img0) = {
                let frame = self.frame.as_ref().expect("detect builds the frame first");
                let Some(pt) = self.map.point(pid) else {
                    continue;
                };
                let pc = self.camera.project(&frame.pose_cw.transform_point(&pt.pos));
                (
                    pc,
                    frame.pose_cw.clone(),
                    frame.id,
                    frame.camera_center(),
                    frame.img0.clone(),
                )
            };

            let (add_flag, evict) = {
                let pt = self.map.point(pid).expect("checked above");
                let Some(last) = pt.last_observation() else {
                    continue;
                };

                let delta_pose = last.pose_cw.compose(&pose_cur.inverse());
                let delta_p = delta_pose.translation.norm();
                let trace = delta_pose.rotation_matrix().trace();
                let delta_theta = if trace > 3.0 - 1e-6 {
                    0.0
                } else {
                    (0.5 * (trace - 1.0)).acos()
                };
                let pixel_dist = (pc - last.px).norm();

                let add_flag = delta_p > self.config.trans_thresh
                    || delta_theta > self.config.rot_thresh
                    || pixel_dist > self.config.pixel_dist_thresh;

                let evict = if pt.num_observations() >= MAX_OBS {
                    pt.furthest_view_obs(&frame_pos).map(|ftr| ftr.id)
                } else {
                    None
                };
                (add_flag, evict)
            };

            if let Some(fid) = evict {
                let evicted = self
                    .map
                    .point_mut(pid)
                    .and_then(|pt| pt.remove_observation(fid));
                // Null any handle the current frame still holds on it.
                if let Some(evicted) = evicted {
                    if evicted.frame_id == frame_id {
                        if let Some(frame) = self.frame.as_mut() {
                            frame.remove_feature(evicted.id);
                        }
                    }
                }
            }

            if add_flag {
                let score = {
                    let frame = self.frame.as_ref().expect("detect builds the frame first");
                    shi_tomasi(frame.pyramid.level(0), pc.x, pc.y)
                };
                let fid = self.map.next_feature_id();
                let bearing = self.camera.unproject(&pc);
                if let Some(pt) = self.map.point_mut(pid) {
                    pt.value = score;
                    pt.add_observation(Feature {
                        id: fid,
                        point: pid,
                        frame_id,
                        px: pc,
                        f: bearing,
                        pose_cw: pose_cur,
                        level: self.submap.search_levels[i],
                        score,
                        img: img0,
                    });
                }
                if let Some(frame) = self.frame.as_mut() {
                    frame.add_feature(FrameFeature {
                        id: fid,
                        point: pid,
                        px: pc,
                    });
                }
            }
        }
    }
}

/// Normalized cross-correlation of two equally sized patches.
fn ncc(ref_patch: &[f32], cur_patch: &[f32]) -> f64 {
    let n = ref_patch.len() as f64;
    let mean_ref = ref_patch.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_cur = cur_patch.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denom_ref = 0.0;
    let mut denom_cur = 0.0;
    for (&r, &c) in ref_patch.iter().zip(cur_patch.iter()) {
        let dr = r as f64 - mean_ref;
        let dc = c as f64 - mean_cur;
        numerator += dr * dc;
        denom_ref += dr * dr;
        denom_cur += dc * dc;
    }
    numerator / (denom_ref * denom_cur + 1e-10).sqrt()
}

fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0];
        image::Rgb([v, v, v])
    })
}
