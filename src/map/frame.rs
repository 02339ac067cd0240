//! Frame - per-image container with pose, pyramid and attached features.
//!
//! Each frame keeps five "key feature" slots that partition the image into
//! centre + four quadrants; the slots hold the extremal representative of
//! each region and give the frame a small, well-spread summary of its
//! feature set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Result};
use image::GrayImage;
use nalgebra::{Vector2, Vector3};

use crate::camera::PinholeCamera;
use crate::geometry::SE3;
use crate::imgproc::ImagePyramid;

use super::types::{FeatureId, FrameId, PointId};
use super::SparseMap;

/// Process-wide frame counter.
static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Key-feature slot layout: centre + the four image quadrants.
pub const KEY_SLOTS: usize = 5;

/// Lightweight handle to a Feature attached to this frame.
///
/// The pixel is cached so key-slot selection does not need map access.
#[derive(Debug, Clone)]
pub struct FrameFeature {
    pub id: FeatureId,
    pub point: PointId,
    pub px: Vector2<f64>,
}

/// A camera frame. Immutable after construction apart from its feature set,
/// keyframe flag and the pose written back after the filter update.
#[derive(Debug)]
pub struct Frame {
    pub id: FrameId,

    /// World-to-camera pose (T_cw).
    pub pose_cw: SE3,

    /// Grayscale pyramid, level 0 = the input image.
    pub pyramid: ImagePyramid,

    /// Shared handle to level 0, handed to features created in this frame.
    pub img0: Arc<GrayImage>,

    /// Extremal representatives: [centre, NE, NW, SW, SE].
    pub key_features: [Option<FeatureId>; KEY_SLOTS],

    /// Features attached to this frame.
    pub features: Vec<FrameFeature>,

    pub is_keyframe: bool,

    /// Image centre used by the key-slot classifier.
    cu: f64,
    cv: f64,
}

impl Frame {
    /// Build a frame from a grayscale image.
    ///
    /// Fails when the image does not match the camera model dimensions.
    pub fn new(camera: &PinholeCamera, img: GrayImage, pose_cw: SE3, n_levels: usize) -> Result<Self> {
        ensure!(
            img.width() == camera.width && img.height() == camera.height,
            "frame image is {}x{} but the camera model expects {}x{}",
            img.width(),
            img.height(),
            camera.width,
            camera.height
        );

        let pyramid = ImagePyramid::build(img, n_levels);
        let img0 = Arc::new(pyramid.level(0).clone());

        Ok(Self {
            id: FrameId(FRAME_COUNTER.fetch_add(1, Ordering::Relaxed)),
            pose_cw,
            pyramid,
            img0,
            key_features: [None; KEY_SLOTS],
            features: Vec::new(),
            is_keyframe: false,
            cu: (camera.width / 2) as f64,
            cv: (camera.height / 2) as f64,
        })
    }

    /// Camera centre in world coordinates.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.pose_cw.inverse().translation
    }

    /// Mark as keyframe and reselect the key-feature slots.
    pub fn set_keyframe(&mut self) {
        self.is_keyframe = true;
        self.set_key_points();
    }

    /// Attach a feature and let it compete for the key slots.
    pub fn add_feature(&mut self, ftr: FrameFeature) {
        self.check_key_points(&ftr);
        self.features.push(ftr);
    }

    /// Detach a feature (after its observation was evicted) and clear any
    /// key slot that referenced it.
    pub fn remove_feature(&mut self, id: FeatureId) {
        self.features.retain(|ftr| ftr.id != id);
        self.remove_key_point(id);
    }

    /// Null the slot holding `id`, if any, and reselect.
    pub fn remove_key_point(&mut self, id: FeatureId) {
        let mut found = false;
        for slot in self.key_features.iter_mut() {
            if *slot == Some(id) {
                *slot = None;
                found = true;
            }
        }
        if found {
            self.set_key_points();
        }
    }

    /// Reselect all key slots from the current feature set.
    pub fn set_key_points(&mut self) {
        for slot in self.key_features.iter_mut() {
            if let Some(id) = *slot {
                if !self.features.iter().any(|ftr| ftr.id == id) {
                    *slot = None;
                }
            }
        }
        let features = self.features.clone();
        for ftr in &features {
            self.check_key_points(ftr);
        }
    }

    fn slot_px(&self, slot: usize) -> Option<Vector2<f64>> {
        let id = self.key_features[slot]?;
        self.features.iter().find(|ftr| ftr.id == id).map(|ftr| ftr.px)
    }

    /// Let one feature compete for the centre slot and its quadrant slot.
    fn check_key_points(&mut self, ftr: &FrameFeature) {
        let (u, v) = (ftr.px.x, ftr.px.y);
        let (cu, cv) = (self.cu, self.cv);

        // Centre: minimise the Chebyshev distance to the image centre.
        match self.slot_px(0) {
            None => self.key_features[0] = Some(ftr.id),
            Some(k) => {
                if f64::max((u - cu).abs(), (v - cv).abs())
                    < f64::max((k.x - cu).abs(), (k.y - cv).abs())
                {
                    self.key_features[0] = Some(ftr.id);
                }
            }
        }

        // Quadrants: maximise the sign-corrected coordinate product, i.e.
        // the winner sits farthest into its quadrant.
        if u >= cu && v >= cv {
            match self.slot_px(1) {
                None => self.key_features[1] = Some(ftr.id),
                Some(k) => {
                    if (u - cu) * (v - cv) > (k.x - cu) * (k.y - cv) {
                        self.key_features[1] = Some(ftr.id);
                    }
                }
            }
        }
        if u >= cu && v < cv {
            match self.slot_px(2) {
                None => self.key_features[2] = Some(ftr.id),
                Some(k) => {
                    if (u - cu) * (cv - v) > (k.x - cu) * (cv - k.y) {
                        self.key_features[2] = Some(ftr.id);
                    }
                }
            }
        }
        if u < cu && v < cv {
            match self.slot_px(3) {
                None => self.key_features[3] = Some(ftr.id),
                Some(k) => {
                    if (u - cu) * (v - cv) > (k.x - cu) * (k.y - cv) {
                        self.key_features[3] = Some(ftr.id);
                    }
                }
            }
        }
        if u < cu && v >= cv {
            match self.slot_px(4) {
                None => self.key_features[4] = Some(ftr.id),
                Some(k) => {
                    if (cu - u) * (v - cv) > (cu - k.x) * (k.y - cv) {
                        self.key_features[4] = Some(ftr.id);
                    }
                }
            }
        }
    }

    /// Frustum test: true when the world point projects inside the image.
    pub fn is_visible(&self, p_world: &Vector3<f64>, camera: &PinholeCamera) -> bool {
        let p_cam = self.pose_cw.transform_point(p_world);
        if p_cam.z < 0.0 {
            return false;
        }
        let px = camera.project(&p_cam);
        px.x >= 0.0 && px.y >= 0.0 && px.x < camera.width as f64 && px.y < camera.height as f64
    }
}

/// Median and minimum depth of the frame's observed points.
///
/// Returns `None` when the frame has no point observations.
pub fn scene_depth(frame: &Frame, map: &SparseMap) -> Option<(f64, f64)> {
    let mut depths: Vec<f64> = frame
        .features
        .iter()
        .filter_map(|ftr| map.point(ftr.point))
        .map(|pt| frame.pose_cw.transform_point(&pt.pos).z)
        .collect();
    if depths.is_empty() {
        return None;
    }
    let min = depths.iter().cloned().fold(f64::INFINITY, f64::min);
    depths.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = depths[depths.len() / 2];
    Some((median, min))
}
