//! Tunable parameters of the visual subsystem.
//!
//! Loading (YAML/launch plumbing) lives with the host application; this
//! crate only defines the typed surface and its defaults.

use serde::Deserialize;

/// Configuration scalars for the photometric tracker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Side length of a selection grid cell in pixels.
    pub grid_size: usize,

    /// Side length of a photometric patch in pixels.
    pub patch_size: usize,

    /// Maximum Gauss-Newton iterations per pyramid level.
    pub max_iterations: usize,

    /// Photometric measurement noise variance.
    pub img_point_cov: f64,

    /// Per-pixel squared-error budget for the association pre-filter; a
    /// candidate is rejected when its patch SSE exceeds
    /// `outlier_threshold * patch_area`.
    pub outlier_threshold: f64,

    /// Enable the NCC similarity check during association.
    pub ncc_en: bool,

    /// Minimum normalized cross-correlation when `ncc_en` is set.
    pub ncc_thre: f64,

    /// Translation between views that triggers a new observation (metres).
    pub trans_thresh: f64,

    /// Rotation between views that triggers a new observation.
    ///
    /// Compared against the relative rotation angle in radians, so the
    /// default of 10.0 never fires and attachment is driven by the
    /// translation and pixel-distance triggers alone. 0.1 rad (≈ 5.7°) is
    /// the value that makes this trigger meaningful.
    pub rot_thresh: f64,

    /// Pixel motion of the projection that triggers a new observation.
    pub pixel_dist_thresh: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            grid_size: 40,
            patch_size: 8,
            max_iterations: 4,
            img_point_cov: 100.0,
            outlier_threshold: 78.0,
            ncc_en: false,
            ncc_thre: 0.85,
            trans_thresh: 0.5,
            rot_thresh: 10.0,
            pixel_dist_thresh: 40.0,
        }
    }
}

impl VisualConfig {
    /// Pixels per patch.
    pub fn patch_area(&self) -> usize {
        self.patch_size * self.patch_size
    }

    /// Half patch side.
    pub fn patch_half(&self) -> usize {
        self.patch_size / 2
    }

    /// Safe image border for every projection test.
    pub fn border(&self) -> i64 {
        ((self.patch_half() + 1) * 8) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_border() {
        let config = VisualConfig::default();
        assert_eq!(config.patch_half(), 4);
        assert_eq!(config.border(), 40);
        assert_eq!(config.patch_area(), 64);
    }
}
