//! Affine warping between a reference observation and the current frame.
//!
//! A 2×2 linear map approximates the pixel-to-pixel deformation of a small
//! planar patch between the two views; it is estimated by projecting three
//! corner rays at the reference depth through the relative pose and
//! finite-differencing the resulting pixels.

use image::GrayImage;
use nalgebra::{Matrix2, Vector2, Vector3};

use crate::camera::PinholeCamera;
use crate::geometry::SE3;
use crate::imgproc::bilinear;

/// Cached warp for one reference feature.
#[derive(Debug, Clone)]
pub struct Warp {
    pub search_level: usize,
    pub a_cur_ref: Matrix2<f64>,
}

/// Affine warp from the reference patch frame to the current image.
///
/// `f_ref` is the unit bearing of the reference observation and `depth_ref`
/// the range along it; `t_cur_ref` maps reference-camera coordinates into
/// the current camera.
pub fn warp_matrix_affine(
    camera: &PinholeCamera,
    px_ref: &Vector2<f64>,
    f_ref: &Vector3<f64>,
    depth_ref: f64,
    t_cur_ref: &SE3,
    half_patch: usize,
) -> Matrix2<f64> {
    let half = half_patch as f64;
    let xyz_ref = f_ref * depth_ref;

    let mut xyz_du = camera.unproject(&(px_ref + Vector2::new(half, 0.0)));
    let mut xyz_dv = camera.unproject(&(px_ref + Vector2::new(0.0, half)));
    xyz_du *= xyz_ref.z / xyz_du.z;
    xyz_dv *= xyz_ref.z / xyz_dv.z;

    let px_cur = camera.project(&t_cur_ref.transform_point(&xyz_ref));
    let px_du = camera.project(&t_cur_ref.transform_point(&xyz_du));
    let px_dv = camera.project(&t_cur_ref.transform_point(&xyz_dv));

    let mut a_cur_ref = Matrix2::zeros();
    a_cur_ref.set_column(0, &((px_du - px_cur) / half));
    a_cur_ref.set_column(1, &((px_dv - px_cur) / half));
    a_cur_ref
}

/// Pyramid level to search on: halve the warp determinant while it still
/// magnifies by more than 3, up to `max_level`.
pub fn best_search_level(a_cur_ref: &Matrix2<f64>, max_level: usize) -> usize {
    let mut search_level = 0;
    let mut d = a_cur_ref.determinant();
    while d > 3.0 && search_level < max_level {
        search_level += 1;
        d *= 0.25;
    }
    search_level
}

/// Inverse-warp the reference level-0 image into the `pyramid_level`-th
/// slice of `patch`.
///
/// Out-of-bounds samples are written as 0. Returns false when the warp is
/// singular or non-finite (the caller drops the candidate).
pub fn warp_affine(
    a_cur_ref: &Matrix2<f64>,
    img_ref: &GrayImage,
    px_ref: &Vector2<f64>,
    search_level: usize,
    pyramid_level: usize,
    half_patch: usize,
    patch: &mut [f32],
) -> bool {
    let a_ref_cur = match a_cur_ref.try_inverse() {
        Some(inv) if inv[(0, 0)].is_finite() => inv,
        _ => return false,
    };

    let patch_size = 2 * half_patch;
    let patch_area = patch_size * patch_size;
    let scale = ((1usize << search_level) * (1usize << pyramid_level)) as f64;

    for y in 0..patch_size {
        for x in 0..patch_size {
            let px_patch =
                Vector2::new(x as f64 - half_patch as f64, y as f64 - half_patch as f64) * scale;
            let px = a_ref_cur * px_patch + px_ref;
            let value = if px.x < 0.0
                || px.y < 0.0
                || px.x >= img_ref.width() as f64 - 1.0
                || px.y >= img_ref.height() as f64 - 1.0
            {
                0.0
            } else {
                bilinear(img_ref, px.x as f32, px.y as f32)
            };
            patch[patch_area * pyramid_level + y * patch_size + x] = value;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imgproc::extract_patch;

    fn gradient_image(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([(x + 2 * y) as u8]))
    }

    #[test]
    fn test_identity_pose_gives_identity_warp() {
        let camera = PinholeCamera::new(800, 600, 400.0, 400.0, 400.0, 300.0);
        let px_ref = Vector2::new(400.0, 300.0);
        let f_ref = camera.unproject(&px_ref);
        let a = warp_matrix_affine(&camera, &px_ref, &f_ref, 2.0, &SE3::identity(), 4);
        approx::assert_relative_eq!(a, Matrix2::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_search_level_from_determinant() {
        assert_eq!(best_search_level(&Matrix2::identity(), 2), 0);
        // det 4 → one halving lands at 1.
        assert_eq!(best_search_level(&(Matrix2::identity() * 2.0), 2), 1);
        // det 64 → clamped at 2.
        assert_eq!(best_search_level(&(Matrix2::identity() * 8.0), 2), 2);
    }

    #[test]
    fn test_identity_warp_reproduces_level0_patch() {
        let img = gradient_image(200, 200);
        let px_ref = Vector2::new(100.0, 100.0);

        let mut warped = vec![0.0f32; 3 * 64];
        assert!(warp_affine(
            &Matrix2::identity(),
            &img,
            &px_ref,
            0,
            0,
            4,
            &mut warped
        ));

        let mut direct = vec![0.0f32; 64];
        extract_patch(&img, &px_ref, &mut direct, 0, 8);

        for (w, d) in warped[..64].iter().zip(direct.iter()) {
            assert!((w - d).abs() <= 1.0, "warped {} direct {}", w, d);
        }
    }

    #[test]
    fn test_singular_warp_rejected() {
        let img = gradient_image(64, 64);
        let mut patch = vec![0.0f32; 3 * 64];
        let singular = Matrix2::new(1.0, 1.0, 1.0, 1.0);
        assert!(!warp_affine(
            &singular,
            &img,
            &Vector2::new(32.0, 32.0),
            0,
            0,
            4,
            &mut patch
        ));
    }
}
