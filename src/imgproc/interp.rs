//! Bilinear sampling and patch extraction.
//!
//! Patches at pyramid level `l` are sampled from the full-resolution image
//! with pixel strides of `2^l`; the interpolation anchor is aligned to the
//! stride so that the four bilinear weights are shared by every pixel of
//! the patch.

use image::GrayImage;
use nalgebra::Vector2;

#[inline]
fn pixel(img: &GrayImage, x: i64, y: i64) -> Option<f32> {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return None;
    }
    Some(img.get_pixel(x as u32, y as u32)[0] as f32)
}

/// Bilinear sample at a subpixel position.
///
/// Returns 0 when the 2×2 support leaves the image.
pub fn bilinear(img: &GrayImage, u: f32, v: f32) -> f32 {
    let x = u.floor() as i64;
    let y = v.floor() as i64;
    let wx = u - x as f32;
    let wy = v - y as f32;

    match (
        pixel(img, x, y),
        pixel(img, x + 1, y),
        pixel(img, x, y + 1),
        pixel(img, x + 1, y + 1),
    ) {
        (Some(tl), Some(tr), Some(bl), Some(br)) => {
            (1.0 - wx) * (1.0 - wy) * tl + wx * (1.0 - wy) * tr + (1.0 - wx) * wy * bl + wx * wy * br
        }
        _ => 0.0,
    }
}

/// Extract a `patch_size`² patch around `uv` at pyramid level `level`,
/// writing into the `level`-th slice of `patch`.
///
/// `patch` is a flat buffer holding one `patch_size`² slice per level,
/// indexed `patch_area·level + row·patch_size + col`. Samples whose 2×2
/// support leaves the image are written as 0.
pub fn extract_patch(
    img: &GrayImage,
    uv: &Vector2<f64>,
    patch: &mut [f32],
    level: usize,
    patch_size: usize,
) {
    let scale = 1i64 << level;
    let half = (patch_size / 2) as i64;
    let patch_area = patch_size * patch_size;

    let u_i = (uv.x / scale as f64).floor() as i64 * scale;
    let v_i = (uv.y / scale as f64).floor() as i64 * scale;
    let subpix_u = ((uv.x - u_i as f64) / scale as f64) as f32;
    let subpix_v = ((uv.y - v_i as f64) / scale as f64) as f32;
    let w_tl = (1.0 - subpix_u) * (1.0 - subpix_v);
    let w_tr = subpix_u * (1.0 - subpix_v);
    let w_bl = (1.0 - subpix_u) * subpix_v;
    let w_br = subpix_u * subpix_v;

    for row in 0..patch_size {
        let y = v_i + (row as i64 - half) * scale;
        for col in 0..patch_size {
            let x = u_i + (col as i64 - half) * scale;
            let value = match (
                pixel(img, x, y),
                pixel(img, x + scale, y),
                pixel(img, x, y + scale),
                pixel(img, x + scale, y + scale),
            ) {
                (Some(tl), Some(tr), Some(bl), Some(br)) => {
                    w_tl * tl + w_tr * tr + w_bl * bl + w_br * br
                }
                _ => 0.0,
            };
            patch[patch_area * level + row * patch_size + col] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| image::Luma([x as u8]))
    }

    #[test]
    fn test_bilinear_at_integer_position() {
        let img = gradient_image(32, 32);
        assert_eq!(bilinear(&img, 10.0, 5.0), 10.0);
    }

    #[test]
    fn test_bilinear_halfway() {
        let img = gradient_image(32, 32);
        assert_eq!(bilinear(&img, 10.5, 5.0), 10.5);
    }

    #[test]
    fn test_bilinear_out_of_bounds_is_zero() {
        let img = gradient_image(8, 8);
        assert_eq!(bilinear(&img, -2.0, 1.0), 0.0);
        assert_eq!(bilinear(&img, 7.5, 1.0), 0.0);
    }

    #[test]
    fn test_patch_level0_matches_image() {
        let img = gradient_image(64, 64);
        let mut patch = vec![0.0f32; 64];
        extract_patch(&img, &Vector2::new(32.0, 32.0), &mut patch, 0, 8);
        // Integer anchor: every row is the horizontal gradient 28..36.
        for row in 0..8 {
            for col in 0..8 {
                assert_eq!(patch[row * 8 + col], (28 + col) as f32);
            }
        }
    }

    #[test]
    fn test_patch_level_indexing() {
        let img = gradient_image(64, 64);
        let mut patch = vec![0.0f32; 3 * 64];
        extract_patch(&img, &Vector2::new(32.0, 32.0), &mut patch, 1, 8);
        // Level-1 slice occupies [64, 128); stride-2 horizontal gradient.
        assert_eq!(patch[64], 24.0);
        assert_eq!(patch[64 + 1], 26.0);
        assert!(patch[..64].iter().all(|&v| v == 0.0));
        assert!(patch[128..].iter().all(|&v| v == 0.0));
    }
}
