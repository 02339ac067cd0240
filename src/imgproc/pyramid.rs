//! Image pyramid: level 0 is the input, each further level a 2×2 box
//! downsample of the previous one.

use image::GrayImage;

/// Multi-level grayscale pyramid.
///
/// Single-channel 8-bit input is enforced by the `GrayImage` type.
#[derive(Debug, Clone)]
pub struct ImagePyramid {
    levels: Vec<GrayImage>,
}

impl ImagePyramid {
    /// Build a pyramid with `n_levels` levels (level 0 = `img`).
    ///
    /// Every level halves the previous one; `n_levels` must be at least 1
    /// and small enough that no level collapses below 1×1.
    pub fn build(img: GrayImage, n_levels: usize) -> Self {
        assert!(n_levels >= 1, "pyramid needs at least one level");
        let mut levels = Vec::with_capacity(n_levels);
        levels.push(img);
        for k in 1..n_levels {
            let prev = &levels[k - 1];
            assert!(
                prev.width() >= 2 && prev.height() >= 2,
                "image too small for {} pyramid levels",
                n_levels
            );
            levels.push(half_sample(prev));
        }
        Self { levels }
    }

    pub fn level(&self, k: usize) -> &GrayImage {
        &self.levels[k]
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Half-resolution 2×2 box downsample with round-to-nearest.
fn half_sample(src: &GrayImage) -> GrayImage {
    let w = src.width() / 2;
    let h = src.height() / 2;
    let mut dst = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let sum = src.get_pixel(2 * x, 2 * y)[0] as u16
                + src.get_pixel(2 * x + 1, 2 * y)[0] as u16
                + src.get_pixel(2 * x, 2 * y + 1)[0] as u16
                + src.get_pixel(2 * x + 1, 2 * y + 1)[0] as u16;
            dst.put_pixel(x, y, image::Luma([((sum + 2) / 4) as u8]));
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_image(w: u32, h: u32, v: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, image::Luma([v]))
    }

    #[test]
    fn test_level_dimensions_halve() {
        let pyr = ImagePyramid::build(constant_image(64, 48, 10), 4);
        assert_eq!(pyr.num_levels(), 4);
        assert_eq!((pyr.level(0).width(), pyr.level(0).height()), (64, 48));
        assert_eq!((pyr.level(1).width(), pyr.level(1).height()), (32, 24));
        assert_eq!((pyr.level(3).width(), pyr.level(3).height()), (8, 6));
    }

    #[test]
    fn test_constant_image_stays_constant() {
        let pyr = ImagePyramid::build(constant_image(32, 32, 77), 3);
        for k in 0..3 {
            assert!(pyr.level(k).pixels().all(|p| p[0] == 77));
        }
    }

    #[test]
    fn test_box_average() {
        let mut img = constant_image(4, 4, 0);
        img.put_pixel(0, 0, image::Luma([100]));
        img.put_pixel(1, 0, image::Luma([100]));
        img.put_pixel(0, 1, image::Luma([100]));
        img.put_pixel(1, 1, image::Luma([102]));
        let pyr = ImagePyramid::build(img, 2);
        // (100 + 100 + 100 + 102 + 2) / 4 = 101
        assert_eq!(pyr.level(1).get_pixel(0, 0)[0], 101);
    }

    #[test]
    #[should_panic]
    fn test_too_many_levels_panics() {
        ImagePyramid::build(constant_image(4, 4, 0), 4);
    }
}
