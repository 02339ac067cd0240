//! Shi-Tomasi corner score: minimum eigenvalue of the image-gradient
//! structure tensor accumulated over an 8×8 box.

use image::GrayImage;

const HALFBOX_SIZE: i64 = 4;

/// Corner response at pixel (u, v); 0 when the box support leaves the image.
pub fn shi_tomasi(img: &GrayImage, u: f64, v: f64) -> f64 {
    let u = u as i64;
    let v = v as i64;
    let box_size = 2 * HALFBOX_SIZE;
    let box_area = (box_size * box_size) as f64;

    let x_min = u - HALFBOX_SIZE;
    let x_max = u + HALFBOX_SIZE;
    let y_min = v - HALFBOX_SIZE;
    let y_max = v + HALFBOX_SIZE;

    if x_min < 1
        || x_max >= img.width() as i64 - 1
        || y_min < 1
        || y_max >= img.height() as i64 - 1
    {
        return 0.0;
    }

    let mut d_xx = 0.0f64;
    let mut d_yy = 0.0f64;
    let mut d_xy = 0.0f64;
    for y in y_min..y_max {
        for x in x_min..x_max {
            let dx = img.get_pixel((x + 1) as u32, y as u32)[0] as f64
                - img.get_pixel((x - 1) as u32, y as u32)[0] as f64;
            let dy = img.get_pixel(x as u32, (y + 1) as u32)[0] as f64
                - img.get_pixel(x as u32, (y - 1) as u32)[0] as f64;
            d_xx += dx * dx;
            d_yy += dy * dy;
            d_xy += dx * dy;
        }
    }

    d_xx /= 2.0 * box_area;
    d_yy /= 2.0 * box_area;
    d_xy /= 2.0 * box_area;

    let trace = d_xx + d_yy;
    0.5 * (trace - (trace * trace - 4.0 * (d_xx * d_yy - d_xy * d_xy)).max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_scores_zero() {
        let img = GrayImage::from_pixel(32, 32, image::Luma([128]));
        assert_eq!(shi_tomasi(&img, 16.0, 16.0), 0.0);
    }

    #[test]
    fn test_border_scores_zero() {
        let img = GrayImage::from_fn(32, 32, |x, y| image::Luma([((x * y) % 255) as u8]));
        assert_eq!(shi_tomasi(&img, 2.0, 16.0), 0.0);
        assert_eq!(shi_tomasi(&img, 16.0, 30.0), 0.0);
    }

    #[test]
    fn test_corner_beats_edge() {
        // Dark/bright checkerboard corner at (16, 16) vs a vertical edge.
        let corner = GrayImage::from_fn(32, 32, |x, y| {
            image::Luma([if (x < 16) ^ (y < 16) { 200 } else { 20 }])
        });
        let edge = GrayImage::from_fn(32, 32, |x, _| image::Luma([if x < 16 { 200 } else { 20 }]));

        let corner_score = shi_tomasi(&corner, 16.0, 16.0);
        let edge_score = shi_tomasi(&edge, 16.0, 16.0);
        assert!(corner_score > edge_score);
        assert!(corner_score > 0.0);
    }
}
