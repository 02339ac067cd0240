//! Debug overlay: the current submap drawn onto an RGB copy of the frame.

use image::RgbImage;
use nalgebra::Vector2;

use super::tracker::VisualTracker;

const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];
const WHITE: [u8; 3] = [255, 255, 255];

/// Errors below this render as well-tracked (green).
const GOOD_ERROR: f32 = 8000.0;

const MARK_RADIUS: i64 = 6;

impl VisualTracker {
    /// Overlay the tracked submap points (green when the photometric error
    /// is small, blue otherwise) and an update-frequency readout derived
    /// from `dt` seconds. Returns the composed image; `None` before the
    /// first frame or when nothing was tracked.
    pub fn display_keypatch(&mut self, dt: f64) -> Option<&RgbImage> {
        if self.submap.is_empty() {
            return None;
        }
        let frame = self.frame.as_ref()?;

        let mut marks: Vec<(Vector2<f64>, [u8; 3])> = Vec::with_capacity(self.submap.len());
        for i in 0..self.submap.len() {
            let Some(pt) = self.map.point(self.submap.points[i]) else {
                continue;
            };
            let pc = self.camera.project(&frame.pose_cw.transform_point(&pt.pos));
            let color = if self.submap.errors[i] < GOOD_ERROR {
                GREEN
            } else {
                BLUE
            };
            marks.push((pc, color));
        }

        let overlay = self.overlay.as_mut()?;
        for (pc, color) in marks {
            fill_circle(overlay, pc.x as i64, pc.y as i64, MARK_RADIUS, color);
        }

        let hz = if dt > 0.0 { (1.0 / dt) as i64 } else { 0 };
        draw_text(overlay, 20, 20, &format!("{} HZ", hz), WHITE);

        self.overlay.as_ref()
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: [u8; 3]) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, image::Rgb(color));
    }
}

fn fill_circle(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: [u8; 3]) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// 5×7 stencil glyphs for the frequency readout.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        _ => [0; 7],
    }
}

fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, color: [u8; 3]) {
    for (k, c) in text.chars().enumerate() {
        let rows = glyph(c);
        let gx = x + k as i64 * 6;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5 {
                if bits & (0x10 >> col) != 0 {
                    put(img, gx + col as i64, y + row as i64, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::GrayImage;
    use nalgebra::{Matrix3, Vector3};

    use crate::camera::PinholeCamera;
    use crate::config::VisualConfig;
    use crate::map::Point;
    use crate::state::NavState;
    use crate::tracking::VisualTracker;

    use super::*;

    #[test]
    fn test_no_overlay_without_tracked_points() {
        let mut tracker = VisualTracker::new(
            VisualConfig::default(),
            PinholeCamera::new(800, 600, 400.0, 400.0, 400.0, 300.0),
        );
        assert!(tracker.display_keypatch(0.1).is_none());
    }

    #[test]
    fn test_tracked_point_is_marked_green() {
        let mut tracker = VisualTracker::new(
            VisualConfig::default(),
            PinholeCamera::new(800, 600, 400.0, 400.0, 400.0, 300.0),
        );
        tracker.set_extrinsic(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Matrix3::identity(),
            &Vector3::zeros(),
        );

        // Stage a frame with a well-tracked submap entry by hand.
        let img = GrayImage::from_pixel(800, 600, image::Luma([100]));
        let mut state = NavState::new();
        let propagat = state.clone();
        let pid = tracker.map.next_point_id();
        let mut pt = Point::new(pid, Vector3::new(0.0, 0.0, 2.0));
        pt.value = 10.0;
        tracker.map.insert_point(pt);
        tracker.detect(&img, &[], &mut state, &propagat).unwrap();
        tracker.submap.push(pid, vec![0.0; 192], 0, 0.0, 0);

        let overlay = tracker.display_keypatch(0.1).expect("overlay exists");
        assert_eq!(overlay.get_pixel(400, 300).0, GREEN);
        // The frequency readout starts with a "1" glyph ("10 HZ").
        assert_eq!(overlay.get_pixel(22, 20).0, WHITE);
    }

    #[test]
    fn test_glyphs_cover_readout_alphabet() {
        for c in "0123456789HZ".chars() {
            assert!(glyph(c).iter().any(|&row| row != 0));
        }
        assert!(glyph(' ').iter().all(|&row| row == 0));
    }
}
