use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::corners::corners_fast9;
use imageproc::drawing::draw_hollow_circle_mut;

use crate::models::Keypoint;

const KEYPOINT_RADIUS: i32 = 4;
const KEYPOINT_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const EDGE_TINT: Rgb<u8> = Rgb([255, 0, 0]);

/// FAST-9 corners on `mask`, strongest first, at most `max_keypoints`.
pub fn detect_keypoints(mask: &GrayImage, threshold: u8, max_keypoints: usize) -> Vec<Keypoint> {
    let mut corners = corners_fast9(mask, threshold);
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners
        .into_iter()
        .take(max_keypoints)
        .map(|c| Keypoint {
            x: c.x,
            y: c.y,
            score: c.score,
        })
        .collect()
}

pub fn draw_keypoints(canvas: &mut RgbImage, keypoints: &[Keypoint]) {
    for kp in keypoints {
        draw_hollow_circle_mut(
            canvas,
            (kp.x as i32, kp.y as i32),
            KEYPOINT_RADIUS,
            KEYPOINT_COLOUR,
        );
    }
}

/// Paint every foreground pixel of `mask` red on top of `base`.
/// `mask` and `base` must have the same size.
pub fn tint_edges(base: &DynamicImage, mask: &GrayImage) -> RgbImage {
    let mut canvas = base.to_rgb8();
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] > 0 && x < canvas.width() && y < canvas.height() {
            canvas.put_pixel(x, y, EDGE_TINT);
        }
    }
    canvas
}
