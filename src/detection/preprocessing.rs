use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use imageproc::morphology;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Stretch dark values: `log(1 + p) / log(1 + max) * 255`.
/// An all-black image stays black.
pub fn log_transform(img: &GrayImage) -> GrayImage {
    let max = img.pixels().map(|p| p[0]).max().unwrap_or(0);
    if max == 0 {
        return img.clone();
    }
    let scale = 255.0 / (1.0 + max as f32).ln();
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y)[0] as f32;
        Luma([((1.0 + p).ln() * scale).min(255.0) as u8])
    })
}

/// Edge-preserving smoothing
pub fn bilateral(img: &GrayImage, window_size: u32, sigma_color: f32, sigma_spatial: f32) -> GrayImage {
    bilateral_filter(img, window_size, sigma_color, sigma_spatial)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold.max(low_threshold))
}

/// Morphological close with a square kernel of side `2 * radius + 1`.
pub fn close_edges(img: &GrayImage, radius: u8) -> GrayImage {
    morphology::close(img, Norm::LInf, radius)
}

pub fn count_foreground(img: &GrayImage) -> u32 {
    img.pixels().filter(|p| p[0] > 0).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_transform_keeps_black_black() {
        let img = GrayImage::new(8, 8);
        assert!(log_transform(&img).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn log_transform_maps_max_to_white() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([10]));
        img.put_pixel(0, 0, Luma([100]));
        let out = log_transform(&img);
        assert!(out.get_pixel(0, 0)[0] >= 254);
        // dark values are lifted
        assert!(out.get_pixel(1, 1)[0] > 10);
    }

    #[test]
    fn close_fills_small_gaps() {
        let mut img = GrayImage::new(20, 5);
        for x in (0..20).filter(|x| *x != 10) {
            img.put_pixel(x, 2, Luma([255]));
        }
        let closed = close_edges(&img, 2);
        assert_eq!(closed.get_pixel(10, 2)[0], 255);
    }
}
