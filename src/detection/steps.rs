use crate::detection::{keypoints, preprocessing};
use crate::pipeline::{MetadataValue, PipelineData, PipelineStep};
use anyhow::Result;
use image::{DynamicImage, GrayImage};

pub const KEYPOINTS_KEY: &str = "keypoints";
pub const EDGE_PIXELS_KEY: &str = "edge_pixels";

/// Apply `f` to the grayscale view of every item, keeping original and metadata.
fn map_gray(data: Vec<PipelineData>, f: impl Fn(&GrayImage) -> GrayImage) -> Vec<PipelineData> {
    data.into_iter()
        .map(|item| {
            let out = f(&item.image.to_luma8());
            item.with_image(DynamicImage::ImageLuma8(out))
        })
        .collect()
}

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let gray = preprocessing::to_grayscale(&item.image);
                item.with_image(DynamicImage::ImageLuma8(gray))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(map_gray(data, |gray| preprocessing::apply_blur(gray, self.sigma)))
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

pub struct LogTransformStep;

impl PipelineStep for LogTransformStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(map_gray(data, preprocessing::log_transform))
    }

    fn name(&self) -> &str {
        "Log Transform"
    }
}

pub struct BilateralStep {
    pub window_size: u32,
    pub sigma_color: f32,
    pub sigma_spatial: f32,
}

impl PipelineStep for BilateralStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(map_gray(data, |gray| {
            preprocessing::bilateral(gray, self.window_size, self.sigma_color, self.sigma_spatial)
        }))
    }

    fn name(&self) -> &str {
        "Bilateral Filter"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(map_gray(data, |gray| {
            preprocessing::detect_edges(gray, self.low_threshold, self.high_threshold)
        }))
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

/// Morphological close; records the number of edge pixels that survive.
pub struct ClosingStep {
    pub radius: u8,
}

impl PipelineStep for ClosingStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let closed = preprocessing::close_edges(&item.image.to_luma8(), self.radius);
                let edge_pixels = preprocessing::count_foreground(&closed);
                item.with_image(DynamicImage::ImageLuma8(closed))
                    .with_metadata(EDGE_PIXELS_KEY, MetadataValue::Count(edge_pixels))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Morphological Close"
    }
}

/// Find corners on the edge mask. The image is passed through unchanged.
pub struct KeypointDetectionStep {
    pub threshold: u8,
    pub max_keypoints: usize,
}

impl PipelineStep for KeypointDetectionStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let found =
                    keypoints::detect_keypoints(&item.image.to_luma8(), self.threshold, self.max_keypoints);
                log::debug!("found {} keypoints", found.len());
                item.with_metadata(KEYPOINTS_KEY, MetadataValue::Points(found))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Keypoint Detection"
    }
}

/// What the keypoint overlay is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCanvas {
    /// The closed edge mask itself
    Mask,
    /// The pipeline input with edges tinted red
    Original,
}

pub struct KeypointOverlayStep {
    pub canvas: OverlayCanvas,
}

impl PipelineStep for KeypointOverlayStep {
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            let mask = item.image.to_luma8();
            let mut canvas = match self.canvas {
                OverlayCanvas::Mask => DynamicImage::ImageLuma8(mask).to_rgb8(),
                OverlayCanvas::Original => {
                    if item.original.width() != mask.width() || item.original.height() != mask.height() {
                        anyhow::bail!(
                            "edge mask is {}x{} but the input is {}x{}",
                            mask.width(),
                            mask.height(),
                            item.original.width(),
                            item.original.height()
                        );
                    }
                    keypoints::tint_edges(&item.original, &mask)
                }
            };
            if let Some(points) = item.get_points(KEYPOINTS_KEY) {
                keypoints::draw_keypoints(&mut canvas, points);
            }
            result.push(item.with_image(DynamicImage::ImageRgb8(canvas)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Keypoint Overlay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn closing_records_edge_count() {
        let mut mask = GrayImage::new(400, 300);
        for x in 0..400 {
            mask.put_pixel(x, 150, Luma([255]));
        }
        let data = vec![PipelineData::from_image(DynamicImage::ImageLuma8(mask))];

        let out = ClosingStep { radius: 2 }.process(data).unwrap();

        assert_eq!(out[0].get_count(EDGE_PIXELS_KEY), Some(400));
    }

    #[test]
    fn full_frame_count_is_exact() {
        let mask = GrayImage::from_pixel(300, 300, Luma([255]));
        let data = vec![PipelineData::from_image(DynamicImage::ImageLuma8(mask))];

        let out = ClosingStep { radius: 1 }.process(data).unwrap();

        assert_eq!(out[0].get_count(EDGE_PIXELS_KEY), Some(90_000));
    }
}
