pub mod keypoints;
pub mod preprocessing;
pub mod steps;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use image::DynamicImage;
use serde::Deserialize;

use crate::models::CrackAnalysis;
use crate::pipeline::Pipeline;
use steps::*;

pub use steps::OverlayCanvas;

/// Tunables of the crack pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrackParams {
    pub blur_sigma: f32,
    pub bilateral_window: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_spatial: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Closing kernel is `2 * close_radius + 1` pixels square.
    pub close_radius: u8,
    pub fast_threshold: u8,
    pub max_keypoints: usize,
}

impl Default for CrackParams {
    fn default() -> Self {
        Self {
            // sigma of a 5x5 kernel
            blur_sigma: 1.1,
            // A wider window or sigma washes thin cracks out before Canny
            bilateral_window: 5,
            bilateral_sigma_color: 10.0,
            bilateral_sigma_spatial: 10.0,
            canny_low: 20.0,
            canny_high: 20.0,
            close_radius: 2,
            fast_threshold: 20,
            max_keypoints: 2,
        }
    }
}

/// gray → blur → log → bilateral → canny → close → keypoints → overlay
pub fn build_crack_pipeline(params: &CrackParams, canvas: OverlayCanvas) -> Pipeline {
    Pipeline::new()
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(BlurStep {
            sigma: params.blur_sigma,
        }))
        .add_step(Arc::new(LogTransformStep))
        .add_step(Arc::new(BilateralStep {
            window_size: params.bilateral_window,
            sigma_color: params.bilateral_sigma_color,
            sigma_spatial: params.bilateral_sigma_spatial,
        }))
        .add_step(Arc::new(EdgeDetectionStep {
            low_threshold: params.canny_low,
            high_threshold: params.canny_high,
        }))
        .add_step(Arc::new(ClosingStep {
            radius: params.close_radius,
        }))
        .add_step(Arc::new(KeypointDetectionStep {
            threshold: params.fast_threshold,
            max_keypoints: params.max_keypoints,
        }))
        .add_step(Arc::new(KeypointOverlayStep { canvas }))
}

/// Run the crack pipeline once and return the overlay image with its summary.
pub fn analyze(
    img: &DynamicImage,
    params: &CrackParams,
    canvas: OverlayCanvas,
    debug_dir: Option<PathBuf>,
) -> anyhow::Result<(DynamicImage, CrackAnalysis)> {
    let mut pipeline = build_crack_pipeline(params, canvas);
    if let Some(dir) = debug_dir {
        pipeline = pipeline.with_debug(dir)?;
    }
    let item = pipeline
        .run(img.clone())?
        .into_iter()
        .next()
        .context("crack pipeline produced no output")?;
    let analysis = CrackAnalysis {
        keypoints: item.get_points(KEYPOINTS_KEY).map(<[_]>::to_vec).unwrap_or_default(),
        edge_pixels: item.get_count(EDGE_PIXELS_KEY).unwrap_or(0),
        total_pixels: img.width() * img.height(),
    };
    Ok((item.image, analysis))
}

/// Highlighted derivative of an ROI crop: edges tinted red, keypoints circled.
pub fn highlight(crop: &DynamicImage, params: &CrackParams) -> anyhow::Result<DynamicImage> {
    analyze(crop, params, OverlayCanvas::Original, None).map(|(image, _)| image)
}
