//! Binary crack classifier.
//!
//! The network is an opaque collaborator behind [`Classifier`]. The rest of
//! this module prepares its input and turns its output into a verdict.

mod rten_model;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use serde::Deserialize;

pub use rten_model::RtenClassifier;

/// Shape the model expects its input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, width * height]`
    #[default]
    Flat,
    /// `[1, height, width, 1]`
    Nhwc,
}

pub trait Classifier: Send + Sync {
    /// Crack probability in `[0, 1]` for a prepared input.
    fn predict(&self, input: &[f32]) -> anyhow::Result<f32>;
}

/// Grayscale, scaled to `[0, 1]`, flattened row-major.
pub fn prepare_input(crop: &DynamicImage) -> Vec<f32> {
    crop.to_luma8()
        .pixels()
        .map(|p| p[0] as f32 / 255.0)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub probability: f32,
    pub crack: bool,
}

#[derive(Clone)]
pub struct CrackClassifier {
    model: Arc<dyn Classifier>,
    threshold: f32,
}

impl CrackClassifier {
    pub fn new(model: Arc<dyn Classifier>, threshold: f32) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, crop: &DynamicImage) -> anyhow::Result<Verdict> {
        let probability = self.model.predict(&prepare_input(crop))?;
        if !probability.is_finite() {
            anyhow::bail!("classifier returned a non-finite probability");
        }
        Ok(Verdict {
            probability,
            crack: probability > self.threshold,
        })
    }
}

impl std::fmt::Debug for CrackClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrackClassifier")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

/// Loads the model file on first use and keeps it for the life of the process.
/// A failed load is retried on the next prediction.
pub struct LazyModel {
    path: PathBuf,
    layout: InputLayout,
    width: u32,
    height: u32,
    // Using Arc so the lock is released before inference runs
    engine: Mutex<Option<Arc<RtenClassifier>>>,
}

impl LazyModel {
    pub fn new(path: impl Into<PathBuf>, layout: InputLayout, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            layout,
            width,
            height,
            engine: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.lock().map(|e| e.is_some()).unwrap_or(false)
    }

    fn engine(&self) -> anyhow::Result<Arc<RtenClassifier>> {
        let mut engine_guard = self
            .engine
            .lock()
            .map_err(|_| anyhow::anyhow!("classifier lock poisoned"))?;
        if let Some(engine) = engine_guard.as_ref() {
            return Ok(engine.clone());
        }
        log::info!("loading classifier from {:?}", self.path);
        let engine = Arc::new(RtenClassifier::load(
            &self.path,
            self.layout,
            self.width,
            self.height,
        )?);
        *engine_guard = Some(engine.clone());
        Ok(engine)
    }
}

impl Classifier for LazyModel {
    fn predict(&self, input: &[f32]) -> anyhow::Result<f32> {
        self.engine()?.predict(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    struct Fixed(f32);

    impl Classifier for Fixed {
        fn predict(&self, _input: &[f32]) -> anyhow::Result<f32> {
            Ok(self.0)
        }
    }

    #[test]
    fn input_is_normalised_and_row_major() {
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(1, 0, Luma([255]));
        img.put_pixel(0, 1, Luma([51]));
        let input = prepare_input(&DynamicImage::ImageLuma8(img));
        assert_eq!(input, vec![0.0, 1.0, 0.2, 0.0]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let crop = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let at = CrackClassifier::new(Arc::new(Fixed(0.5)), 0.5);
        assert!(!at.classify(&crop).unwrap().crack);
        let above = CrackClassifier::new(Arc::new(Fixed(0.51)), 0.5);
        assert!(above.classify(&crop).unwrap().crack);
    }

    #[test]
    fn missing_model_file_fails_without_caching() {
        let model = LazyModel::new("does/not/exist.rten", InputLayout::Flat, 4, 4);
        assert!(model.predict(&[0.0; 16]).is_err());
        assert!(!model.is_loaded());
    }
}
