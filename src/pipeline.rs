use anyhow::{Context, Result};
use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::Keypoint;

/// Data that flows through the pipeline.
/// Each PipelineData is one working image plus whatever the steps recorded about it.
#[derive(Clone)]
pub struct PipelineData {
    /// Current working image (grayscale or colour depending on the step)
    pub image: DynamicImage,

    /// The image the pipeline started from, shared between all items
    pub original: Arc<DynamicImage>,

    /// Metadata recorded by steps (e.g. "edge_pixels", "keypoints")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Count(u32),
    Points(Vec<Keypoint>),
}

impl PipelineData {
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self {
            image,
            original,
            metadata: HashMap::new(),
        }
    }

    /// Replace the working image, keeping the original and all metadata.
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image = image;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_count(&self, key: &str) -> Option<u32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Count(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_points(&self, key: &str) -> Option<&[Keypoint]> {
        match self.metadata.get(key) {
            Some(MetadataValue::Points(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data.
    /// Steps can split (1 → many), filter (many → fewer) or transform (many → many).
    fn process(&self, data: Vec<PipelineData>) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            debug: None,
        }
    }

    /// Enable debug mode: every intermediate image is written below `output_dir`.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                anyhow::bail!("Debug directory is not empty: {}", output_dir.display());
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step on `input`.
    pub fn run(&self, input: DynamicImage) -> Result<Vec<PipelineData>> {
        self.run_partial(input, self.steps.len())
    }

    /// Run only the first `num_steps` steps.
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<Vec<PipelineData>> {
        if let Some(debug) = &self.debug {
            save_debug_images(&debug.output_dir, "00_input", std::slice::from_ref(&input))?;
        }

        let mut data = vec![PipelineData::from_image(input)];

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            log::debug!("running step: {} ({} items)", step.name(), data.len());
            data = step
                .process(data)
                .with_context(|| format!("Pipeline step '{}' failed", step.name()))?;

            if let Some(debug) = &self.debug {
                let step_dir_name = format!(
                    "{:02}_{}",
                    step_idx + 1,
                    step.name().to_lowercase().replace(' ', "_")
                );
                let images: Vec<DynamicImage> = data.iter().map(|d| d.image.clone()).collect();
                save_debug_images(&debug.output_dir, &step_dir_name, &images)?;
            }

            log::debug!("  → {} items", data.len());
        }

        Ok(data)
    }
}

fn save_debug_images(root: &Path, step_dir_name: &str, images: &[DynamicImage]) -> Result<()> {
    let step_dir = root.join(step_dir_name);
    std::fs::create_dir_all(&step_dir)?;
    for (idx, image) in images.iter().enumerate() {
        let output_path = step_dir.join(format!("{:02}.png", idx + 1));
        image
            .save(&output_path)
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
    }
    log::debug!("  debug: saved {} images to {}/", images.len(), step_dir_name);
    Ok(())
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
