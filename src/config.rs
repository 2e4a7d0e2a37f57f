//! Runtime configuration, read from a TOML file.
//!
//! Every field has a default so an empty (or missing) file is a valid
//! configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::capture::FrameCorrection;
use crate::classify::InputLayout;
use crate::detection::CrackParams;
use crate::models::Roi;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "crackcam.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub camera: CameraConfig,
    pub roi: Roi,
    pub pipeline: CrackParams,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub image_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("nml.db"),
            image_root: PathBuf::from("nml_img"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Image file or directory replayed as the camera feed.
    pub source: Option<PathBuf>,
    pub frame_interval_ms: u64,
    pub correction: FrameCorrection,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: None,
            frame_interval_ms: 33,
            correction: FrameCorrection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub input_layout: InputLayout,
    pub threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/crack_classifier.rten"),
            input_layout: InputLayout::Flat,
            threshold: 0.5,
        }
    }
}

impl Config {
    /// Load `path` when given, otherwise `crackcam.toml` if it exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    log::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::parse(&text).with_context(|| format!("Invalid config file {:?}", path))?;
        log::info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.roi.width == 0 || self.roi.height == 0 {
            anyhow::bail!("roi width and height must be non-zero");
        }
        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            anyhow::bail!(
                "classifier threshold must lie in [0, 1], got {}",
                self.classifier.threshold
            );
        }
        if self.pipeline.canny_high < self.pipeline.canny_low {
            anyhow::bail!("pipeline canny_high must not be below canny_low");
        }
        Ok(())
    }
}
