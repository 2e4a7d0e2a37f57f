pub mod capture;
pub mod classify;
pub mod config;
pub mod core;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod scan;

pub use config::Config;
pub use models::{CrackAnalysis, Keypoint, Roi, RoiError};
pub use pipeline::{MetadataValue, Pipeline, PipelineData, PipelineStep};

#[cfg(feature = "gui")]
pub mod gui;
