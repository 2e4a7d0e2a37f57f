use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbImage;

use super::FrameSource;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Replays a still image, or every image of a directory in name order,
/// as if it were a camera.
#[derive(Debug)]
pub struct ImageFolderSource {
    path: PathBuf,
    looped: bool,
    frames: Vec<PathBuf>,
    next: usize,
}

impl ImageFolderSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            looped: true,
            frames: Vec::new(),
            next: 0,
        }
    }

    /// Stop after the last image instead of starting over.
    pub fn once(mut self) -> Self {
        self.looped = false;
        self
    }

    fn list_frames(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        let mut frames: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("Failed to read frame directory {:?}", path))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        frames.sort();
        Ok(frames)
    }
}

impl FrameSource for ImageFolderSource {
    fn open(&mut self) -> anyhow::Result<()> {
        self.frames = Self::list_frames(&self.path)?;
        self.next = 0;
        if self.frames.is_empty() {
            anyhow::bail!("no images found in {:?}", self.path);
        }
        log::info!("replaying {} frame(s) from {:?}", self.frames.len(), self.path);
        Ok(())
    }

    fn read_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
        if self.next >= self.frames.len() {
            if !self.looped || self.frames.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }
        let path = &self.frames[self.next];
        self.next += 1;
        let frame = image::open(path)
            .with_context(|| format!("Failed to decode frame {:?}", path))?
            .to_rgb8();
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.frames.clear();
        self.next = 0;
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
