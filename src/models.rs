use image::DynamicImage;
use serde::Deserialize;

/// Fixed pixel rectangle cut out of every raw frame before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            x: 187,
            y: 245,
            width: 158,
            height: 158,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("region {roi:?} does not fit in a {frame_width}x{frame_height} frame")]
pub struct RoiError {
    pub roi: Roi,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Roi {
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }

    /// Cut the region out of `img`. Never clamps: a frame that does not fully
    /// contain the region is an error.
    pub fn crop(&self, img: &DynamicImage) -> Result<DynamicImage, RoiError> {
        if !self.fits(img.width(), img.height()) {
            return Err(RoiError {
                roi: *self,
                frame_width: img.width(),
                frame_height: img.height(),
            });
        }
        Ok(img.crop_imm(self.x, self.y, self.width, self.height))
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A corner found on the closed edge mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Summary of one run of the crack pipeline.
#[derive(Debug, Clone, Default)]
pub struct CrackAnalysis {
    pub keypoints: Vec<Keypoint>,
    pub edge_pixels: u32,
    pub total_pixels: u32,
}

impl CrackAnalysis {
    pub fn edge_density(&self) -> f32 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.edge_pixels as f32 / self.total_pixels as f32
    }
}
