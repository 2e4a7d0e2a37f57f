use image::{RgbImage, imageops};
use serde::Deserialize;

/// Clockwise rotation applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "90")]
    Cw90,
    #[serde(rename = "180")]
    Cw180,
    #[serde(rename = "270")]
    Cw270,
}

/// Fixed geometric and photometric correction for the camera mounting.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct FrameCorrection {
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Added to every channel, clamped to `[0, 255]`.
    pub brightness: i32,
    /// Percent; negative lowers contrast, positive raises it.
    pub contrast: f32,
}

impl FrameCorrection {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, frame: RgbImage) -> RgbImage {
        if self.is_identity() {
            return frame;
        }
        let mut frame = match self.rotation {
            Rotation::None => frame,
            Rotation::Cw90 => imageops::rotate90(&frame),
            Rotation::Cw180 => {
                let mut frame = frame;
                imageops::rotate180_in_place(&mut frame);
                frame
            }
            Rotation::Cw270 => imageops::rotate270(&frame),
        };
        if self.flip_horizontal {
            imageops::flip_horizontal_in_place(&mut frame);
        }
        if self.flip_vertical {
            imageops::flip_vertical_in_place(&mut frame);
        }
        if self.contrast != 0.0 {
            imageops::colorops::contrast_in_place(&mut frame, self.contrast);
        }
        if self.brightness != 0 {
            imageops::colorops::brighten_in_place(&mut frame, self.brightness);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn marked() -> RgbImage {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([200, 0, 0]));
        img
    }

    #[test]
    fn identity_is_untouched() {
        let out = FrameCorrection::default().apply(marked());
        assert_eq!(out, marked());
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let correction = FrameCorrection {
            rotation: Rotation::Cw90,
            ..Default::default()
        };
        let out = correction.apply(marked());
        assert_eq!(out.dimensions(), (2, 4));
        // top-left ends up top-right after a clockwise turn
        assert_eq!(*out.get_pixel(1, 0), Rgb([200, 0, 0]));
    }

    #[test]
    fn flip_and_brighten() {
        let correction = FrameCorrection {
            flip_horizontal: true,
            brightness: 100,
            ..Default::default()
        };
        let out = correction.apply(marked());
        assert_eq!(*out.get_pixel(3, 0), Rgb([255, 100, 100]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([100, 100, 100]));
    }

    #[test]
    fn contrast_spreads_values() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([160, 160, 160]));
        let correction = FrameCorrection {
            contrast: 50.0,
            ..Default::default()
        };
        let out = correction.apply(img);
        assert!(out.get_pixel(0, 0)[0] < 100);
        assert!(out.get_pixel(1, 0)[0] > 160);
    }
}
