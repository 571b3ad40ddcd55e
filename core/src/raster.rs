use image::{GrayImage, RgbImage};

pub use image::{GrayImage as MaskImage, Luma, Rgb};

/// BT.601 luma of an RGB pixel, rounded like an 8-bit grayscale conversion.
pub fn luma(p: &[u8]) -> u8 {
    let y = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// 3-channel signed 16-bit image, the precision used while blending.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<i16>,
}

impl SignedImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn from_rgb(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().iter().map(|&v| v as i16).collect(),
        }
    }

    /// Saturating conversion back to 8 bits (negative values clamp to 0).
    pub fn to_rgb(&self) -> RgbImage {
        let data = self.data.iter().map(|&v| v.clamp(0, 255) as u8).collect();
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn pixel(&self, x: u32, y: u32) -> [i16; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Row-major interleaved float image used for pyramids and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl FloatImage {
    pub fn zeros(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width as usize * height as usize * channels],
        }
    }

    pub fn from_signed(img: &SignedImage) -> Self {
        Self {
            width: img.width,
            height: img.height,
            channels: 3,
            data: img.data.iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn from_rgb(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            channels: 3,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// Single-channel weights in `[0, 1]` from an 8-bit mask.
    pub fn from_mask(mask: &GrayImage) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            channels: 1,
            data: mask.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        let data = self
            .data
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels
    }

    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width as usize + x) * self.channels + c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_of_primaries() {
        assert_eq!(luma(&[0, 0, 0]), 0);
        assert_eq!(luma(&[255, 255, 255]), 255);
        assert_eq!(luma(&[255, 0, 0]), 76);
        assert_eq!(luma(&[0, 0, 2]), 0);
    }

    #[test]
    fn signed_image_clamps_not_wraps() {
        let img = SignedImage {
            width: 1,
            height: 1,
            data: vec![-20, 300, 128],
        };
        let rgb = img.to_rgb();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 255, 128]);
    }

    #[test]
    fn float_from_mask_is_normalized() {
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(1, 0, Luma([255]));
        let w = FloatImage::from_mask(&mask);
        assert_eq!(w.data, vec![0.0, 1.0]);
    }
}
