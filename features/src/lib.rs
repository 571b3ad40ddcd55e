pub mod fast;
pub mod harris;
pub mod matcher;
pub mod orb;
pub mod ransac;

pub use fast::*;
pub use harris::*;
pub use matcher::*;
pub use orb::*;
pub use ransac::*;

use cv_core::{Descriptors, Error, KeyPoint};
use cv_imgproc::{convert_rgb_to_gray, resize_rgb_by, Interpolation};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use cv_core::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Target working-resolution area in megapixels.
    pub work_megapix: f64,
    pub n_features: usize,
    pub n_levels: usize,
    pub scale_factor: f32,
    pub fast_threshold: u8,
    pub edge_threshold: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            work_megapix: 0.6,
            n_features: 1500,
            n_levels: 5,
            scale_factor: 1.3,
            fast_threshold: 20,
            edge_threshold: 31,
        }
    }
}

impl FeatureConfig {
    pub fn with_work_megapix(mut self, megapix: f64) -> Self {
        self.work_megapix = megapix;
        self
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }
}

/// Keypoints and descriptors of one image at working resolution.
#[derive(Debug, Clone)]
pub struct ImageFeatures {
    pub img_idx: usize,
    pub width: u32,
    pub height: u32,
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Descriptors,
}

impl ImageFeatures {
    pub fn empty(img_idx: usize, width: u32, height: u32) -> Self {
        Self {
            img_idx,
            width,
            height,
            keypoints: Vec::new(),
            descriptors: Descriptors::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Uniform downscale factor bringing a `width × height` image to roughly
/// `work_megapix` megapixels; never upscales.
pub fn work_scale(width: u32, height: u32, work_megapix: f64) -> f64 {
    let area = width as f64 * height as f64;
    if area <= 0.0 || work_megapix <= 0.0 {
        return 1.0;
    }
    (work_megapix * 1e6 / area).sqrt().min(1.0)
}

/// Features of every input plus the scale they were computed at.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub work_scale: f64,
    pub features: Vec<ImageFeatures>,
}

/// Computes the working scale from the first image, resizes every image by
/// it and extracts ORB features in parallel.
pub fn find_features(images: &[RgbImage], config: &FeatureConfig) -> Result<FeatureSet> {
    let first = images
        .first()
        .ok_or_else(|| Error::invalid_input("no images to extract features from"))?;
    let scale = work_scale(first.width(), first.height(), config.work_megapix);
    info!(work_scale = scale, images = images.len(), "finding features");

    let orb = Orb::from_config(config);
    let features: Vec<ImageFeatures> = images
        .par_iter()
        .enumerate()
        .map(|(idx, img)| {
            let work = if scale < 1.0 {
                resize_rgb_by(img, scale, Interpolation::Linear)
            } else {
                img.clone()
            };
            let gray = convert_rgb_to_gray(&work);
            let (keypoints, descriptors) = orb.detect_and_compute(&gray);
            debug!(image = idx, keypoints = keypoints.len(), "features found");
            ImageFeatures {
                img_idx: idx,
                width: work.width(),
                height: work.height(),
                keypoints,
                descriptors,
            }
        })
        .collect();

    Ok(FeatureSet {
        work_scale: scale,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_scale_never_upscales() {
        assert_eq!(work_scale(640, 480, 0.6), 1.0);
        let s = work_scale(4000, 3000, 0.6);
        assert!(s < 1.0);
        let area = (4000.0 * s) * (3000.0 * s);
        assert!((area - 0.6e6).abs() / 0.6e6 < 0.01);
    }

    #[test]
    fn find_features_requires_input() {
        assert!(matches!(
            find_features(&[], &FeatureConfig::default()),
            Err(Error::InvalidInput(_))
        ));
    }
}
