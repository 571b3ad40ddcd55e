//! The advanced stitching pipeline, stage by stage.
//!
//! features → pairwise matches → camera estimate → bundle adjustment →
//! wave correction → spherical composite. Each stage is a public function
//! so callers can inspect intermediate results.

use crate::bundle_adjust::BundleAdjustConfig;
use crate::camera_estimator::CameraEstimate;
use crate::compositor::Composite;
use crate::wave_correct::WaveCorrectKind;
use crate::Result;
use cv_core::{orthonormality_error, CameraParams, PairwiseMatches};
use cv_features::{BestOf2NearestMatcher, FeatureConfig, FeatureSet, ImageFeatures, MatcherConfig};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    pub features: FeatureConfig,
    pub matcher: MatcherConfig,
    /// Minimum pair confidence for estimation and adjustment. Deliberately
    /// permissive so top and bottom shots stay in the graph.
    pub conf_thresh: f64,
    pub wave_correct: WaveCorrectKind,
    /// Blend width as a percentage of the composite's diagonal scale.
    pub blend_strength: f64,
    pub max_ba_iterations: usize,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            matcher: MatcherConfig::default(),
            conf_thresh: 0.15,
            wave_correct: WaveCorrectKind::Horizontal,
            blend_strength: 5.0,
            max_ba_iterations: 100,
        }
    }
}

impl AdvancedConfig {
    pub fn with_conf_thresh(mut self, conf_thresh: f64) -> Self {
        self.conf_thresh = conf_thresh;
        self
    }

    pub fn with_wave_correct(mut self, kind: WaveCorrectKind) -> Self {
        self.wave_correct = kind;
        self
    }

    pub fn with_blend_strength(mut self, strength: f64) -> Self {
        self.blend_strength = strength;
        self
    }

    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = matcher;
        self
    }

    fn bundle_adjust(&self) -> BundleAdjustConfig {
        BundleAdjustConfig {
            conf_thresh: self.conf_thresh,
            max_iterations: self.max_ba_iterations,
            ..BundleAdjustConfig::default()
        }
    }
}

/// Output of a successful advanced stitch.
#[derive(Debug, Clone)]
pub struct AdvancedPanorama {
    pub panorama: RgbImage,
    /// Row of zero elevation in `panorama`.
    pub horizon_row: i32,
    /// Full-resolution cameras the composite was built from.
    pub cameras: Vec<CameraParams>,
    pub rms: f64,
}

pub fn find_features(images: &[RgbImage], config: &AdvancedConfig) -> Result<FeatureSet> {
    cv_features::find_features(images, &config.features)
}

/// Full pairwise match table; the matcher's descriptor cache is released
/// before returning.
pub fn match_pairs(features: &[ImageFeatures], config: &AdvancedConfig) -> PairwiseMatches {
    let mut matcher = BestOf2NearestMatcher::new(config.matcher.clone());
    let matches = matcher.match_all(features);
    matcher.collect_garbage();
    let accepted = matches
        .upper_pairs()
        .filter(|m| m.confidence >= config.conf_thresh && m.confidence > 0.0)
        .count();
    info!(accepted, images = features.len(), "pairwise matching done");
    matches
}

pub fn estimate_cameras(
    features: &[ImageFeatures],
    matches: &PairwiseMatches,
    config: &AdvancedConfig,
) -> Result<CameraEstimate> {
    crate::camera_estimator::estimate_cameras(features, matches, config.conf_thresh)
}

/// Refines `estimate.cameras` in place; returns the residual RMS.
pub fn adjust_bundle(
    features: &[ImageFeatures],
    matches: &PairwiseMatches,
    estimate: &mut CameraEstimate,
    config: &AdvancedConfig,
) -> Result<f64> {
    crate::bundle_adjust::adjust_bundle(
        features,
        matches,
        &mut estimate.cameras,
        estimate.center,
        &config.bundle_adjust(),
    )
}

pub fn wave_correct(cameras: &mut [CameraParams], config: &AdvancedConfig) {
    crate::wave_correct::wave_correct(cameras, config.wave_correct);
    debug!(
        max_error = cameras
            .iter()
            .map(|c| orthonormality_error(&c.rotation))
            .fold(0.0, f64::max),
        "rotations after wave correction"
    );
}

/// Composites at full resolution; `cameras` must already be rescaled.
pub fn compose(images: &[RgbImage], cameras: &[CameraParams], config: &AdvancedConfig) -> Result<Composite> {
    crate::compositor::compose(images, cameras, config.blend_strength)
}

#[derive(Debug, Clone, Default)]
pub struct AdvancedStitcher {
    config: AdvancedConfig,
}

impl AdvancedStitcher {
    pub fn new(config: AdvancedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvancedConfig {
        &self.config
    }

    /// Runs every stage; any error aborts the whole pipeline.
    pub fn stitch(&self, images: &[RgbImage]) -> Result<AdvancedPanorama> {
        if images.len() < 2 {
            return Err(crate::Error::InsufficientInput {
                loaded: images.len(),
                required: 2,
            });
        }
        let config = &self.config;
        let feature_set = find_features(images, config)?;
        let matches = match_pairs(&feature_set.features, config);
        let mut estimate = estimate_cameras(&feature_set.features, &matches, config)?;
        let rms = adjust_bundle(&feature_set.features, &matches, &mut estimate, config)?;
        wave_correct(&mut estimate.cameras, config);

        let to_full = 1.0 / feature_set.work_scale;
        let cameras: Vec<CameraParams> = estimate.cameras.iter().map(|c| c.scaled(to_full)).collect();
        let composite = compose(images, &cameras, config)?;
        info!(
            width = composite.image.width(),
            height = composite.image.height(),
            horizon_row = composite.horizon_row,
            "advanced stitch done"
        );
        Ok(AdvancedPanorama {
            panorama: composite.image,
            horizon_row: composite.horizon_row,
            cameras,
            rms,
        })
    }
}
