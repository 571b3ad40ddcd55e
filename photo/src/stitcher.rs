//! Fallback stitching behind a capability trait.
//!
//! [`StitchBackend`] splits a whole-pipeline stitch into its
//! detect/match/estimate/warp/blend capabilities; the provided
//! [`StitchBackend::stitch`] runs them in order. Failures surface as
//! [`Error::StitchFailure`] with a status code.

use crate::bundle_adjust::{adjust_bundle, BundleAdjustConfig};
use crate::camera_estimator::{connected_components, estimate_cameras};
use crate::compositor::blend_tiles;
use crate::wave_correct::{wave_correct, WaveCorrectKind};
use crate::warper::{SphericalWarper, WarpedTile};
use crate::{Error, Result};
use cv_core::{CameraParams, PairwiseMatches, StitchStatus};
use cv_features::{find_features, BestOf2NearestMatcher, FeatureConfig, FeatureSet, MatcherConfig};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Cameras for the subset of inputs the backend kept, at full resolution.
#[derive(Debug, Clone)]
pub struct StitchCameras {
    /// Input indices, ascending.
    pub indices: Vec<usize>,
    pub cameras: Vec<CameraParams>,
}

pub trait StitchBackend {
    fn detect(&mut self, images: &[RgbImage]) -> Result<FeatureSet>;

    fn match_features(&mut self, features: &FeatureSet) -> Result<PairwiseMatches>;

    fn estimate(&mut self, features: &FeatureSet, matches: &PairwiseMatches) -> Result<StitchCameras>;

    fn warp(&mut self, images: &[RgbImage], cameras: &StitchCameras) -> Result<Vec<WarpedTile>>;

    fn blend(&mut self, tiles: &[WarpedTile]) -> Result<RgbImage>;

    fn stitch(&mut self, images: &[RgbImage]) -> Result<RgbImage> {
        if images.len() < 2 {
            return Err(Error::StitchFailure(StitchStatus::NeedMoreImages));
        }
        let features = self.detect(images)?;
        let matches = self.match_features(&features)?;
        let cameras = self.estimate(&features, &matches)?;
        let tiles = self.warp(images, &cameras)?;
        self.blend(&tiles)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub features: FeatureConfig,
    pub match_conf: f32,
    pub conf_thresh: f64,
    pub blend_strength: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            match_conf: 0.3,
            conf_thresh: 1.0,
            blend_strength: 5.0,
        }
    }
}

/// Self-contained stitcher with conservative thresholds. Keeps only the
/// largest group of connected images.
#[derive(Debug, Clone, Default)]
pub struct BundledStitcher {
    config: FallbackConfig,
}

impl BundledStitcher {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }
}

fn failure(status: StitchStatus, err: Error) -> Error {
    warn!(error = %err, code = status.code(), "fallback stage failed");
    Error::StitchFailure(status)
}

impl StitchBackend for BundledStitcher {
    fn detect(&mut self, images: &[RgbImage]) -> Result<FeatureSet> {
        find_features(images, &self.config.features).map_err(|e| failure(StitchStatus::NeedMoreImages, e))
    }

    fn match_features(&mut self, features: &FeatureSet) -> Result<PairwiseMatches> {
        let mut matcher = BestOf2NearestMatcher::new(MatcherConfig::default().with_match_conf(self.config.match_conf));
        let matches = matcher.match_all(&features.features);
        matcher.collect_garbage();
        Ok(matches)
    }

    fn estimate(&mut self, features: &FeatureSet, matches: &PairwiseMatches) -> Result<StitchCameras> {
        let components = connected_components(matches, self.config.conf_thresh);
        let keep = components
            .into_iter()
            .fold(Vec::new(), |best: Vec<usize>, c| if c.len() > best.len() { c } else { best });
        if keep.len() < 2 {
            return Err(Error::StitchFailure(StitchStatus::NeedMoreImages));
        }
        if keep.len() < features.features.len() {
            info!(kept = ?keep, "fallback keeps the largest connected group");
        }

        let sub_features: Vec<_> = keep.iter().map(|&i| features.features[i].clone()).collect();
        let sub_matches = matches.subset(&keep);
        let mut estimate = estimate_cameras(&sub_features, &sub_matches, self.config.conf_thresh)
            .map_err(|e| failure(StitchStatus::HomographyEstimationFailed, e))?;
        let ba = BundleAdjustConfig::default().with_conf_thresh(self.config.conf_thresh);
        adjust_bundle(&sub_features, &sub_matches, &mut estimate.cameras, estimate.center, &ba)
            .map_err(|e| failure(StitchStatus::CameraParamsAdjustFailed, e))?;
        wave_correct(&mut estimate.cameras, WaveCorrectKind::Horizontal);

        let to_full = 1.0 / features.work_scale;
        Ok(StitchCameras {
            indices: keep,
            cameras: estimate.cameras.iter().map(|c| c.scaled(to_full)).collect(),
        })
    }

    fn warp(&mut self, images: &[RgbImage], cameras: &StitchCameras) -> Result<Vec<WarpedTile>> {
        let warper = SphericalWarper::from_cameras(&cameras.cameras);
        cameras
            .indices
            .par_iter()
            .zip(cameras.cameras.par_iter())
            .map(|(&i, cam)| {
                let img = images
                    .get(i)
                    .ok_or(Error::StitchFailure(StitchStatus::NeedMoreImages))?;
                warper
                    .warp(img, cam)
                    .map_err(|e| failure(StitchStatus::CameraParamsAdjustFailed, e))
            })
            .collect()
    }

    fn blend(&mut self, tiles: &[WarpedTile]) -> Result<RgbImage> {
        let composite = blend_tiles(tiles, self.config.blend_strength)
            .map_err(|e| failure(StitchStatus::CameraParamsAdjustFailed, e))?;
        info!(
            width = composite.image.width(),
            height = composite.image.height(),
            "fallback stitch done"
        );
        Ok(composite.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::MatchesInfo;

    #[test]
    fn one_image_needs_more() {
        let err = BundledStitcher::default().stitch(&[RgbImage::new(16, 16)]).unwrap_err();
        assert!(matches!(err, Error::StitchFailure(StitchStatus::NeedMoreImages)));
    }

    #[test]
    fn unconnected_images_need_more() {
        let features = FeatureSet {
            work_scale: 1.0,
            features: (0..3).map(|i| cv_features::ImageFeatures::empty(i, 10, 10)).collect(),
        };
        let mut matches = PairwiseMatches::new(3);
        let mut weak = MatchesInfo::empty(0, 1);
        weak.confidence = 0.4;
        matches.insert(weak);
        let err = BundledStitcher::default().estimate(&features, &matches).unwrap_err();
        assert!(matches!(err, Error::StitchFailure(StitchStatus::NeedMoreImages)));
    }

    #[test]
    fn blank_images_fail_with_status() {
        let images = vec![RgbImage::new(64, 48), RgbImage::new(64, 48)];
        let err = BundledStitcher::default().stitch(&images).unwrap_err();
        assert!(matches!(err, Error::StitchFailure(_)));
    }
}
