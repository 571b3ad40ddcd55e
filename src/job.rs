//! One stitching job from input paths to the published panorama.

use crate::{Error, Result};
use cv_io::{inject_gpano_metadata, load_images, save_jpeg};
use cv_photo::{
    normalize, AdvancedConfig, AdvancedStitcher, BundledStitcher, CanvasConfig, FallbackConfig, NormalizedCanvas,
    StitchBackend,
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub advanced: AdvancedConfig,
    pub fallback: FallbackConfig,
    pub canvas: CanvasConfig,
    pub jpeg_quality: u8,
    /// Delete the input files after a successful job.
    pub remove_inputs: bool,
    pub inject_metadata: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            advanced: AdvancedConfig::default(),
            fallback: FallbackConfig::default(),
            canvas: CanvasConfig::default(),
            jpeg_quality: 100,
            remove_inputs: true,
            inject_metadata: true,
        }
    }
}

impl JobConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::invalid_input(format!("config {}: {e}", path.display())))
    }

    pub fn with_remove_inputs(mut self, remove: bool) -> Self {
        self.remove_inputs = remove;
        self
    }

    pub fn with_inject_metadata(mut self, inject: bool) -> Self {
        self.inject_metadata = inject;
        self
    }
}

/// Which pipeline produced the panorama.
#[derive(Debug, Clone)]
pub enum StitchOutcome {
    Advanced { panorama: RgbImage, horizon_row: i32 },
    Fallback { panorama: RgbImage },
}

impl StitchOutcome {
    pub fn panorama(&self) -> &RgbImage {
        match self {
            StitchOutcome::Advanced { panorama, .. } | StitchOutcome::Fallback { panorama } => panorama,
        }
    }

    pub fn horizon_row(&self) -> Option<i32> {
        match self {
            StitchOutcome::Advanced { horizon_row, .. } => Some(*horizon_row),
            StitchOutcome::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, StitchOutcome::Fallback { .. })
    }
}

/// Advanced pipeline first; the bundled stitcher only runs when it fails.
pub fn stitch_with_fallback(images: &[RgbImage], config: &JobConfig) -> Result<StitchOutcome> {
    match AdvancedStitcher::new(config.advanced.clone()).stitch(images) {
        Ok(out) => Ok(StitchOutcome::Advanced {
            panorama: out.panorama,
            horizon_row: out.horizon_row,
        }),
        Err(err) => {
            warn!(error = %err, "advanced stitching failed, falling back");
            let panorama = BundledStitcher::new(config.fallback.clone()).stitch(images)?;
            Ok(StitchOutcome::Fallback { panorama })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub used_fallback: bool,
    /// Byte offset of the metadata segment, when it was written.
    pub metadata_offset: Option<usize>,
    /// Horizon row in the final canvas, when known.
    pub horizon_row: Option<i32>,
}

/// Runs the whole job. A failed job leaves no partial artifact at `output`;
/// a file already there is only replaced once the new panorama is written.
pub fn run_job<P: AsRef<Path>>(inputs: &[P], output: &Path, config: &JobConfig) -> Result<JobReport> {
    let (canvas, used_fallback) = render(inputs, config)?;
    let (width, height) = canvas.image.dimensions();
    if let Err(err) = save_jpeg(&canvas.image, output, config.jpeg_quality) {
        if output.exists() {
            if let Err(rm) = fs::remove_file(output) {
                error!(path = %output.display(), error = %rm, "could not remove partial output");
            }
        }
        return Err(err);
    }

    let metadata_offset = if config.inject_metadata {
        match inject_gpano_metadata(output, width, height) {
            Ok(offset) => offset,
            Err(err) => {
                warn!(error = %err, "metadata injection failed");
                None
            }
        }
    } else {
        None
    };
    info!(
        output = %output.display(),
        width,
        height,
        used_fallback,
        "panorama written"
    );

    if config.remove_inputs {
        for path in inputs {
            let path = path.as_ref();
            if path == output || !path.exists() {
                continue;
            }
            if let Err(err) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %err, "could not delete input");
            }
        }
    }
    Ok(JobReport {
        output: output.to_path_buf(),
        width,
        height,
        used_fallback,
        metadata_offset,
        horizon_row: canvas.horizon_row,
    })
}

/// Load, stitch and normalize, all in memory.
fn render<P: AsRef<Path>>(inputs: &[P], config: &JobConfig) -> Result<(NormalizedCanvas, bool)> {
    let images = load_images(inputs)?;
    let outcome = stitch_with_fallback(&images, config)?;
    drop(images);

    let canvas = normalize(outcome.panorama(), outcome.horizon_row(), &config.canvas)?;
    Ok((canvas, outcome.is_fallback()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_config_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.jpeg_quality, 100);
        assert!(config.remove_inputs && config.inject_metadata);
        assert_eq!(config.fallback.conf_thresh, 1.0);
    }

    #[test]
    fn job_config_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(&path, r#"{"remove_inputs": false, "advanced": {"blend_strength": 2.5}}"#).unwrap();
        let config = JobConfig::from_json_file(&path).unwrap();
        assert!(!config.remove_inputs);
        assert_eq!(config.advanced.blend_strength, 2.5);
        assert_eq!(config.advanced.conf_thresh, 0.15);
    }

    #[test]
    fn bad_json_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JobConfig::from_json_file(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn outcome_accessors() {
        let adv = StitchOutcome::Advanced {
            panorama: RgbImage::new(4, 2),
            horizon_row: 1,
        };
        assert_eq!(adv.horizon_row(), Some(1));
        assert!(!adv.is_fallback());
        let fb = StitchOutcome::Fallback {
            panorama: RgbImage::new(4, 2),
        };
        assert_eq!(fb.horizon_row(), None);
        assert_eq!(fb.panorama().dimensions(), (4, 2));
    }
}
