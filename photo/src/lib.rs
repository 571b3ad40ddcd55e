//! Panorama stitching.
//!
//! Camera estimation and refinement, spherical warping, seam estimation,
//! multi-band blending and the canvas post-processing that turns a
//! composite into a 2:1 equirectangular panorama.
//!
//! # Pipeline
//!
//! - **Advanced**: [`AdvancedStitcher`] runs every stage explicitly and
//!   reports where the horizon landed.
//! - **Fallback**: [`BundledStitcher`] implements [`StitchBackend`] as a
//!   single conservative call; it reports no horizon.
//!
//! # Example
//!
//! ```no_run
//! # use cv_photo::{AdvancedConfig, AdvancedStitcher, CanvasConfig, normalize};
//! # use image::RgbImage;
//! let images: Vec<RgbImage> = Vec::new();
//! let stitched = AdvancedStitcher::new(AdvancedConfig::default()).stitch(&images)?;
//! let canvas = normalize(&stitched.panorama, Some(stitched.horizon_row), &CanvasConfig::default())?;
//! # Ok::<(), cv_core::Error>(())
//! ```

pub use cv_core::{Error, Result};

pub mod advanced;
pub mod blender;
pub mod bundle_adjust;
pub mod camera_estimator;
pub mod canvas;
pub mod compositor;
pub mod seam;
pub mod stitcher;
pub mod warper;
pub mod wave_correct;

pub use advanced::{AdvancedConfig, AdvancedPanorama, AdvancedStitcher};
pub use blender::*;
pub use bundle_adjust::*;
pub use camera_estimator::*;
pub use canvas::*;
pub use compositor::*;
pub use seam::*;
pub use stitcher::*;
pub use warper::*;
pub use wave_correct::*;
