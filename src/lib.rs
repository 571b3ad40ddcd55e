//! 360° panorama stitching.
//!
//! [`job::run_job`] takes photo paths to a finished equirectangular JPEG:
//! load, stitch (advanced pipeline, then the bundled fallback on failure),
//! normalize the canvas, write, tag with GPano metadata and clean up.

pub use cv_core as core;
pub use cv_io as io;
pub use cv_photo as photo;

pub mod job;

pub use cv_core::{Error, Result};
pub use job::{run_job, stitch_with_fallback, JobConfig, JobReport, StitchOutcome};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before stitching.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PANO_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> std::result::Result<(), String> {
    cv_core::init_global_thread_pool(num_threads)
}
