//! Shared building blocks for the panorama stitcher: error taxonomy, feature
//! and match containers, camera parameters, raster buffers and robust fitting.

pub mod descriptor;
pub mod error;
pub mod geometry;
pub mod keypoint;
pub mod raster;
pub mod robust;
pub mod runtime;

pub use descriptor::*;
pub use error::*;
pub use geometry::*;
pub use keypoint::*;
pub use raster::*;
pub use robust::*;
pub use runtime::*;
