//! Panorama File I/O
//!
//! - Decoding input photographs (JPEG/PNG) into RGB buffers
//! - Writing the final panorama as a maximum-quality JPEG
//! - Embedding GPano XMP metadata so viewers treat the JPEG as a photo sphere

pub mod gpano;
pub mod loader;

pub use gpano::{gpano_xmp, inject_gpano_metadata, insert_xmp_segment, PanoDimensions, XMP_HEADER};
pub use loader::{is_supported_image, load_images, save_jpeg, MIN_IMAGES, SUPPORTED_EXTENSIONS};

pub use cv_core::{Error, Result};
