pub mod color;
pub mod convolve;
pub mod distance;
pub mod geometry;
pub mod inpaint;
pub mod morph;
pub mod pyramid;
pub mod resize;
pub mod threshold;

pub use color::*;
pub use convolve::*;
pub use distance::*;
pub use geometry::*;
pub use inpaint::*;
pub use morph::*;
pub use pyramid::*;
pub use resize::*;
pub use threshold::*;

pub type Result<T> = std::result::Result<T, ImgprocError>;

#[derive(Debug, thiserror::Error)]
pub enum ImgprocError {
    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl From<ImgprocError> for cv_core::Error {
    fn from(err: ImgprocError) -> Self {
        cv_core::Error::PostProcess(err.to_string())
    }
}

pub fn validate_image_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ImgprocError::DimensionMismatch(
            "Image dimensions must be non-zero".into(),
        ));
    }
    Ok(())
}
