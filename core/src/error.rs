//! Error taxonomy shared by every stage of the stitching pipeline.

use std::fmt;

/// Status codes reported by the bundled fallback stitcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StitchStatus {
    NeedMoreImages = 1,
    HomographyEstimationFailed = 2,
    CameraParamsAdjustFailed = 3,
}

impl StitchStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for StitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StitchStatus::NeedMoreImages => "need more images",
            StitchStatus::HomographyEstimationFailed => "homography estimation failed",
            StitchStatus::CameraParamsAdjustFailed => "camera parameter adjustment failed",
        };
        write!(f, "{} ({})", reason, self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Insufficient input: {loaded} image(s) loaded, at least {required} required")]
    InsufficientInput { loaded: usize, required: usize },

    #[error("Match graph error: {0}")]
    MatchGraph(String),

    #[error("Camera estimation error: {0}")]
    Estimation(String),

    #[error("Bundle adjustment error: {0}")]
    Adjustment(String),

    #[error("Stitching failed code: {0}")]
    StitchFailure(StitchStatus),

    #[error("Post-processing failed: {0}")]
    PostProcess(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] ::image::ImageError),
}

impl Error {
    pub fn post_process(msg: impl Into<String>) -> Self {
        Self::PostProcess(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
