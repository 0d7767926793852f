use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the refinement pipeline and its file codecs.
///
/// Everything below the micrograph level is recoverable: the orchestration
/// logs the error and moves on to the next vesicle or micrograph.
#[derive(Debug, Error)]
pub enum RepickError {
    #[error("no contour files matching {uid}*intermembrane.npy in {dir:?}")]
    MissingInput { uid: u64, dir: PathBuf },

    #[error("{context}: need at least {required} points, got {actual}")]
    InsufficientData {
        required: usize,
        actual: usize,
        context: String,
    },

    #[error("{context}: coordinates contain NaN or infinite values")]
    NonFiniteCoordinates { context: String },

    #[error("spline fit failed: {0}")]
    FittingFailure(String),

    #[error("contour has signed area {area:.1} px², expected a positive (angle-sorted) orientation")]
    Orientation { area: f64 },

    #[error("invalid .npy file {path:?}: {message}")]
    Npy { path: PathBuf, message: String },

    #[error("invalid MRC file {path:?}: {message}")]
    Mrc { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type RepickResult<T> = Result<T, RepickError>;
