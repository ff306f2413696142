use thiserror::Error;

/// Errors that can occur while capturing or analysing audio.
///
/// Only `DeviceUnavailable` prevents a session from starting. Read and
/// analysis failures are reported per chunk or per window and the pipeline
/// keeps running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture read failed: {0}")]
    CaptureRead(String),

    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    #[error("shape mismatch: expected {expected} values, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
