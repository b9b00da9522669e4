//! Error types for volwatch-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Negative volume: {0}")]
    NegativeVolume(String),

    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    #[error("Implausible volume: {0}")]
    ImplausibleVolume(String),

    #[error("Volume overflow: {0}")]
    VolumeOverflow(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
