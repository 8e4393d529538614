//! # Error Module
//!
//! Failures raised by the tone scale pipeline. Only precondition violations
//! and cancellation are errors; an unvoiced frame, a flat histogram without
//! peaks or an empty candidate list are ordinary results.

use thiserror::Error;

/// Errors that can occur while building or comparing tone scale data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToneScaleError {
    /// A caller supplied an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two histograms with different layouts were combined or compared.
    #[error(
        "histogram dimensions differ: {left_bins} bins of {left_width} cents vs {right_bins} bins of {right_width} cents"
    )]
    DimensionMismatch {
        left_bins: usize,
        left_width: f64,
        right_bins: usize,
        right_width: f64,
    },

    /// The run was aborted through its cancellation token. Partial results are discarded.
    #[error("analysis cancelled")]
    Cancelled,
}

impl ToneScaleError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ToneScaleError::InvalidArgument(message.into())
    }
}

/// Result type for tone scale operations
pub type Result<T> = std::result::Result<T, ToneScaleError>;
