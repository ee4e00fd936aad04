//! Error types for the kriging pipeline.

use thiserror::Error;

/// Errors surfaced to callers of the interpolation pipeline.
///
/// Fitter non-convergence and singular kriging systems are recovered
/// internally and never show up here.
#[derive(Error, Debug)]
pub enum KrigingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input geometry is not a point: {kind}")]
    NonPointGeometry { kind: String },

    #[error("Missing column in input: {0}")]
    MissingColumn(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Insufficient data: needed {needed}, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("No non-empty lag bins to fit a variogram to")]
    NoValidBins,

    #[error("Pair catalog built with the {found} policy, binning mode needs {expected}")]
    PairPolicyMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Singular value decomposition failed: {0}")]
    Svd(String),
}

impl KrigingError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        KrigingError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KrigingError>;
