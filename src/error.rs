//! Error types shared by the model, trainer and predictor

use crate::model::MetricKind;

/// Library error type.
#[derive(thiserror::Error, Debug)]
pub enum WideDeepError {
    /// Invalid model or feature configuration, detected before training starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A matrix handed to a stage disagrees with the configured feature sizes.
    #[error("Shape error in {stage}: {what} expected {expected}, got {actual}")]
    Shape {
        /// Stage that detected the mismatch.
        stage: &'static str,
        /// Which dimension was checked.
        what: String,
        /// Size implied by the configuration.
        expected: usize,
        /// Size actually provided.
        actual: usize,
    },

    /// Metric could not be computed for the given labels/scores.
    #[error("Metric error: {metric} is undefined: {reason}")]
    Metric {
        /// Metric being computed.
        metric: MetricKind,
        /// Why it is undefined.
        reason: String,
    },

    /// Problem with the contents of an input table.
    #[error("Data error in column `{column}`: {reason}")]
    Data {
        /// Offending column.
        column: String,
        /// What went wrong.
        reason: String,
    },

    /// Tensor data could not be read back from the backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl WideDeepError {
    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        WideDeepError::Configuration(message.into())
    }

    /// Build a shape error
    pub fn shape(stage: &'static str, what: impl Into<String>, expected: usize, actual: usize) -> Self {
        WideDeepError::Shape {
            stage,
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Build a data error
    pub fn data(column: impl Into<String>, reason: impl Into<String>) -> Self {
        WideDeepError::Data {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, WideDeepError::Configuration(_))
    }

    /// Whether this is a shape error
    pub fn is_shape(&self) -> bool {
        matches!(self, WideDeepError::Shape { .. })
    }
}

/// Convenience alias for `std::result::Result<T, WideDeepError>`.
pub type Result<T> = std::result::Result<T, WideDeepError>;
