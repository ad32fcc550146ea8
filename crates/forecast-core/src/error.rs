//! Error types for forecasting operations.
//!
//! This module defines [`ForecastError`] which covers every failure that can
//! reach a caller of the engine, and [`DegradationReason`] which describes a
//! secondary-backend failure that the ensemble recovers from locally.

use thiserror::Error;

/// Errors that can occur while preparing data, training, or forecasting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// The historical series failed validation (too short, malformed date,
    /// missing field, non-numeric value, duplicate date).
    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    /// `forecast` was invoked on a backend that has not been trained.
    #[error("Model must be trained before forecasting: {0}")]
    UntrainedModel(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The historical data source failed.
    #[error("Data source {source_name} failed: {message}")]
    DataSource {
        /// Name of the data source.
        source_name: String,
        /// Failure description.
        message: String,
    },

    /// A backend failed while training or forecasting.
    #[error("Backend {backend} failed: {message}")]
    Backend {
        /// Name of the failing backend.
        backend: String,
        /// Failure description.
        message: String,
    },

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl ForecastError {
    /// Returns true if the error was caused by the caller's input rather
    /// than by the engine or one of its collaborators.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidSeries(_) | Self::InvalidParameter(_))
    }
}

/// Result type alias using [`ForecastError`].
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Why the ensemble fell back to its primary backend.
///
/// These never surface as errors to the caller; they are logged and
/// reflected in the reported model kind and weights.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DegradationReason {
    /// No secondary backend is installed or it could not be instantiated.
    #[error("secondary backend unavailable: {0}")]
    Unavailable(String),

    /// The secondary backend failed while training.
    #[error("secondary training failed: {0}")]
    TrainingFailed(String),

    /// The secondary backend failed while forecasting.
    #[error("secondary forecast failed: {0}")]
    ForecastFailed(String),
}
