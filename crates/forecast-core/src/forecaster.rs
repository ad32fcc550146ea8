//! The forecaster contract shared by every backend.
//!
//! This module defines:
//!
//! - [`Forecaster`] - Train on a [`Series`], then forecast a horizon
//! - [`BackendFactory`] - Instantiates a backend on demand, or reports that
//!   it is unavailable
//! - [`TrainOptions`] - Per-training knobs understood by the backends
//!
//! The ensemble only ever talks to backends through these traits, so a
//! statistical model, a neural sequence model, and an external
//! decomposition model are interchangeable.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::{
    error::{ForecastError, Result},
    types::{ForecastResult, ModelKind, Series, TrainingResult},
};

/// Confidence level used when the caller does not pick one.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Training iterations used by iterative backends when not configured.
pub const DEFAULT_TRAINING_ITERATIONS: usize = 50;

/// Options passed to [`Forecaster::train`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Whether an ensemble should attempt to train its secondary backend.
    pub use_secondary: bool,
    /// Iteration budget for backends that train iteratively.
    pub iterations: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            use_secondary: false,
            iterations: DEFAULT_TRAINING_ITERATIONS,
        }
    }
}

impl TrainOptions {
    /// Requests (or not) the secondary backend.
    #[must_use]
    pub const fn with_secondary(mut self, use_secondary: bool) -> Self {
        self.use_secondary = use_secondary;
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }
}

/// A trainable forecasting backend.
///
/// Implementations must return [`ForecastError::UntrainedModel`] from the
/// forecasting methods until [`train`](Self::train) has succeeded.
pub trait Forecaster: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "statistical").
    fn name(&self) -> &str;

    /// Returns the kind of model this backend reports in its results.
    fn kind(&self) -> ModelKind;

    /// Returns true once the backend has been trained.
    fn is_trained(&self) -> bool;

    /// Fits the backend to `series`, replacing any previous state.
    fn train(
        &mut self,
        series: &Series,
        metric: &str,
        options: &TrainOptions,
    ) -> Result<TrainingResult>;

    /// Forecasts `horizon_days` days past the last training date.
    fn forecast_with_confidence(
        &self,
        horizon_days: usize,
        confidence_level: f64,
    ) -> Result<ForecastResult>;

    /// Forecasts at [`DEFAULT_CONFIDENCE_LEVEL`].
    fn forecast(&self, horizon_days: usize) -> Result<ForecastResult> {
        self.forecast_with_confidence(horizon_days, DEFAULT_CONFIDENCE_LEVEL)
    }
}

/// Owned trait object for a backend that is still being trained.
pub type BoxedForecaster = Box<dyn Forecaster>;

/// Shared trait object for a trained backend, as stored in a model cache.
pub type SharedForecaster = Arc<dyn Forecaster>;

/// Creates fresh backend instances.
///
/// A factory stands in for a backend that may not be installed: the
/// ensemble asks it for an instance per training run and degrades if the
/// factory reports the backend unavailable.
pub trait BackendFactory: Send + Sync + Debug {
    /// Returns the name of the backend this factory builds.
    fn name(&self) -> &str;

    /// Returns false if the backend cannot be used in this process.
    fn is_available(&self) -> bool {
        true
    }

    /// Builds an untrained instance sized for a series of `series_len` points.
    fn create(&self, series_len: usize) -> Result<BoxedForecaster>;
}

/// Rejects a zero horizon.
pub fn check_horizon(horizon_days: usize) -> Result<()> {
    if horizon_days == 0 {
        return Err(ForecastError::InvalidParameter(
            "horizon_days must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Rejects confidence levels outside the open interval (0, 1).
pub fn check_confidence(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "confidence_level must be in (0, 1), got {confidence_level}"
        )));
    }
    Ok(())
}
