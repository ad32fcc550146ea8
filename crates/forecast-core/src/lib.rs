#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/forecast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for business metric forecasting.
//!
//! This crate provides the foundational abstractions shared by every backend:
//!
//! - [`Forecaster`](forecaster::Forecaster) - Train/forecast contract
//! - [`BackendFactory`](forecaster::BackendFactory) - On-demand backend construction
//! - [`HistoricalDataSource`](source::HistoricalDataSource) - Raw history supply
//! - [`ModelCache`](cache::ModelCache) - Trained-model memoization
//! - [`preprocess`] - Validation of raw history into a [`Series`]

/// Cache trait for trained forecasters.
pub mod cache;
/// Error types for forecasting operations.
pub mod error;
/// Forecaster and backend factory traits.
pub mod forecaster;
/// Validation of raw historical data.
pub mod preprocess;
/// Historical data source trait.
pub mod source;
/// Core data types (Series, ForecastResult, CacheKey, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{ModelCache, TrainFuture};
pub use error::{DegradationReason, ForecastError, Result};
pub use forecaster::{
    BackendFactory, BoxedForecaster, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_TRAINING_ITERATIONS,
    Forecaster, SharedForecaster, TrainOptions, check_confidence, check_horizon,
};
pub use source::HistoricalDataSource;
pub use types::{
    AccuracyMetrics, CacheKey, ComponentForecasts, ForecastPoint, ForecastResult,
    HistoricalPoint, MIN_SERIES_LEN, ModelKind, Series, TenantId, TrainingResult, Trend,
};
