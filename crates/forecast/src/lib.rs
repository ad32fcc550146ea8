#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/forecast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Business metric forecasting engine.
//!
//! This crate re-exports the core types and backends and provides the
//! [`EnsembleForecaster`] and the [`ForecastEngine`] that serves cached
//! forecasts per tenant and metric.
//!
//! # Features
//!
//! - `neural` - Neural sequence backend for ensembles
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forecast::{ForecastEngine, ForecastRequest, InMemorySource, TenantId};
//!
//! #[tokio::main]
//! async fn main() -> forecast::Result<()> {
//!     let source = InMemorySource::new().with_records("acme", "revenue", load_records());
//!     let engine = ForecastEngine::new(Arc::new(source));
//!
//!     let report = engine
//!         .generate(&TenantId::new("acme"), &ForecastRequest::new("revenue", 30), true)
//!         .await?;
//!     println!("{} trained in {:.2}s", report.model_kind, report.training_duration_seconds);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use forecast_core::*;

// Cache implementations
pub use forecast_cache::{InMemoryModelCache, NoopModelCache};

// Backends
#[cfg(feature = "neural")]
pub use forecast_neural::{SequenceBackend, SequenceConfig, SequenceForecaster};
pub use forecast_stats::{StatisticalForecaster, TrainedState, TrendIndexing, z_score};

mod config;
mod engine;
mod ensemble;
mod source;

pub use config::{DEFAULT_HISTORY_DAYS, EngineConfig};
pub use engine::{
    DEFAULT_HORIZON_DAYS, ForecastEngine, ForecastRequest, ForecastSummary, GenerationReport,
};
pub use ensemble::{ENSEMBLE_CONFIDENCE, EnsembleForecaster, EnsembleWeights};
pub use source::{InMemorySource, to_records};
