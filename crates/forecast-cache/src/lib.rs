#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/forecast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Caching implementations for trained forecasters.
//!
//! This crate provides implementations of the [`ModelCache`] trait from `forecast-core`:
//!
//! - [`InMemoryModelCache`] - Process-lifetime cache with per-key single-flight training
//! - [`NoopModelCache`] - No-op cache that trains on every request

/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

// Re-export the trait for convenience
pub use forecast_core::ModelCache;

pub use memory::InMemoryModelCache;
pub use noop::NoopModelCache;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Days, NaiveDate};
    use forecast_core::{
        ForecastError, ForecastPoint, ForecastResult, Forecaster, ModelKind, Result, Series,
        SharedForecaster, TrainOptions, TrainingResult,
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    /// Forecaster that repeats a constant.
    #[derive(Debug)]
    pub(crate) struct Constant(pub(crate) f64);

    impl Forecaster for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn kind(&self) -> ModelKind {
            ModelKind::Statistical
        }

        fn is_trained(&self) -> bool {
            true
        }

        fn train(&mut self, _: &Series, _: &str, _: &TrainOptions) -> Result<TrainingResult> {
            Err(ForecastError::Other("constant forecaster is pre-trained".to_string()))
        }

        fn forecast_with_confidence(&self, horizon: usize, level: f64) -> Result<ForecastResult> {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
            let points = (0..horizon)
                .map(|k| {
                    let date = start + Days::new(k as u64);
                    ForecastPoint::new(date, self.0, self.0, self.0, level)
                })
                .collect();
            Ok(ForecastResult::new("test", points, ModelKind::Statistical, level))
        }
    }

    /// Stands in for a training run; bumps `counter` once per call.
    pub(crate) async fn train_counted(
        counter: Arc<AtomicUsize>,
        value: f64,
    ) -> Result<SharedForecaster> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(Arc::new(Constant(value)))
    }
}
