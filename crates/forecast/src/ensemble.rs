//! Weighted ensemble of a primary and an optional secondary backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use forecast_core::{
    BackendFactory, BoxedForecaster, DegradationReason, ForecastError, ForecastPoint,
    ForecastResult, Forecaster, ModelKind, Result, Series, TrainOptions, TrainingResult,
};

/// Confidence reported on every combined point.
pub const ENSEMBLE_CONFIDENCE: f64 = 0.95;

/// Per-backend weights of the ensemble.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    /// Weight of the primary backend.
    pub primary: f64,
    /// Weight of the secondary backend.
    pub secondary: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            primary: 0.6,
            secondary: 0.4,
        }
    }
}

impl EnsembleWeights {
    /// Weights of a primary-only model.
    pub const PRIMARY_ONLY: Self = Self {
        primary: 1.0,
        secondary: 0.0,
    };

    /// Creates validated weights.
    pub fn new(primary: f64, secondary: f64) -> Result<Self> {
        let weights = Self { primary, secondary };
        weights.validate()?;
        Ok(weights)
    }

    /// Rejects negative or non-finite weights.
    ///
    /// Weights need not sum to one.
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("primary", self.primary), ("secondary", self.secondary)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "{name} weight must be finite and non-negative, got {weight}"
                )));
            }
        }
        Ok(())
    }

    fn combine(&self, primary: f64, secondary: f64) -> f64 {
        primary.mul_add(self.primary, secondary * self.secondary)
    }
}

/// Combines a primary backend with an optional secondary backend.
///
/// The primary is always trained and its failure is fatal. The secondary is
/// built from a [`BackendFactory`] on each training run; if it is missing,
/// unavailable, or fails to train, the ensemble degrades to the primary
/// alone and reports the primary's model kind. Degradation is never an
/// error.
#[derive(Debug)]
pub struct EnsembleForecaster {
    primary: BoxedForecaster,
    secondary_factory: Option<Arc<dyn BackendFactory>>,
    secondary: Option<BoxedForecaster>,
    secondary_training: Option<TrainingResult>,
    weights: EnsembleWeights,
    degradation: Option<DegradationReason>,
}

impl EnsembleForecaster {
    /// Create an ensemble around `primary` with no secondary backend.
    #[must_use]
    pub fn new(primary: BoxedForecaster) -> Self {
        Self {
            primary,
            secondary_factory: None,
            secondary: None,
            secondary_training: None,
            weights: EnsembleWeights::default(),
            degradation: None,
        }
    }

    /// Set the factory used to build the secondary backend.
    #[must_use]
    pub fn with_secondary(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.secondary_factory = Some(factory);
        self
    }

    /// Set the combination weights.
    #[must_use]
    pub fn with_weights(mut self, weights: EnsembleWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Weights in effect: the configured ones while a secondary model is
    /// trained, [`EnsembleWeights::PRIMARY_ONLY`] otherwise.
    #[must_use]
    pub fn weights(&self) -> EnsembleWeights {
        if self.secondary.is_some() {
            self.weights
        } else {
            EnsembleWeights::PRIMARY_ONLY
        }
    }

    /// Why the last training run fell back to the primary, if it did.
    #[must_use]
    pub const fn degradation(&self) -> Option<&DegradationReason> {
        self.degradation.as_ref()
    }

    /// Training result of the secondary backend from the last run.
    #[must_use]
    pub const fn secondary_training(&self) -> Option<&TrainingResult> {
        self.secondary_training.as_ref()
    }

    /// Returns true if a trained secondary model is held.
    #[must_use]
    pub const fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    fn train_secondary(
        &self,
        series: &Series,
        metric: &str,
        options: &TrainOptions,
    ) -> std::result::Result<(BoxedForecaster, TrainingResult), DegradationReason> {
        let factory = self
            .secondary_factory
            .as_ref()
            .ok_or_else(|| DegradationReason::Unavailable("no secondary backend".to_string()))?;

        if !factory.is_available() {
            return Err(DegradationReason::Unavailable(factory.name().to_string()));
        }

        let mut model = factory
            .create(series.len())
            .map_err(|e| DegradationReason::Unavailable(e.to_string()))?;
        let training = model
            .train(series, metric, options)
            .map_err(|e| DegradationReason::TrainingFailed(e.to_string()))?;

        Ok((model, training))
    }

    fn forecast_secondary(
        secondary: &dyn Forecaster,
        horizon_days: usize,
    ) -> std::result::Result<ForecastResult, DegradationReason> {
        let forecast = secondary
            .forecast(horizon_days)
            .map_err(|e| DegradationReason::ForecastFailed(e.to_string()))?;

        if forecast.predictions.len() != horizon_days {
            return Err(DegradationReason::ForecastFailed(format!(
                "expected {horizon_days} points, got {}",
                forecast.predictions.len()
            )));
        }
        Ok(forecast)
    }

    fn combine(&self, primary: &ForecastResult, secondary: &ForecastResult) -> ForecastResult {
        let w = self.weights;
        let predictions = primary
            .predictions
            .iter()
            .zip(&secondary.predictions)
            .map(|(p, s)| {
                ForecastPoint::new(
                    p.date,
                    w.combine(p.forecast, s.forecast),
                    w.combine(p.lower_bound, s.lower_bound),
                    w.combine(p.upper_bound, s.upper_bound),
                    ENSEMBLE_CONFIDENCE,
                )
                .with_components(p.forecast, s.forecast)
            })
            .collect();

        ForecastResult::new(
            primary.metric.clone(),
            predictions,
            ModelKind::Ensemble,
            ENSEMBLE_CONFIDENCE,
        )
    }
}

impl Forecaster for EnsembleForecaster {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn kind(&self) -> ModelKind {
        if self.secondary.is_some() {
            ModelKind::Ensemble
        } else {
            self.primary.kind()
        }
    }

    fn is_trained(&self) -> bool {
        self.primary.is_trained()
    }

    fn train(
        &mut self,
        series: &Series,
        metric: &str,
        options: &TrainOptions,
    ) -> Result<TrainingResult> {
        self.secondary = None;
        self.secondary_training = None;
        self.degradation = None;

        let primary = self.primary.train(series, metric, options)?;

        if options.use_secondary {
            match self.train_secondary(series, metric, options) {
                Ok((model, training)) => {
                    info!(
                        metric,
                        backend = model.name(),
                        accuracy = training.metrics.accuracy,
                        "Secondary backend trained"
                    );
                    self.secondary = Some(model);
                    self.secondary_training = Some(training);
                }
                Err(reason) => {
                    warn!(metric, reason = %reason, "Ensemble degraded to primary backend");
                    self.degradation = Some(reason);
                }
            }
        }

        Ok(TrainingResult::new(
            self.kind(),
            primary.sample_count,
            primary.metrics,
        ))
    }

    fn forecast_with_confidence(
        &self,
        horizon_days: usize,
        confidence_level: f64,
    ) -> Result<ForecastResult> {
        let primary = self
            .primary
            .forecast_with_confidence(horizon_days, confidence_level)?;

        let Some(secondary) = self.secondary.as_deref() else {
            return Ok(primary);
        };

        match Self::forecast_secondary(secondary, horizon_days) {
            Ok(forecast) => {
                debug!(horizon_days, "Combining primary and secondary forecasts");
                Ok(self.combine(&primary, &forecast))
            }
            Err(reason) => {
                warn!(reason = %reason, "Falling back to primary forecast");
                Ok(primary)
            }
        }
    }
}
