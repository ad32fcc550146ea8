//! Engine configuration.

use serde::{Deserialize, Serialize};

use forecast_core::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_TRAINING_ITERATIONS, ForecastError, Result,
    check_confidence,
};
use forecast_stats::TrendIndexing;

use crate::ensemble::EnsembleWeights;

/// Days of history requested from the data source by default.
pub const DEFAULT_HISTORY_DAYS: u32 = 90;

/// Settings for a [`ForecastEngine`](crate::ForecastEngine).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use forecast::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{"history_days": 120}"#).unwrap();
/// assert_eq!(config.history_days, 120);
/// assert_eq!(config.weights.primary, 0.6);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days of history requested from the data source.
    pub history_days: u32,
    /// Ensemble combination weights.
    pub weights: EnsembleWeights,
    /// Training iterations for the secondary backend.
    pub secondary_iterations: usize,
    /// Confidence level passed to the primary backend.
    pub confidence_level: f64,
    /// Trend index continuation of the statistical backend.
    pub trend_indexing: TrendIndexing,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_days: DEFAULT_HISTORY_DAYS,
            weights: EnsembleWeights::default(),
            secondary_iterations: DEFAULT_TRAINING_ITERATIONS,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            trend_indexing: TrendIndexing::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field for a usable value.
    pub fn validate(&self) -> Result<()> {
        if self.history_days == 0 {
            return Err(ForecastError::InvalidParameter(
                "history_days must be at least 1".to_string(),
            ));
        }
        if self.secondary_iterations == 0 {
            return Err(ForecastError::InvalidParameter(
                "secondary_iterations must be at least 1".to_string(),
            ));
        }
        self.weights.validate()?;
        check_confidence(self.confidence_level)
    }

    /// Set the history window.
    #[must_use]
    pub const fn with_history_days(mut self, history_days: u32) -> Self {
        self.history_days = history_days;
        self
    }

    /// Set the ensemble weights.
    #[must_use]
    pub const fn with_weights(mut self, weights: EnsembleWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the secondary training iterations.
    #[must_use]
    pub const fn with_secondary_iterations(mut self, iterations: usize) -> Self {
        self.secondary_iterations = iterations;
        self
    }

    /// Set the primary confidence level.
    #[must_use]
    pub const fn with_confidence_level(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    /// Set the trend indexing mode.
    #[must_use]
    pub const fn with_trend_indexing(mut self, trend_indexing: TrendIndexing) -> Self {
        self.trend_indexing = trend_indexing;
        self
    }
}
