#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/forecast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Statistical forecaster.
//!
//! This crate provides [`StatisticalForecaster`], which implements the
//! [`Forecaster`] trait from `forecast-core`.
//!
//! # Model
//!
//! - Linear trend `value ≈ slope·i + intercept` fitted by ordinary least
//!   squares over the position index `i` (calendar gaps are not filled)
//! - Day-of-week multiplier `mean(value | weekday) / mean(value)`
//! - Band `forecast ± std_dev · z · (1 + 0.3 · k / horizon)` at step `k`
//!
//! # Example
//!
//! ```no_run
//! use forecast_core::{Forecaster, Series, TrainOptions};
//! use forecast_stats::StatisticalForecaster;
//!
//! # fn example(series: Series) -> forecast_core::Result<()> {
//! let mut model = StatisticalForecaster::new();
//! let training = model.train(&series, "revenue", &TrainOptions::default())?;
//! println!("accuracy {:.1}%", training.metrics.accuracy);
//!
//! let forecast = model.forecast(30)?;
//! println!("trend is {}", forecast.trend);
//! # Ok(())
//! # }
//! ```

use chrono::{Datelike, Days, NaiveDate};
use forecast_core::{
    AccuracyMetrics, ForecastError, ForecastPoint, ForecastResult, Forecaster, ModelKind, Result,
    Series, TrainOptions, TrainingResult, check_confidence, check_horizon,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Z-scores for the supported confidence levels.
const Z_SCORES: [(f64, f64); 4] = [(0.80, 1.28), (0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];

/// Z-score used for any confidence level missing from the table.
const DEFAULT_Z_SCORE: f64 = 1.96;

/// Fraction by which the band widens between the first and the last step.
const HORIZON_WIDENING: f64 = 0.3;

/// Window length that reproduces the fixed-window trend index.
pub const LEGACY_WINDOW_DAYS: u32 = 90;

/// Maps a confidence level to its two-sided z-score.
///
/// Levels outside `{0.80, 0.90, 0.95, 0.99}` fall back to 1.96.
#[must_use]
pub fn z_score(confidence_level: f64) -> f64 {
    Z_SCORES
        .iter()
        .find(|(level, _)| (level - confidence_level).abs() < 1e-9)
        .map_or(DEFAULT_Z_SCORE, |&(_, z)| z)
}

/// How the trend index continues past the last observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendIndexing {
    /// Step `k` uses index `n + k`, continuing the fitted positions.
    #[default]
    Continuous,
    /// Step `k` uses index `days + 1 + k`, as if the history had been
    /// exactly the inclusive `days`-long window ending on the last date.
    FixedWindow {
        /// Length of the assumed window.
        days: u32,
    },
}

impl TrendIndexing {
    /// The fixed 90-day window.
    #[must_use]
    pub const fn legacy() -> Self {
        Self::FixedWindow {
            days: LEGACY_WINDOW_DAYS,
        }
    }

    fn base_index(self, sample_count: usize) -> f64 {
        match self {
            Self::Continuous => sample_count as f64,
            Self::FixedWindow { days } => f64::from(days) + 1.0,
        }
    }
}

/// Parameters derived by [`StatisticalForecaster::train`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedState {
    /// Metric the model was trained for.
    pub metric: String,
    /// Trend slope per position.
    pub slope: f64,
    /// Trend value at position 0.
    pub intercept: f64,
    /// Multiplier per weekday (Monday = 0); `None` if the weekday never
    /// occurred in the training data.
    pub seasonality: [Option<f64>; 7],
    /// Mean of the training values.
    pub mean: f64,
    /// Sample standard deviation of the training values.
    pub std_dev: f64,
    /// Date of the last training observation.
    pub last_date: NaiveDate,
    /// Number of training observations.
    pub sample_count: usize,
}

impl TrainedState {
    /// Multiplier for a weekday, 1.0 when none was learned.
    #[must_use]
    pub fn seasonal_multiplier(&self, weekday: usize) -> f64 {
        self.seasonality.get(weekday).copied().flatten().unwrap_or(1.0)
    }

    fn trend_at(&self, index: f64) -> f64 {
        self.slope.mul_add(index, self.intercept)
    }
}

/// Linear trend plus multiplicative weekly seasonality.
#[derive(Clone, Debug, Default)]
pub struct StatisticalForecaster {
    indexing: TrendIndexing,
    state: Option<TrainedState>,
}

impl StatisticalForecaster {
    /// Create an untrained forecaster with continuous trend indexing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an untrained forecaster with the given trend indexing.
    #[must_use]
    pub const fn with_indexing(indexing: TrendIndexing) -> Self {
        Self {
            indexing,
            state: None,
        }
    }

    /// Returns the trend indexing in use.
    #[must_use]
    pub const fn indexing(&self) -> TrendIndexing {
        self.indexing
    }

    /// Returns the fitted parameters, if trained.
    #[must_use]
    pub const fn state(&self) -> Option<&TrainedState> {
        self.state.as_ref()
    }

    fn fit(series: &Series, metric: &str) -> TrainedState {
        let values = series.values();
        let n = values.len() as f64;

        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let (slope, intercept) = least_squares(&values);

        let mut sums = [0.0_f64; 7];
        let mut counts = [0usize; 7];
        for point in series.iter() {
            sums[point.weekday()] += point.value;
            counts[point.weekday()] += 1;
        }

        let mut seasonality = [None; 7];
        for (weekday, multiplier) in seasonality.iter_mut().enumerate() {
            if counts[weekday] == 0 {
                continue;
            }
            let ratio = sums[weekday] / counts[weekday] as f64 / mean;
            // A zero mean gives no usable ratio; those weekdays fall back to 1.0.
            if ratio.is_finite() {
                *multiplier = Some(ratio);
            }
        }

        TrainedState {
            metric: metric.to_string(),
            slope,
            intercept,
            seasonality,
            mean,
            std_dev: variance.sqrt(),
            last_date: series.last_date(),
            sample_count: series.len(),
        }
    }
}

/// Ordinary least-squares line through `(i, values[i])`.
fn least_squares(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
            let dx = i as f64 - x_mean;
            (dx.mul_add(y - y_mean, sxy), dx.mul_add(dx, sxx))
        });

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (slope, y_mean - slope * x_mean)
}

impl Forecaster for StatisticalForecaster {
    fn name(&self) -> &str {
        "statistical"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Statistical
    }

    fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    fn train(
        &mut self,
        series: &Series,
        metric: &str,
        _options: &TrainOptions,
    ) -> Result<TrainingResult> {
        info!(metric, samples = series.len(), "Training statistical model");

        let state = Self::fit(series, metric);

        let fitted: Vec<f64> = series
            .iter()
            .enumerate()
            .map(|(i, point)| state.trend_at(i as f64) * state.seasonal_multiplier(point.weekday()))
            .collect();
        let metrics = AccuracyMetrics::from_fitted(&series.values(), &fitted);

        debug!(
            metric,
            slope = state.slope,
            intercept = state.intercept,
            mape = metrics.mape,
            "Statistical model fitted"
        );

        self.state = Some(state);
        Ok(TrainingResult::new(
            ModelKind::Statistical,
            series.len(),
            metrics,
        ))
    }

    fn forecast_with_confidence(
        &self,
        horizon_days: usize,
        confidence_level: f64,
    ) -> Result<ForecastResult> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| ForecastError::UntrainedModel(self.name().to_string()))?;
        check_horizon(horizon_days)?;
        check_confidence(confidence_level)?;

        debug!(
            metric = %state.metric,
            horizon_days,
            confidence_level,
            "Generating statistical forecast"
        );

        let z = z_score(confidence_level);
        let base = self.indexing.base_index(state.sample_count);
        let spread = state.std_dev * z;

        let predictions = (0..horizon_days)
            .map(|k| {
                let date = state
                    .last_date
                    .checked_add_days(Days::new(k as u64 + 1))
                    .ok_or_else(|| {
                        ForecastError::InvalidParameter(format!(
                            "horizon of {horizon_days} days overflows the calendar"
                        ))
                    })?;

                let weekday = date.weekday().num_days_from_monday() as usize;
                let forecast =
                    state.trend_at(base + k as f64) * state.seasonal_multiplier(weekday);
                let uncertainty =
                    spread * (1.0 + (k as f64 / horizon_days as f64) * HORIZON_WIDENING);

                Ok(ForecastPoint::new(
                    date,
                    forecast,
                    forecast - uncertainty,
                    forecast + uncertainty,
                    confidence_level,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ForecastResult::new(
            state.metric.clone(),
            predictions,
            ModelKind::Statistical,
            confidence_level,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use forecast_core::{HistoricalPoint, Trend};
    use proptest::prelude::*;

    fn series_from(start: NaiveDate, values: &[f64]) -> Series {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoricalPoint::new(start + Days::new(i as u64), *v))
            .collect();
        Series::new(points).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn trained(values: &[f64]) -> StatisticalForecaster {
        let mut model = StatisticalForecaster::new();
        model
            .train(&series_from(monday(), values), "revenue", &TrainOptions::default())
            .unwrap();
        model
    }

    #[test]
    fn test_z_score_table() {
        assert_eq!(z_score(0.80), 1.28);
        assert_eq!(z_score(0.90), 1.645);
        assert_eq!(z_score(0.95), 1.96);
        assert_eq!(z_score(0.99), 2.576);
        assert_eq!(z_score(0.85), 1.96);
    }

    #[test]
    fn test_forecast_before_train_fails() {
        let model = StatisticalForecaster::new();
        assert!(!model.is_trained());
        assert!(matches!(
            model.forecast(7),
            Err(ForecastError::UntrainedModel(_))
        ));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let model = trained(&[100.0; 14]);
        assert!(matches!(
            model.forecast(0),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_constant_series() {
        let model = trained(&[100.0; 14]);
        let state = model.state().unwrap();
        assert_relative_eq!(state.slope, 0.0, epsilon = 1e-9);
        for weekday in 0..7 {
            assert_relative_eq!(state.seasonal_multiplier(weekday), 1.0, epsilon = 1e-9);
        }

        let forecast = model.forecast(7).unwrap();
        assert_eq!(forecast.predictions.len(), 7);
        assert_eq!(forecast.trend, Trend::Stable);
        for point in &forecast.predictions {
            assert_relative_eq!(point.forecast, 100.0, epsilon = 1e-9);
            assert!(point.upper_bound - point.lower_bound < 1e-6);
        }
    }

    #[test]
    fn test_linear_series() {
        let values: Vec<f64> = (0..14).map(|i| 100.0 + 10.0 * i as f64).collect();
        let mut model = StatisticalForecaster::new();
        let training = model
            .train(&series_from(monday(), &values), "revenue", &TrainOptions::default())
            .unwrap();
        assert_eq!(training.model_kind, ModelKind::Statistical);
        assert_eq!(training.sample_count, 14);

        let state = model.state().unwrap();
        assert_relative_eq!(state.slope, 10.0, epsilon = 1e-9);
        assert_relative_eq!(state.intercept, 100.0, epsilon = 1e-9);

        let forecast = model.forecast(5).unwrap();
        let first = forecast.first().unwrap();
        let weekday = first.date.weekday().num_days_from_monday() as usize;
        let deseasonalized = first.forecast / state.seasonal_multiplier(weekday);
        assert_relative_eq!(deseasonalized, values[13] + 10.0, epsilon = 1e-6);
        assert_eq!(forecast.trend, Trend::Increasing);
    }

    #[test]
    fn test_forecast_dates_follow_last_observation() {
        let model = trained(&[50.0; 10]);
        let forecast = model.forecast(3).unwrap();
        let dates: Vec<_> = forecast.predictions.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            ]
        );
    }

    #[test]
    fn test_weekly_pattern_recovered() {
        // Weekends at 80% of weekdays
        let values: Vec<f64> = (0..28)
            .map(|i| if i % 7 >= 5 { 80.0 } else { 100.0 })
            .collect();
        let model = trained(&values);
        let state = model.state().unwrap();
        let mean = (5.0 * 100.0 + 2.0 * 80.0) / 7.0;
        assert_relative_eq!(state.seasonal_multiplier(0), 100.0 / mean, epsilon = 1e-9);
        assert_relative_eq!(state.seasonal_multiplier(6), 80.0 / mean, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_weekday_defaults_to_one() {
        // Every Tuesday missing
        let points: Vec<_> = (0..21)
            .filter(|i| i % 7 != 1)
            .map(|i| HistoricalPoint::new(monday() + Days::new(i), 100.0 + i as f64))
            .collect();
        let mut model = StatisticalForecaster::new();
        model
            .train(&Series::new(points).unwrap(), "orders", &TrainOptions::default())
            .unwrap();
        let state = model.state().unwrap();
        assert!(state.seasonality[1].is_none());
        assert_eq!(state.seasonal_multiplier(1), 1.0);
    }

    #[test]
    fn test_zero_values_keep_accuracy_finite() {
        let mut values = vec![0.0; 3];
        values.extend([0.03, 0.035, 0.04, 0.032, 0.036, 0.031]);
        let mut model = StatisticalForecaster::new();
        let training = model
            .train(&series_from(monday(), &values), "churn_rate", &TrainOptions::default())
            .unwrap();
        assert!(training.metrics.mape.is_finite());
        assert!(training.metrics.accuracy.is_finite());
        assert!(training.metrics.accuracy >= 0.0);
    }

    #[test]
    fn test_all_zero_series() {
        let model = trained(&[0.0; 10]);
        let forecast = model.forecast(4).unwrap();
        assert_eq!(forecast.trend, Trend::Stable);
        assert!(forecast.predictions.iter().all(|p| p.forecast == 0.0));
    }

    #[test]
    fn test_legacy_window_index() {
        let values: Vec<f64> = (0..14).map(|i| 100.0 + 10.0 * i as f64).collect();
        let mut model = StatisticalForecaster::with_indexing(TrendIndexing::legacy());
        model
            .train(&series_from(monday(), &values), "revenue", &TrainOptions::default())
            .unwrap();
        let state = model.state().unwrap().clone();

        let forecast = model.forecast(2).unwrap();
        for (k, point) in forecast.predictions.iter().enumerate() {
            let weekday = point.date.weekday().num_days_from_monday() as usize;
            let expected = (state.slope * (91 + k) as f64 + state.intercept)
                * state.seasonal_multiplier(weekday);
            assert_relative_eq!(point.forecast, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_band_uses_confidence_level() {
        let values: Vec<f64> = (0..14).map(|i| 100.0 + (i % 3) as f64).collect();
        let model = trained(&values);
        let std_dev = model.state().unwrap().std_dev;

        let narrow = model.forecast_with_confidence(5, 0.80).unwrap();
        let wide = model.forecast_with_confidence(5, 0.99).unwrap();
        assert_relative_eq!(narrow.predictions[0].band_width(), 2.0 * std_dev * 1.28, epsilon = 1e-9);
        assert_relative_eq!(wide.predictions[0].band_width(), 2.0 * std_dev * 2.576, epsilon = 1e-9);
        assert_eq!(narrow.confidence_level, 0.80);
        assert!(narrow.predictions.iter().all(|p| p.confidence == 0.80));

        assert!(model.forecast_with_confidence(5, 1.5).is_err());
    }

    #[test]
    fn test_retrain_replaces_state() {
        let mut model = trained(&[100.0; 14]);
        model
            .train(&series_from(monday(), &[200.0; 14]), "revenue", &TrainOptions::default())
            .unwrap();
        let forecast = model.forecast(1).unwrap();
        assert_relative_eq!(forecast.predictions[0].forecast, 200.0, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn prop_forecast_invariants(
            values in prop::collection::vec(1.0f64..10_000.0, 7..60),
            horizon in 1usize..60,
        ) {
            let model = trained(&values);
            let forecast = model.forecast(horizon).unwrap();

            prop_assert_eq!(forecast.predictions.len(), horizon);
            prop_assert_eq!(forecast.horizon_days, horizon);

            for point in &forecast.predictions {
                prop_assert!(point.lower_bound <= point.forecast);
                prop_assert!(point.forecast <= point.upper_bound);
            }

            let scale = values.iter().fold(1.0f64, |m, v| m.max(v.abs()));
            for pair in forecast.predictions.windows(2) {
                prop_assert!(pair[1].band_width() >= pair[0].band_width() - 1e-9 * scale);
            }
        }

        #[test]
        fn prop_training_is_deterministic(
            values in prop::collection::vec(-500.0f64..500.0, 7..40),
            horizon in 1usize..30,
        ) {
            let first = trained(&values).forecast(horizon).unwrap();
            let second = trained(&values).forecast(horizon).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
