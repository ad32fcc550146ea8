//! Core data types for metric forecasting.
//!
//! This module defines the fundamental data structures:
//!
//! - [`TenantId`] - Tenant identifier
//! - [`HistoricalPoint`] / [`Series`] - Validated historical observations
//! - [`ForecastPoint`] / [`ForecastResult`] - Forecast output
//! - [`Trend`] - Direction label derived from a forecast
//! - [`ModelKind`] - Which backend produced a result
//! - [`AccuracyMetrics`] / [`TrainingResult`] - In-sample diagnostics
//! - [`CacheKey`] - Identity of a trained-model slot

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForecastError, Result};

/// Minimum number of points in a series: one full week, so that every
/// weekday can be observed.
pub const MIN_SERIES_LEN: usize = 7;

/// Percentage change between the first and last forecast value above which
/// a forecast is labelled increasing (and below whose negation, decreasing).
pub const TREND_THRESHOLD_PCT: f64 = 5.0;

/// Identifier of the tenant that owns a metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A single observation of a metric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    /// Calendar date of the observation.
    pub date: NaiveDate,
    /// Observed value.
    pub value: f64,
}

impl HistoricalPoint {
    /// Creates a new historical point.
    #[must_use]
    pub const fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    /// Day of week, Monday = 0 through Sunday = 6.
    #[must_use]
    pub fn weekday(&self) -> usize {
        self.date.weekday().num_days_from_monday() as usize
    }
}

/// A chronologically ordered series of at least [`MIN_SERIES_LEN`] points
/// with strictly increasing dates.
///
/// Missing calendar days are allowed; backends index points by position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    points: Vec<HistoricalPoint>,
}

impl Series {
    /// Builds a series, sorting the points by date.
    ///
    /// Fails with [`ForecastError::InvalidSeries`] if there are fewer than
    /// [`MIN_SERIES_LEN`] points, any value is not finite, or two points share
    /// a date.
    pub fn new(mut points: Vec<HistoricalPoint>) -> Result<Self> {
        if points.len() < MIN_SERIES_LEN {
            return Err(ForecastError::InvalidSeries(format!(
                "need at least {MIN_SERIES_LEN} points, got {}",
                points.len()
            )));
        }

        if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(ForecastError::InvalidSeries(format!(
                "non-finite value on {}",
                bad.date
            )));
        }

        points.sort_by_key(|p| p.date);

        if let Some(pair) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(ForecastError::InvalidSeries(format!(
                "duplicate date {}",
                pair[0].date
            )));
        }

        Ok(Self { points })
    }

    /// Returns the number of points, never below [`MIN_SERIES_LEN`].
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns the points in chronological order.
    #[must_use]
    pub fn points(&self) -> &[HistoricalPoint] {
        &self.points
    }

    /// Returns an iterator over the points.
    pub fn iter(&self) -> impl Iterator<Item = &HistoricalPoint> {
        self.points.iter()
    }

    /// Returns the observed values in chronological order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Date of the earliest observation.
    #[must_use]
    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    /// Date of the latest observation.
    #[must_use]
    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            points: Vec<HistoricalPoint>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.points).map_err(serde::de::Error::custom)
    }
}

/// Direction of a forecast, judged from its first and last point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// More than a 5% rise over the horizon.
    Increasing,
    /// More than a 5% fall over the horizon.
    Decreasing,
    /// Within ±5%.
    Stable,
}

impl Trend {
    /// Labels the change from `first` to `last`.
    ///
    /// A zero `first` value is judged by the sign of `last`.
    #[must_use]
    pub fn from_endpoints(first: f64, last: f64) -> Self {
        if first == 0.0 {
            return if last > 0.0 {
                Self::Increasing
            } else if last < 0.0 {
                Self::Decreasing
            } else {
                Self::Stable
            };
        }

        let change_pct = (last - first) / first * 100.0;
        if change_pct > TREND_THRESHOLD_PCT {
            Self::Increasing
        } else if change_pct < -TREND_THRESHOLD_PCT {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    /// Labels a sequence of forecast points; an empty sequence is stable.
    #[must_use]
    pub fn detect(points: &[ForecastPoint]) -> Self {
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => Self::from_endpoints(first.forecast, last.forecast),
            _ => Self::Stable,
        }
    }

    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend (or combination) that produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Linear trend with day-of-week seasonality.
    Statistical,
    /// Trainable neural sequence model.
    Sequence,
    /// External decomposition-based backend.
    Decomposition,
    /// Weighted combination of a primary and a secondary backend.
    Ensemble,
}

impl ModelKind {
    /// Returns the snake_case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::Sequence => "sequence",
            Self::Decomposition => "decomposition",
            Self::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-backend forecasts retained on an ensemble point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentForecasts {
    /// Point forecast of the primary backend.
    pub primary_forecast: f64,
    /// Point forecast of the secondary backend.
    pub secondary_forecast: f64,
}

/// A single forecast step.
///
/// Backends in this workspace keep `lower_bound <= forecast <= upper_bound`,
/// but the type does not enforce it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Calendar date being forecast.
    pub date: NaiveDate,
    /// Point forecast.
    pub forecast: f64,
    /// Lower edge of the confidence band.
    pub lower_bound: f64,
    /// Upper edge of the confidence band.
    pub upper_bound: f64,
    /// Confidence level of the band, in (0, 1).
    pub confidence: f64,
    /// Component forecasts, present only on ensemble output.
    #[serde(flatten)]
    pub components: Option<ComponentForecasts>,
}

impl ForecastPoint {
    /// Creates a new forecast point.
    #[must_use]
    pub const fn new(
        date: NaiveDate,
        forecast: f64,
        lower_bound: f64,
        upper_bound: f64,
        confidence: f64,
    ) -> Self {
        Self {
            date,
            forecast,
            lower_bound,
            upper_bound,
            confidence,
            components: None,
        }
    }

    /// Attaches the component forecasts of an ensemble.
    #[must_use]
    pub const fn with_components(mut self, primary: f64, secondary: f64) -> Self {
        self.components = Some(ComponentForecasts {
            primary_forecast: primary,
            secondary_forecast: secondary,
        });
        self
    }

    /// Width of the confidence band.
    #[must_use]
    pub fn band_width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }
}

/// A complete forecast over a horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Metric being forecast.
    pub metric: String,
    /// Number of forecast steps.
    pub horizon_days: usize,
    /// One point per day, in date order.
    pub predictions: Vec<ForecastPoint>,
    /// Direction of the forecast.
    pub trend: Trend,
    /// Backend that produced the forecast.
    pub model_kind: ModelKind,
    /// Confidence level of the bands.
    pub confidence_level: f64,
}

impl ForecastResult {
    /// Assembles a result, deriving `horizon_days` and `trend` from the
    /// predictions.
    #[must_use]
    pub fn new(
        metric: impl Into<String>,
        predictions: Vec<ForecastPoint>,
        model_kind: ModelKind,
        confidence_level: f64,
    ) -> Self {
        let trend = Trend::detect(&predictions);
        Self {
            metric: metric.into(),
            horizon_days: predictions.len(),
            predictions,
            trend,
            model_kind,
            confidence_level,
        }
    }

    /// First forecast point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&ForecastPoint> {
        self.predictions.first()
    }

    /// Last forecast point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&ForecastPoint> {
        self.predictions.last()
    }
}

/// In-sample accuracy of a trained backend.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
    /// `max(0, 100 - mape)`.
    pub accuracy: f64,
}

impl AccuracyMetrics {
    /// Compares fitted values against actuals.
    ///
    /// Zero-valued actuals are skipped when computing MAPE. If every actual
    /// is zero, MAPE is reported as 100 (accuracy 0). Both slices must have
    /// the same non-zero length.
    #[must_use]
    pub fn from_fitted(actual: &[f64], fitted: &[f64]) -> Self {
        debug_assert_eq!(actual.len(), fitted.len());
        let n = actual.len().min(fitted.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                mape: 100.0,
                accuracy: 0.0,
            };
        }

        let mae = actual
            .iter()
            .zip(fitted)
            .map(|(a, f)| (a - f).abs())
            .sum::<f64>()
            / n as f64;

        let (pct_sum, pct_count) = actual
            .iter()
            .zip(fitted)
            .filter(|(a, _)| **a != 0.0)
            .fold((0.0, 0usize), |(sum, count), (a, f)| {
                (sum + ((a - f) / a).abs(), count + 1)
            });

        let mape = if pct_count == 0 {
            100.0
        } else {
            pct_sum / pct_count as f64 * 100.0
        };

        Self {
            mae,
            mape,
            accuracy: (100.0 - mape).max(0.0),
        }
    }
}

/// Outcome of training a backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Backend that was trained.
    pub model_kind: ModelKind,
    /// Number of samples the backend fitted against.
    pub sample_count: usize,
    /// In-sample accuracy.
    pub metrics: AccuracyMetrics,
}

impl TrainingResult {
    /// Creates a new training result.
    #[must_use]
    pub const fn new(model_kind: ModelKind, sample_count: usize, metrics: AccuracyMetrics) -> Self {
        Self {
            model_kind,
            sample_count,
            metrics,
        }
    }
}

/// Identity of a trained-model slot in a model cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Metric name.
    pub metric: String,
    /// Forecast horizon the model was requested for.
    pub horizon_days: usize,
    /// Whether the ensemble was requested.
    pub ensemble: bool,
}

impl CacheKey {
    /// Creates a new cache key.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<TenantId>,
        metric: impl Into<String>,
        horizon_days: usize,
        ensemble: bool,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            metric: metric.into(),
            horizon_days,
            ensemble,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.tenant_id, self.metric, self.horizon_days, self.ensemble
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn week() -> Vec<HistoricalPoint> {
        (1..=7).map(|d| HistoricalPoint::new(date(d), d as f64)).collect()
    }

    #[test]
    fn test_series_sorts_points() {
        let mut points = week();
        points.reverse();
        let series = Series::new(points).unwrap();
        assert_eq!(series.first_date(), date(1));
        assert_eq!(series.last_date(), date(7));
        assert_eq!(series.values(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_series_rejects_short_and_duplicates() {
        let short = week().into_iter().take(6).collect();
        assert!(matches!(
            Series::new(short),
            Err(ForecastError::InvalidSeries(_))
        ));

        let mut dup = week();
        dup.push(HistoricalPoint::new(date(3), 9.0));
        let err = Series::new(dup).unwrap_err();
        assert!(err.to_string().contains("duplicate date 2024-01-03"));
    }

    #[test]
    fn test_series_rejects_non_finite() {
        let mut points = week();
        points[2].value = f64::NAN;
        assert!(Series::new(points).is_err());
    }

    #[test]
    fn test_weekday_index() {
        // 2024-01-01 was a Monday
        assert_eq!(HistoricalPoint::new(date(1), 0.0).weekday(), 0);
        assert_eq!(HistoricalPoint::new(date(7), 0.0).weekday(), 6);
    }

    #[test]
    fn test_trend_labels() {
        assert_eq!(Trend::from_endpoints(100.0, 106.0), Trend::Increasing);
        assert_eq!(Trend::from_endpoints(100.0, 94.0), Trend::Decreasing);
        assert_eq!(Trend::from_endpoints(100.0, 105.0), Trend::Stable);
        assert_eq!(Trend::from_endpoints(0.0, 1.0), Trend::Increasing);
        assert_eq!(Trend::from_endpoints(0.0, -1.0), Trend::Decreasing);
        assert_eq!(Trend::from_endpoints(0.0, 0.0), Trend::Stable);
        assert_eq!(Trend::detect(&[]), Trend::Stable);
    }

    #[test]
    fn test_accuracy_metrics_skip_zero_actuals() {
        let metrics = AccuracyMetrics::from_fitted(&[0.0, 100.0, 200.0], &[5.0, 110.0, 180.0]);
        assert!((metrics.mae - (5.0 + 10.0 + 20.0) / 3.0).abs() < 1e-12);
        assert!((metrics.mape - 10.0).abs() < 1e-12);
        assert!((metrics.accuracy - 90.0).abs() < 1e-12);
        assert!(metrics.accuracy.is_finite());
    }

    #[test]
    fn test_accuracy_metrics_all_zero() {
        let metrics = AccuracyMetrics::from_fitted(&[0.0, 0.0], &[1.0, -1.0]);
        assert_eq!(metrics.mape, 100.0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_accuracy_clamped_at_zero() {
        let metrics = AccuracyMetrics::from_fitted(&[1.0], &[5.0]);
        assert_eq!(metrics.mape, 400.0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_forecast_point_serialization() {
        let point = ForecastPoint::new(date(8), 10.0, 8.0, 12.0, 0.95);
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(json["date"], "2024-01-08");
        assert!(json.get("primary_forecast").is_none());

        let json = serde_json::to_value(point.with_components(11.0, 8.5)).unwrap();
        assert_eq!(json["primary_forecast"], 11.0);
        assert_eq!(json["secondary_forecast"], 8.5);
    }

    #[test]
    fn test_forecast_result_fields() {
        let points = vec![
            ForecastPoint::new(date(8), 100.0, 90.0, 110.0, 0.95),
            ForecastPoint::new(date(9), 120.0, 110.0, 130.0, 0.95),
        ];
        let result = ForecastResult::new("revenue", points, ModelKind::Statistical, 0.95);
        assert_eq!(result.horizon_days, 2);
        assert_eq!(result.trend, Trend::Increasing);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["trend"], "increasing");
        assert_eq!(json["model_kind"], "statistical");
        assert_eq!(json["horizon_days"], 2);
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new("acme", "revenue", 30, true);
        assert_eq!(key.to_string(), "acme:revenue:30:true");
    }
}
