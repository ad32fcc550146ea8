//! Forecast engine tying together the data source, model cache, and backends.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use forecast_cache::InMemoryModelCache;
use forecast_core::{
    BackendFactory, BoxedForecaster, CacheKey, DEFAULT_CONFIDENCE_LEVEL, DegradationReason,
    ForecastError, ForecastPoint, ForecastResult, Forecaster, HistoricalDataSource, ModelCache,
    ModelKind, Result, Series, SharedForecaster, TenantId, TrainOptions, TrainingResult, Trend,
    check_confidence, check_horizon,
};
use forecast_stats::StatisticalForecaster;

use crate::{
    config::EngineConfig,
    ensemble::{EnsembleForecaster, EnsembleWeights},
};

/// Horizon used when a request does not name one.
pub const DEFAULT_HORIZON_DAYS: usize = 30;

/// Parameters of a forecast generation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// Metric to forecast.
    pub metric: String,
    /// Days to forecast.
    #[serde(default = "default_horizon")]
    pub horizon_days: usize,
    /// Confidence level of the primary band.
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
}

const fn default_horizon() -> usize {
    DEFAULT_HORIZON_DAYS
}

const fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE_LEVEL
}

impl ForecastRequest {
    /// Creates a request at the default confidence level.
    #[must_use]
    pub fn new(metric: impl Into<String>, horizon_days: usize) -> Self {
        Self {
            metric: metric.into(),
            horizon_days,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }

    /// Set the confidence level.
    #[must_use]
    pub const fn with_confidence_level(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }
}

/// Headline figures of a forecast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    /// Direction of the forecast.
    pub trend: Trend,
    /// First forecast point.
    pub first_prediction: Option<ForecastPoint>,
    /// Last forecast point.
    pub last_prediction: Option<ForecastPoint>,
}

impl From<&ForecastResult> for ForecastSummary {
    fn from(forecast: &ForecastResult) -> Self {
        Self {
            trend: forecast.trend,
            first_prediction: forecast.first().copied(),
            last_prediction: forecast.last().copied(),
        }
    }
}

/// Outcome of [`ForecastEngine::generate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Identifier of this run, `forecast_<unix millis>`.
    pub job_id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Metric forecast.
    pub metric: String,
    /// Days forecast.
    pub horizon_days: usize,
    /// Model that was trained and cached.
    pub model_kind: ModelKind,
    /// Wall-clock training time.
    pub training_duration_seconds: f64,
    /// Training outcome of the cached model.
    pub training: TrainingResult,
    /// Weights in effect after training.
    pub ensemble_weights: EnsembleWeights,
    /// Why an ensemble request fell back to the primary, if it did.
    pub degradation: Option<String>,
    /// Headline forecast figures.
    pub forecast_summary: ForecastSummary,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
}

/// Times a cache slot may be claimed by another caller's training run
/// before [`ForecastEngine::generate`] gives up.
const GENERATE_ATTEMPTS: usize = 3;

/// What a training run reported.
#[derive(Debug)]
struct TrainingRun {
    training: TrainingResult,
    weights: EnsembleWeights,
    degradation: Option<DegradationReason>,
    duration: Duration,
}

/// A freshly trained model and its run.
#[derive(Debug)]
struct TrainedModel {
    model: BoxedForecaster,
    run: TrainingRun,
}

/// Trains and serves forecasts per tenant and metric.
///
/// The engine fetches history from a [`HistoricalDataSource`], trains a
/// statistical model or an ensemble, and memoizes the trained model in a
/// [`ModelCache`] keyed by tenant, metric, horizon, and ensemble mode.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use forecast::{ForecastEngine, InMemorySource, TenantId};
///
/// let source = Arc::new(InMemorySource::new().with_records("acme", "revenue", records));
/// let engine = ForecastEngine::new(source);
///
/// let forecast = engine
///     .train_and_forecast(&TenantId::new("acme"), "revenue", 30, true, false)
///     .await?;
/// println!("{} over the next 30 days", forecast.trend);
/// ```
pub struct ForecastEngine {
    source: Arc<dyn HistoricalDataSource>,
    cache: Arc<dyn ModelCache>,
    secondary: Option<Arc<dyn BackendFactory>>,
    config: EngineConfig,
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("source", &self.source.name())
            .field("cache", &"configured")
            .field("secondary", &self.secondary.as_ref().map(|s| s.name()))
            .field("config", &self.config)
            .finish()
    }
}

impl ForecastEngine {
    /// Create an engine over `source` with an in-memory cache, the default
    /// configuration, and the neural secondary backend when compiled in.
    #[must_use]
    pub fn new(source: Arc<dyn HistoricalDataSource>) -> Self {
        Self {
            source,
            cache: Arc::new(InMemoryModelCache::new()),
            secondary: default_secondary(),
            config: EngineConfig::default(),
        }
    }

    /// Set the model cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ModelCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the secondary backend used by ensembles.
    #[must_use]
    pub fn with_secondary(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        debug!(backend = factory.name(), "Registering secondary backend");
        self.secondary = Some(factory);
        self
    }

    /// Remove the secondary backend; ensembles degrade to the primary.
    #[must_use]
    pub fn without_secondary(mut self) -> Self {
        self.secondary = None;
        self
    }

    /// Set the configuration after validating it.
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the model cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ModelCache> {
        &self.cache
    }

    /// Returns true if a usable secondary backend is configured.
    #[must_use]
    pub fn secondary_available(&self) -> bool {
        self.secondary.as_ref().is_some_and(|s| s.is_available())
    }

    /// Forecasts a tenant's metric, training and caching a model on a miss.
    ///
    /// With `force_retrain` the cached model for this key is discarded
    /// first; a run already in flight for the key is joined instead.
    /// Concurrent calls for the same key train once.
    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub async fn train_and_forecast(
        &self,
        tenant_id: &TenantId,
        metric: &str,
        horizon_days: usize,
        use_ensemble: bool,
        force_retrain: bool,
    ) -> Result<ForecastResult> {
        check_horizon(horizon_days)?;
        let key = CacheKey::new(tenant_id.clone(), metric, horizon_days, use_ensemble);

        if force_retrain && self.cache.invalidate(&key).await? {
            info!(key = %key, "Cleared cached model");
        }

        let model = self
            .cache
            .get_or_train(
                &key,
                async move {
                    let trained = self.fetch_and_train(tenant_id, metric, use_ensemble).await?;
                    Ok(SharedForecaster::from(trained.model))
                }
                .boxed(),
            )
            .await?;

        model.forecast_with_confidence(horizon_days, self.config.confidence_level)
    }

    /// Retrains a tenant's metric unconditionally, caches the new model, and
    /// reports on the run.
    ///
    /// Training happens inside the cache's per-key single flight, so
    /// requests for the same key arriving meanwhile wait for this model. If
    /// another caller's run already holds the key, that run is awaited and
    /// then replaced.
    #[instrument(skip(self, request), fields(tenant = %tenant_id, metric = %request.metric))]
    pub async fn generate(
        &self,
        tenant_id: &TenantId,
        request: &ForecastRequest,
        use_ensemble: bool,
    ) -> Result<GenerationReport> {
        check_horizon(request.horizon_days)?;
        check_confidence(request.confidence_level)?;

        let key = CacheKey::new(
            tenant_id.clone(),
            request.metric.as_str(),
            request.horizon_days,
            use_ensemble,
        );
        for attempt in 1..=GENERATE_ATTEMPTS {
            if self.cache.invalidate(&key).await? {
                debug!(key = %key, "Cleared cached model");
            }

            let claimed = Mutex::new(None);
            let model = self
                .cache
                .get_or_train(
                    &key,
                    async {
                        let TrainedModel { model, run } = self
                            .fetch_and_train(tenant_id, &request.metric, use_ensemble)
                            .await?;
                        *claimed.lock().await = Some(run);
                        Ok(SharedForecaster::from(model))
                    }
                    .boxed(),
                )
                .await?;

            match claimed.into_inner() {
                Some(run) => return generation_report(tenant_id, request, &model, run),
                None => debug!(attempt, "Key held by another training run, retraining"),
            }
        }

        Err(ForecastError::Other(format!(
            "could not claim {key} for retraining after {GENERATE_ATTEMPTS} attempts"
        )))
    }

    /// Trains on a caller-supplied series and forecasts, bypassing the
    /// data source and the cache.
    #[instrument(skip(self, series), fields(samples = series.len()))]
    pub async fn forecast_series(
        &self,
        series: Series,
        metric: &str,
        horizon_days: usize,
        use_ensemble: bool,
    ) -> Result<(TrainingResult, ForecastResult)> {
        check_horizon(horizon_days)?;
        let trained = self.train_on(series, metric, use_ensemble).await?;
        let forecast = trained
            .model
            .forecast_with_confidence(horizon_days, self.config.confidence_level)?;
        Ok((trained.run.training, forecast))
    }

    async fn fetch_and_train(
        &self,
        tenant_id: &TenantId,
        metric: &str,
        use_ensemble: bool,
    ) -> Result<TrainedModel> {
        let series = self
            .source
            .fetch_series(tenant_id, metric, self.config.history_days)
            .await?;
        debug!(
            source = self.source.name(),
            samples = series.len(),
            "Fetched training series"
        );
        self.train_on(series, metric, use_ensemble).await
    }

    async fn train_on(
        &self,
        series: Series,
        metric: &str,
        use_ensemble: bool,
    ) -> Result<TrainedModel> {
        let primary = StatisticalForecaster::with_indexing(self.config.trend_indexing);
        let options = TrainOptions::default()
            .with_secondary(use_ensemble)
            .with_iterations(self.config.secondary_iterations);
        let started = Instant::now();

        if !use_ensemble {
            let (model, training) = train_blocking(primary, series, metric, options).await?;
            return Ok(TrainedModel {
                model: Box::new(model),
                run: TrainingRun {
                    training,
                    weights: EnsembleWeights::PRIMARY_ONLY,
                    degradation: None,
                    duration: started.elapsed(),
                },
            });
        }

        let mut ensemble =
            EnsembleForecaster::new(Box::new(primary)).with_weights(self.config.weights);
        if let Some(factory) = &self.secondary {
            ensemble = ensemble.with_secondary(Arc::clone(factory));
        }

        let (ensemble, training) = train_blocking(ensemble, series, metric, options).await?;
        let run = TrainingRun {
            training,
            weights: ensemble.weights(),
            degradation: ensemble.degradation().cloned(),
            duration: started.elapsed(),
        };
        Ok(TrainedModel {
            model: Box::new(ensemble),
            run,
        })
    }
}

/// Builds the report for a finished generation run.
fn generation_report(
    tenant_id: &TenantId,
    request: &ForecastRequest,
    model: &SharedForecaster,
    run: TrainingRun,
) -> Result<GenerationReport> {
    let TrainingRun {
        training,
        weights,
        degradation,
        duration,
    } = run;
    info!(
        seconds = duration.as_secs_f64(),
        model_kind = %training.model_kind,
        "Training completed"
    );

    let forecast =
        model.forecast_with_confidence(request.horizon_days, request.confidence_level)?;

    let completed_at = Utc::now();
    Ok(GenerationReport {
        job_id: format!("forecast_{}", completed_at.timestamp_millis()),
        tenant_id: tenant_id.clone(),
        metric: request.metric.clone(),
        horizon_days: request.horizon_days,
        model_kind: training.model_kind,
        training_duration_seconds: duration.as_secs_f64(),
        training,
        ensemble_weights: weights,
        degradation: degradation.map(|reason| reason.to_string()),
        forecast_summary: ForecastSummary::from(&forecast),
        completed_at,
    })
}

/// Runs a training pass on the blocking thread pool.
async fn train_blocking<F>(
    mut model: F,
    series: Series,
    metric: &str,
    options: TrainOptions,
) -> Result<(F, TrainingResult)>
where
    F: Forecaster + 'static,
{
    let metric = metric.to_string();
    tokio::task::spawn_blocking(move || {
        let training = model.train(&series, &metric, &options)?;
        Ok::<_, ForecastError>((model, training))
    })
    .await
    .map_err(|e| ForecastError::Other(format!("training task failed: {e}")))?
}

#[cfg(feature = "neural")]
fn default_secondary() -> Option<Arc<dyn BackendFactory>> {
    Some(Arc::new(forecast_neural::SequenceBackend::new()))
}

#[cfg(not(feature = "neural"))]
fn default_secondary() -> Option<Arc<dyn BackendFactory>> {
    None
}
