#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/forecast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Neural sequence forecaster.
//!
//! This crate provides [`SequenceForecaster`], which implements the
//! [`Forecaster`] trait from `forecast-core`, and [`SequenceBackend`], a
//! [`BackendFactory`] that sizes the window to the training series.
//!
//! # Example
//!
//! ```no_run
//! use forecast_core::{Forecaster, Series, TrainOptions};
//! use forecast_neural::{SequenceConfig, SequenceForecaster};
//!
//! # fn example(series: Series) -> forecast_core::Result<()> {
//! let mut model = SequenceForecaster::new(SequenceConfig::default().with_sequence_length(7));
//! model.train(&series, "revenue", &TrainOptions::default().with_iterations(100))?;
//!
//! let forecast = model.forecast(14)?;
//! println!("{} points", forecast.predictions.len());
//! # Ok(())
//! # }
//! ```

use chrono::{Days, NaiveDate};
use forecast_core::{
    AccuracyMetrics, BackendFactory, BoxedForecaster, ForecastError, ForecastPoint,
    ForecastResult, Forecaster, ModelKind, Result, Series, TrainOptions, TrainingResult,
    check_confidence, check_horizon,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Largest window the factory will pick.
const MAX_SEQUENCE_LENGTH: usize = 7;

/// Half-width of the reported band, as a fraction of the forecast.
const BAND_FRACTION: f64 = 0.10;

/// Adam moment decay rates and stabilizer.
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// How often (in epochs) training loss is logged.
const LOG_EVERY: usize = 20;

/// Network shape and optimizer settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Number of past values fed to the network.
    pub sequence_length: usize,
    /// Width of the hidden layer.
    pub hidden_size: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Seed for weight initialisation.
    pub seed: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            sequence_length: MAX_SEQUENCE_LENGTH,
            hidden_size: 16,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

impl SequenceConfig {
    /// Sets the window length.
    #[must_use]
    pub const fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = sequence_length;
        self
    }

    /// Sets the hidden layer width.
    #[must_use]
    pub const fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the initialisation seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Min-max scaling to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct MinMaxScaler {
    min: f64,
    range: f64,
}

impl MinMaxScaler {
    fn fit(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = if max > min { max - min } else { 1.0 };
        Self { min, range }
    }

    fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range
    }

    fn inverse(&self, scaled: f64) -> f64 {
        scaled.mul_add(self.range, self.min)
    }
}

/// One hidden tanh layer feeding a linear output.
///
/// Parameters are stored flat: input weights (hidden × window), hidden
/// biases, output weights, output bias.
#[derive(Clone, Debug, PartialEq)]
struct Network {
    window: usize,
    hidden: usize,
    params: Vec<f64>,
}

impl Network {
    fn new(window: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let input_bound = 1.0 / (window as f64).sqrt();
        let output_bound = 1.0 / (hidden as f64).sqrt();

        let mut params = Vec::with_capacity(hidden * window + 2 * hidden + 1);
        params.extend((0..hidden * window).map(|_| rng.gen_range(-input_bound..input_bound)));
        params.extend((0..hidden).map(|_| rng.gen_range(-input_bound..input_bound)));
        params.extend((0..hidden).map(|_| rng.gen_range(-output_bound..output_bound)));
        params.push(rng.gen_range(-output_bound..output_bound));

        Self {
            window,
            hidden,
            params,
        }
    }

    fn hidden_bias_offset(&self) -> usize {
        self.hidden * self.window
    }

    fn output_weight_offset(&self) -> usize {
        self.hidden_bias_offset() + self.hidden
    }

    fn output_bias_offset(&self) -> usize {
        self.output_weight_offset() + self.hidden
    }

    /// Returns the hidden activations and the output.
    fn forward(&self, input: &[f64]) -> (Vec<f64>, f64) {
        let hb = self.hidden_bias_offset();
        let ow = self.output_weight_offset();

        let activations: Vec<f64> = (0..self.hidden)
            .map(|j| {
                let weights = &self.params[j * self.window..(j + 1) * self.window];
                let z = weights
                    .iter()
                    .zip(input)
                    .fold(self.params[hb + j], |acc, (w, x)| w.mul_add(*x, acc));
                z.tanh()
            })
            .collect();

        let output = activations
            .iter()
            .enumerate()
            .fold(self.params[self.output_bias_offset()], |acc, (j, h)| {
                self.params[ow + j].mul_add(*h, acc)
            });

        (activations, output)
    }

    fn predict(&self, input: &[f64]) -> f64 {
        self.forward(input).1
    }

    /// Mean squared error over the batch and its gradient.
    fn loss_and_gradient(&self, inputs: &[Vec<f64>], targets: &[f64]) -> (f64, Vec<f64>) {
        let hb = self.hidden_bias_offset();
        let ow = self.output_weight_offset();
        let ob = self.output_bias_offset();
        let n = targets.len() as f64;

        let mut grad = vec![0.0; self.params.len()];
        let mut loss = 0.0;

        for (input, target) in inputs.iter().zip(targets) {
            let (activations, output) = self.forward(input);
            let err = output - target;
            loss += err * err / n;

            let d_out = 2.0 * err / n;
            grad[ob] += d_out;
            for (j, h) in activations.iter().enumerate() {
                grad[ow + j] += d_out * h;
                let d_hidden = d_out * self.params[ow + j] * (1.0 - h * h);
                grad[hb + j] += d_hidden;
                for (k, x) in input.iter().enumerate() {
                    grad[j * self.window + k] += d_hidden * x;
                }
            }
        }

        (loss, grad)
    }
}

/// Adam optimizer state.
#[derive(Debug)]
struct Adam {
    learning_rate: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    step: i32,
}

impl Adam {
    fn new(size: usize, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            m: vec![0.0; size],
            v: vec![0.0; size],
            step: 0,
        }
    }

    fn update(&mut self, params: &mut [f64], grad: &[f64]) {
        self.step += 1;
        let m_correction = 1.0 - BETA1.powi(self.step);
        let v_correction = 1.0 - BETA2.powi(self.step);

        for (i, (p, g)) in params.iter_mut().zip(grad).enumerate() {
            self.m[i] = BETA1.mul_add(self.m[i], (1.0 - BETA1) * g);
            self.v[i] = BETA2.mul_add(self.v[i], (1.0 - BETA2) * g * g);
            let m_hat = self.m[i] / m_correction;
            let v_hat = self.v[i] / v_correction;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
        }
    }
}

/// State retained after training.
#[derive(Clone, Debug)]
struct TrainedModel {
    metric: String,
    network: Network,
    scaler: MinMaxScaler,
    /// Last `sequence_length` scaled observations.
    seed_window: Vec<f64>,
    last_date: NaiveDate,
}

/// Sliding-window neural forecaster.
#[derive(Clone, Debug, Default)]
pub struct SequenceForecaster {
    config: SequenceConfig,
    model: Option<TrainedModel>,
}

impl SequenceForecaster {
    /// Create an untrained forecaster.
    #[must_use]
    pub const fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SequenceConfig {
        &self.config
    }

    fn windows(scaled: &[f64], window: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        scaled
            .windows(window + 1)
            .map(|w| (w[..window].to_vec(), w[window]))
            .unzip()
    }
}

impl Forecaster for SequenceForecaster {
    fn name(&self) -> &str {
        "sequence"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Sequence
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn train(
        &mut self,
        series: &Series,
        metric: &str,
        options: &TrainOptions,
    ) -> Result<TrainingResult> {
        let window = self.config.sequence_length;
        if window == 0 || self.config.hidden_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "sequence_length and hidden_size must be at least 1".to_string(),
            ));
        }
        if options.iterations == 0 {
            return Err(ForecastError::InvalidParameter(
                "iterations must be at least 1".to_string(),
            ));
        }
        if series.len() <= window {
            return Err(ForecastError::InvalidSeries(format!(
                "need more than {window} points for a window of {window}, got {}",
                series.len()
            )));
        }

        info!(
            metric,
            samples = series.len(),
            window,
            iterations = options.iterations,
            "Training sequence model"
        );

        let values = series.values();
        let scaler = MinMaxScaler::fit(&values);
        let scaled: Vec<f64> = values.iter().map(|v| scaler.transform(*v)).collect();
        let (inputs, targets) = Self::windows(&scaled, window);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network = Network::new(window, self.config.hidden_size, &mut rng);
        let mut optimizer = Adam::new(network.params.len(), self.config.learning_rate);

        let mut loss = f64::NAN;
        for epoch in 0..options.iterations {
            let (epoch_loss, grad) = network.loss_and_gradient(&inputs, &targets);
            optimizer.update(&mut network.params, &grad);
            loss = epoch_loss;

            if (epoch + 1) % LOG_EVERY == 0 {
                debug!(metric, epoch = epoch + 1, loss, "Sequence training progress");
            }
        }

        if !loss.is_finite() {
            return Err(ForecastError::Backend {
                backend: self.name().to_string(),
                message: format!("training diverged (loss {loss})"),
            });
        }

        let fitted: Vec<f64> = inputs
            .iter()
            .map(|input| scaler.inverse(network.predict(input)))
            .collect();
        let actual: Vec<f64> = targets.iter().map(|t| scaler.inverse(*t)).collect();
        let metrics = AccuracyMetrics::from_fitted(&actual, &fitted);

        self.model = Some(TrainedModel {
            metric: metric.to_string(),
            network,
            scaler,
            seed_window: scaled[scaled.len() - window..].to_vec(),
            last_date: series.last_date(),
        });

        Ok(TrainingResult::new(
            ModelKind::Sequence,
            targets.len(),
            metrics,
        ))
    }

    fn forecast_with_confidence(
        &self,
        horizon_days: usize,
        confidence_level: f64,
    ) -> Result<ForecastResult> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ForecastError::UntrainedModel(self.name().to_string()))?;
        check_horizon(horizon_days)?;
        check_confidence(confidence_level)?;

        debug!(metric = %model.metric, horizon_days, "Generating sequence forecast");

        let window = model.network.window;
        let mut sequence = model.seed_window.clone();
        sequence.reserve(horizon_days);

        let mut predictions = Vec::with_capacity(horizon_days);
        for k in 0..horizon_days {
            let next = model.network.predict(&sequence[sequence.len() - window..]);
            sequence.push(next);

            let forecast = model.scaler.inverse(next);
            if !forecast.is_finite() {
                return Err(ForecastError::Backend {
                    backend: self.name().to_string(),
                    message: format!("non-finite prediction at step {k}"),
                });
            }

            let date = model
                .last_date
                .checked_add_days(Days::new(k as u64 + 1))
                .ok_or_else(|| {
                    ForecastError::InvalidParameter(format!(
                        "horizon of {horizon_days} days overflows the calendar"
                    ))
                })?;

            let margin = forecast.abs() * BAND_FRACTION;
            predictions.push(ForecastPoint::new(
                date,
                forecast,
                forecast - margin,
                forecast + margin,
                confidence_level,
            ));
        }

        Ok(ForecastResult::new(
            model.metric.clone(),
            predictions,
            ModelKind::Sequence,
            confidence_level,
        ))
    }
}

/// Builds [`SequenceForecaster`]s with a window of `min(7, n / 2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceBackend {
    config: SequenceConfig,
}

impl SequenceBackend {
    /// Create a factory with default network settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with custom network settings.
    ///
    /// The configured `sequence_length` is replaced per series.
    #[must_use]
    pub const fn with_config(config: SequenceConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for SequenceBackend {
    fn name(&self) -> &str {
        "sequence"
    }

    fn create(&self, series_len: usize) -> Result<BoxedForecaster> {
        let window = MAX_SEQUENCE_LENGTH.min(series_len / 2).max(1);
        Ok(Box::new(SequenceForecaster::new(
            self.config.with_sequence_length(window),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use forecast_core::HistoricalPoint;

    fn series_from(values: &[f64]) -> Series {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoricalPoint::new(start + Days::new(i as u64), *v))
            .collect();
        Series::new(points).unwrap()
    }

    fn sawtooth(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i % 7) as f64 * 5.0).collect()
    }

    #[test]
    fn test_scaler_round_trip_and_flat_series() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 30.0]);
        assert_relative_eq!(scaler.transform(20.0), 0.5);
        assert_relative_eq!(scaler.inverse(0.5), 20.0);

        let flat = MinMaxScaler::fit(&[5.0; 4]);
        assert_eq!(flat.transform(5.0), 0.0);
        assert_eq!(flat.inverse(0.0), 5.0);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut network = Network::new(3, 4, &mut rng);
        let inputs = vec![vec![0.1, 0.5, 0.9], vec![0.3, 0.2, 0.7]];
        let targets = vec![0.4, 0.6];

        let (_, grad) = network.loss_and_gradient(&inputs, &targets);
        let h = 1e-6;
        for i in 0..network.params.len() {
            let original = network.params[i];
            network.params[i] = original + h;
            let (up, _) = network.loss_and_gradient(&inputs, &targets);
            network.params[i] = original - h;
            let (down, _) = network.loss_and_gradient(&inputs, &targets);
            network.params[i] = original;
            assert_relative_eq!(grad[i], (up - down) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forecast_before_train_fails() {
        let model = SequenceForecaster::default();
        assert!(matches!(
            model.forecast(3),
            Err(ForecastError::UntrainedModel(_))
        ));
    }

    #[test]
    fn test_train_and_forecast() {
        let mut model = SequenceForecaster::new(SequenceConfig::default().with_sequence_length(7));
        let training = model
            .train(
                &series_from(&sawtooth(42)),
                "orders",
                &TrainOptions::default().with_iterations(200),
            )
            .unwrap();
        assert_eq!(training.model_kind, ModelKind::Sequence);
        assert_eq!(training.sample_count, 35);
        assert!(training.metrics.accuracy.is_finite());

        let forecast = model.forecast(10).unwrap();
        assert_eq!(forecast.predictions.len(), 10);
        assert_eq!(forecast.model_kind, ModelKind::Sequence);
        assert_eq!(
            forecast.predictions[0].date,
            NaiveDate::from_ymd_opt(2024, 2, 12).unwrap()
        );
        for point in &forecast.predictions {
            assert!(point.lower_bound <= point.forecast && point.forecast <= point.upper_bound);
            assert_relative_eq!(
                point.upper_bound - point.forecast,
                point.forecast.abs() * BAND_FRACTION,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_training_is_seeded() {
        let series = series_from(&sawtooth(21));
        let options = TrainOptions::default().with_iterations(30);

        let mut a = SequenceForecaster::new(SequenceConfig::default());
        let mut b = SequenceForecaster::new(SequenceConfig::default());
        a.train(&series, "revenue", &options).unwrap();
        b.train(&series, "revenue", &options).unwrap();
        assert_eq!(a.forecast(5).unwrap(), b.forecast(5).unwrap());
    }

    #[test]
    fn test_window_must_fit_series() {
        let mut model = SequenceForecaster::new(SequenceConfig::default().with_sequence_length(7));
        let result = model.train(&series_from(&[1.0; 7]), "revenue", &TrainOptions::default());
        assert!(matches!(result, Err(ForecastError::InvalidSeries(_))));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut model = SequenceForecaster::default();
        let result = model.train(
            &series_from(&sawtooth(20)),
            "revenue",
            &TrainOptions::default().with_iterations(0),
        );
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }

    #[test]
    fn test_factory_sizes_window() {
        let backend = SequenceBackend::new();
        assert!(backend.is_available());

        let mut short = backend.create(9).unwrap();
        short
            .train(&series_from(&sawtooth(9)), "revenue", &TrainOptions::default())
            .unwrap();
        assert!(short.is_trained());

        let long = SequenceBackend::new();
        let model = long.create(90).unwrap();
        assert_eq!(model.name(), "sequence");
    }
}
