//! Averaging and exponential smoothing methods.

use crate::linalg::{mean, sample_std};
use crate::{ForecastError, ForecastMethod, ForecastParams, Forecaster};
use tracing::debug;

/// Mean of the window plus `std_dev` sample standard deviations.
#[derive(Clone, Copy, Debug, Default)]
pub struct MovingAverage;

impl Forecaster for MovingAverage {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::MovingAverage
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        1
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let m = mean(data);
        if params.std_dev == 0.0 {
            return Ok(m);
        }
        Ok(m + params.std_dev * sample_std(data))
    }
}

/// Candidate smoothing factors, 0.01..=0.99.
fn alpha_grid() -> impl Iterator<Item = f64> {
    (1..100).map(|i| i as f64 / 100.0)
}

/// Coarse grid for the multi-parameter Holt-Winters search.
const COARSE_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Returns `(sse, final_level)` of simple exponential smoothing.
fn ses(data: &[f64], alpha: f64) -> (f64, f64) {
    let mut level = data[0];
    let mut sse = 0.0;
    for &x in &data[1..] {
        let err = x - level;
        sse += err * err;
        level += alpha * err;
    }
    (sse, level)
}

/// Simple exponential smoothing; the smoothing factor minimizes one-step SSE.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpSmoothing;

impl Forecaster for ExpSmoothing {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ExpSmoothing
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        2
    }

    fn predict(&self, data: &[f64], _params: &ForecastParams) -> Result<f64, ForecastError> {
        let mut best: Option<(f64, f64, f64)> = None;
        for alpha in alpha_grid() {
            let (sse, level) = ses(data, alpha);
            if best.map_or(true, |(b, _, _)| sse < b) {
                best = Some((sse, level, alpha));
            }
        }
        let (_, level, alpha) = best.ok_or_else(|| ForecastError::Degenerate("empty grid".into()))?;
        debug!(alpha, level, "exp_smoothing fit");
        Ok(level)
    }
}

struct HoltState {
    sse: f64,
    forecast: f64,
}

fn holt_linear(data: &[f64], alpha: f64, beta: f64) -> HoltState {
    let mut level = data[0];
    let mut trend = data[1] - data[0];
    let mut sse = 0.0;
    for &x in &data[1..] {
        let predicted = level + trend;
        let err = x - predicted;
        sse += err * err;
        let next_level = alpha * x + (1.0 - alpha) * predicted;
        trend = beta * (next_level - level) + (1.0 - beta) * trend;
        level = next_level;
    }
    HoltState {
        sse,
        forecast: level + trend,
    }
}

fn holt_winters_additive(
    data: &[f64],
    period: usize,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> HoltState {
    let first = mean(&data[..period]);
    let second = mean(&data[period..2 * period]);
    let mut level = first;
    let mut trend = (second - first) / period as f64;
    let mut season: Vec<f64> = data[..period].iter().map(|x| x - first).collect();
    let mut sse = 0.0;
    for (i, &x) in data.iter().enumerate().skip(period) {
        let s = season[i % period];
        let predicted = level + trend + s;
        let err = x - predicted;
        sse += err * err;
        let next_level = alpha * (x - s) + (1.0 - alpha) * (level + trend);
        trend = beta * (next_level - level) + (1.0 - beta) * trend;
        season[i % period] = gamma * (x - next_level) + (1.0 - gamma) * s;
        level = next_level;
    }
    HoltState {
        sse,
        forecast: level + trend + season[data.len() % period],
    }
}

/// Holt-Winters with additive trend, plus an additive season of period
/// `degree` when `degree >= 2` and the window holds two full periods.
#[derive(Clone, Copy, Debug, Default)]
pub struct HoltWinters;

impl Forecaster for HoltWinters {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::HoltWinters
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        2
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let period = params.degree;
        let seasonal = period >= 2 && data.len() >= 2 * period;
        let mut best: Option<HoltState> = None;
        for &alpha in &COARSE_GRID {
            for &beta in &COARSE_GRID {
                if seasonal {
                    for &gamma in &COARSE_GRID {
                        let s = holt_winters_additive(data, period, alpha, beta, gamma);
                        if best.as_ref().map_or(true, |b| s.sse < b.sse) {
                            best = Some(s);
                        }
                    }
                } else {
                    let s = holt_linear(data, alpha, beta);
                    if best.as_ref().map_or(true, |b| s.sse < b.sse) {
                        best = Some(s);
                    }
                }
            }
        }
        best.map(|s| s.forecast)
            .ok_or_else(|| ForecastError::Degenerate("empty grid".into()))
    }
}
