//! Fourier extrapolation.

use crate::linalg::least_squares;
use crate::{ForecastError, ForecastMethod, ForecastParams, Forecaster};
use std::f64::consts::PI;

/// Removes a linear trend, keeps the `max(degree, 1)` strongest harmonics of
/// the residual spectrum and extends the reconstruction one step.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fft;

struct Harmonic {
    k: usize,
    re: f64,
    im: f64,
}

impl Harmonic {
    fn amplitude(&self) -> f64 {
        self.re.hypot(self.im)
    }
}

/// Real DFT bins 0..=n/2 of `x`.
fn spectrum(x: &[f64]) -> Vec<Harmonic> {
    let n = x.len();
    (0..=n / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for (j, v) in x.iter().enumerate() {
                let angle = 2.0 * PI * (k * j) as f64 / n as f64;
                re += v * angle.cos();
                im -= v * angle.sin();
            }
            Harmonic { k, re, im }
        })
        .collect()
}

impl Forecaster for Fft {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Fft
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        2
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let n = data.len();
        let trend = least_squares(2, data, |i, j| if j == 0 { 1.0 } else { i as f64 })?;
        let residual: Vec<f64> = data
            .iter()
            .enumerate()
            .map(|(i, v)| v - (trend[0] + trend[1] * i as f64))
            .collect();

        let mut bins = spectrum(&residual);
        let dc = bins.remove(0);
        bins.sort_by(|a, b| b.amplitude().total_cmp(&a.amplitude()).then(a.k.cmp(&b.k)));
        bins.truncate(params.degree.max(1));
        bins.push(dc);

        let t = n as f64;
        let mut value = 0.0;
        for h in &bins {
            let weight = if h.k == 0 || 2 * h.k == n { 1.0 } else { 2.0 };
            let angle = 2.0 * PI * h.k as f64 * t / n as f64;
            value += weight * (h.re * angle.cos() - h.im * angle.sin()) / n as f64;
        }
        Ok(trend[0] + trend[1] * t + value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(degree: usize) -> ForecastParams {
        ForecastParams {
            degree,
            back_steps: 0,
            ..ForecastParams::default()
        }
    }

    #[test]
    fn linear_series_is_extended() {
        let data: Vec<f64> = (0..8).map(|i| 5.0 * i as f64 - 2.0).collect();
        let v = Fft.predict(&data, &p(1)).unwrap();
        assert!((v - 38.0).abs() < 1e-6, "got {v}");
    }

    #[test]
    fn periodic_series_repeats() {
        let pattern = [0.0, 10.0, 10.0, 0.0];
        let data: Vec<f64> = (0..16).map(|i| pattern[i % 4]).collect();
        let v = Fft.predict(&data, &p(1)).unwrap();
        assert!(v.abs() < 1e-6, "got {v}");
    }
}
