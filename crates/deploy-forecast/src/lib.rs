#![deny(warnings)]

//! Time-series forecasting strategies for supply and demand.
//!
//! Every method satisfies the same contract: given the ordered history of a
//! series and [`ForecastParams`], return one scalar for the requested horizon.
//! Methods are selected through the closed [`ForecastMethod`] enum; names from
//! configuration are resolved once with [`ForecastMethod::from_str`], so an
//! unsupported name fails at construction rather than mid-run.
//!
//! - `ma`: moving average, optionally shifted by a multiple of the window's
//!   sample standard deviation
//! - `arma`: AR(1) with mean, `steps` ahead, optionally shifted by the
//!   forecast standard error
//! - `arch`: constant mean with ARCH(1) volatility
//! - `poly`: least-squares polynomial of `degree`
//! - `exp_smoothing`, `holt_winters`, `fft`: fitted smoothing / spectral
//!   extrapolation one step ahead
//! - `sw_seasonal`: value exactly one period (`degree`) back

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod linalg;
mod regression;
mod seasonal;
mod smoothing;
mod spectral;

pub use regression::{Arch, Arma, Polynomial};
pub use seasonal::StepwiseSeasonal;
pub use smoothing::{ExpSmoothing, HoltWinters, MovingAverage};
pub use spectral::Fft;

/// Errors produced by forecasting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    /// Not enough observations for the method and parameters.
    #[error("{method} needs at least {required} observations, have {available}")]
    InsufficientHistory {
        method: ForecastMethod,
        required: usize,
        available: usize,
    },
    /// Configured name does not match any method.
    #[error("unknown forecasting method `{0}`")]
    UnknownMethod(String),
    /// Parameter outside the method's domain.
    #[error("{method}: {reason}")]
    InvalidParameter {
        method: ForecastMethod,
        reason: &'static str,
    },
    /// Fit could not produce a finite value.
    #[error("degenerate fit: {0}")]
    Degenerate(String),
}

/// Parameters shared by all methods. Each method reads what it needs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastParams {
    /// Horizon for `arma`/`arch`; values below 1 are treated as 1.
    pub steps: usize,
    /// Look-back window; 0 uses the full history.
    pub back_steps: usize,
    /// Multiplier on the method's dispersion estimate.
    pub std_dev: f64,
    /// Polynomial degree, harmonic count, or seasonal period.
    pub degree: usize,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            steps: 1,
            back_steps: 10,
            std_dev: 0.0,
            degree: 1,
        }
    }
}

impl ForecastParams {
    pub(crate) fn horizon(&self) -> usize {
        self.steps.max(1)
    }
}

/// A single forecasting strategy.
pub trait Forecaster {
    /// Method tag, used in errors.
    fn method(&self) -> ForecastMethod;

    /// Minimum number of observations `predict` accepts.
    fn min_history(&self, params: &ForecastParams) -> usize;

    /// Whether `predict` sees the `back_steps` window (true) or the full history.
    fn windowed(&self) -> bool {
        true
    }

    /// Reject parameters this method can never work with.
    fn validate(&self, _params: &ForecastParams) -> Result<(), ForecastError> {
        Ok(())
    }

    /// Forecast from `data`, which already satisfies `min_history`.
    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError>;
}

/// Closed set of forecasting methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastMethod {
    #[serde(rename = "ma")]
    MovingAverage,
    #[serde(rename = "arma")]
    Arma,
    #[serde(rename = "arch")]
    Arch,
    #[serde(rename = "poly")]
    Polynomial,
    #[serde(rename = "exp_smoothing")]
    ExpSmoothing,
    #[serde(rename = "holt_winters")]
    HoltWinters,
    #[serde(rename = "fft")]
    Fft,
    #[serde(rename = "sw_seasonal")]
    StepwiseSeasonal,
}

impl ForecastMethod {
    pub const ALL: [ForecastMethod; 8] = [
        ForecastMethod::MovingAverage,
        ForecastMethod::Arma,
        ForecastMethod::Arch,
        ForecastMethod::Polynomial,
        ForecastMethod::ExpSmoothing,
        ForecastMethod::HoltWinters,
        ForecastMethod::Fft,
        ForecastMethod::StepwiseSeasonal,
    ];

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            ForecastMethod::MovingAverage => "ma",
            ForecastMethod::Arma => "arma",
            ForecastMethod::Arch => "arch",
            ForecastMethod::Polynomial => "poly",
            ForecastMethod::ExpSmoothing => "exp_smoothing",
            ForecastMethod::HoltWinters => "holt_winters",
            ForecastMethod::Fft => "fft",
            ForecastMethod::StepwiseSeasonal => "sw_seasonal",
        }
    }

    pub fn forecaster(self) -> &'static dyn Forecaster {
        match self {
            ForecastMethod::MovingAverage => &MovingAverage,
            ForecastMethod::Arma => &Arma,
            ForecastMethod::Arch => &Arch,
            ForecastMethod::Polynomial => &Polynomial,
            ForecastMethod::ExpSmoothing => &ExpSmoothing,
            ForecastMethod::HoltWinters => &HoltWinters,
            ForecastMethod::Fft => &Fft,
            ForecastMethod::StepwiseSeasonal => &StepwiseSeasonal,
        }
    }

    /// Check `params` once, before any history exists.
    pub fn validate(self, params: &ForecastParams) -> Result<(), ForecastError> {
        self.forecaster().validate(params)
    }

    /// Forecast the series `history` (oldest first).
    pub fn forecast(self, history: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let f = self.forecaster();
        f.validate(params)?;
        let data = if f.windowed() {
            window(history, params.back_steps)
        } else {
            history
        };
        let required = f.min_history(params);
        if data.len() < required {
            return Err(ForecastError::InsufficientHistory {
                method: self,
                required,
                available: data.len(),
            });
        }
        let v = f.predict(data, params)?;
        if !v.is_finite() {
            return Err(ForecastError::Degenerate(format!("{self} produced {v}")));
        }
        Ok(v)
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ForecastMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ForecastMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ForecastError::UnknownMethod(s.to_string()))
    }
}

/// The last `back_steps` observations, or all when 0 or longer than the history.
pub fn window(history: &[f64], back_steps: usize) -> &[f64] {
    if back_steps == 0 || back_steps >= history.len() {
        history
    } else {
        &history[history.len() - back_steps..]
    }
}
