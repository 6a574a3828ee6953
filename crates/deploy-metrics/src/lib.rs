#![deny(warnings)]

//! Run metrics: how closely supply tracked demand, and how good the
//! forecasts were. Reports serialize to JSON for offline comparison of
//! forecasting methods.

use anyhow::Result;
use deploy_core::{CommodityId, CommoditySeries, TimeSeries};
use serde::Serialize;
use tracing::debug;

/// Ticks present in both series, with their values.
fn paired<'a>(
    supply: &'a TimeSeries,
    demand: &'a TimeSeries,
) -> impl Iterator<Item = (f64, f64)> + 'a {
    supply
        .iter()
        .filter_map(move |(t, s)| demand.get(t).map(|d| (s, d)))
}

/// Σ(supply − demand). Positive means oversupply over the run.
pub fn residual_sum(supply: &TimeSeries, demand: &TimeSeries) -> f64 {
    paired(supply, demand).map(|(s, d)| s - d).sum()
}

/// Σ (supply − demand)² / demand over ticks with positive demand.
pub fn chi_squared(supply: &TimeSeries, demand: &TimeSeries) -> f64 {
    paired(supply, demand)
        .filter(|(_, d)| *d > 0.0)
        .map(|(s, d)| (s - d).powi(2) / d)
        .sum()
}

/// Number of ticks where supply fell short of demand.
pub fn undersupply_ticks(supply: &TimeSeries, demand: &TimeSeries) -> usize {
    paired(supply, demand).filter(|(s, d)| s < d).count()
}

/// Mean absolute error of forecasts made at `t` for `t + lead` against the
/// actual values. `None` when no forecast can be scored.
pub fn forecast_mae(forecast: &TimeSeries, actual: &TimeSeries, lead: u64) -> Option<f64> {
    let errors: Vec<f64> = forecast
        .iter()
        .filter_map(|(t, f)| actual.get(t + lead).map(|a| (f - a).abs()))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.iter().sum::<f64>() / errors.len() as f64)
    }
}

/// Metrics for one commodity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommodityMetrics {
    pub commodity: CommodityId,
    pub ticks: usize,
    pub residual_sum: f64,
    pub chi_squared: f64,
    pub undersupply_ticks: usize,
    pub supply_forecast_mae: Option<f64>,
    pub demand_forecast_mae: Option<f64>,
}

impl CommodityMetrics {
    /// Score `actual` history; `forecasts` holds one-step-ahead forecasts
    /// keyed by the tick they were made at.
    pub fn evaluate(
        commodity: &CommodityId,
        actual: &CommoditySeries,
        forecasts: Option<&CommoditySeries>,
    ) -> Self {
        let m = Self {
            commodity: commodity.clone(),
            ticks: paired(&actual.supply, &actual.demand).count(),
            residual_sum: residual_sum(&actual.supply, &actual.demand),
            chi_squared: chi_squared(&actual.supply, &actual.demand),
            undersupply_ticks: undersupply_ticks(&actual.supply, &actual.demand),
            supply_forecast_mae: forecasts.and_then(|f| forecast_mae(&f.supply, &actual.supply, 1)),
            demand_forecast_mae: forecasts.and_then(|f| forecast_mae(&f.demand, &actual.demand, 1)),
        };
        debug!(
            commodity = %m.commodity,
            residual_sum = m.residual_sum,
            chi_squared = m.chi_squared,
            undersupply = m.undersupply_ticks,
            "metrics"
        );
        m
    }
}

/// Whole-run report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsReport {
    pub method: String,
    pub ticks: u64,
    pub builds_requested: u64,
    pub commodities: Vec<CommodityMetrics>,
}

impl MetricsReport {
    pub fn commodity(&self, commodity: &str) -> Option<&CommodityMetrics> {
        self.commodities.iter().find(|m| m.commodity.as_str() == commodity)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
