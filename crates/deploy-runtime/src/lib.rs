#![deny(warnings)]

//! Decision engine: owns the ledger, forecasts each tracked commodity once per
//! tick and turns shortages into build requests for the host.
//!
//! The host drives the engine:
//! 1. construct it once with [`Engine::new`] and subscribe it to
//!    [`Engine::channels`],
//! 2. push every observation for a tick with [`Engine::observe`],
//! 3. call [`Engine::decide`] once per tick,
//! 4. drop it (or call [`Engine::finish`]) when the run ends.

use deploy_core::CoreError;
use deploy_expr::EquationError;
use deploy_forecast::ForecastError;
use deploy_solver::SolverError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod audit;
mod deficit;
mod engine;
mod observation;

pub use audit::{AuditSink, MemoryAuditLog, NullAudit};
pub use deficit::{Deficit, DeficitCalculator};
pub use engine::{BuildScheduler, CommodityOutcome, Engine, Outcome, RunRecord, TickReport};
pub use observation::{parse_channel, Observation};

/// Engine options. Field defaults follow the institution's documented defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `commodity_prototype_capacity[_pref[_constraint_commod[_constraint]]]` entries.
    pub commodities: Vec<String>,
    /// Demand of the driving commodity as a function of `t`.
    pub demand_eq: String,
    /// Forecasting method name (`ma`, `arma`, `arch`, `poly`, ...).
    pub calc_method: String,
    /// Write one audit line per tick per commodity.
    pub record: bool,
    #[serde(alias = "driving_commod")]
    pub driving_commodity: String,
    /// Forecast horizon.
    pub steps: usize,
    /// Look-back window; 0 uses the full history.
    pub back_steps: usize,
    pub supply_std_dev: f64,
    pub demand_std_dev: f64,
    /// Polynomial degree, or period for `sw_seasonal`.
    pub degree: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commodities: Vec::new(),
            demand_eq: String::new(),
            calc_method: "ma".to_string(),
            record: false,
            driving_commodity: "POWER".to_string(),
            steps: 1,
            back_steps: 10,
            supply_std_dev: 0.0,
            demand_std_dev: 0.0,
            degree: 1,
        }
    }
}

/// Errors surfaced by the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("demand equation: {0}")]
    Equation(#[from] EquationError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// Observation channel is neither `supply:<c>` nor `demand:<c>`.
    #[error("observation channel `{0}` is not supply:<commodity> or demand:<commodity>")]
    Channel(String),
    /// `decide` called for a tick before the last decided one.
    #[error("tick {tick} is earlier than the last decided tick {last}")]
    TickRegressed { tick: u64, last: u64 },
}

impl EngineError {
    /// Whether the run must stop. Forecasting failures at runtime only skip
    /// one commodity for one tick; an unknown method or invalid parameters
    /// are configuration errors.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::Forecast(
                ForecastError::InsufficientHistory { .. } | ForecastError::Degenerate(_)
            )
        )
    }
}
