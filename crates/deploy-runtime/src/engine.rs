use crate::audit::AuditSink;
use crate::deficit::{Deficit, DeficitCalculator};
use crate::observation::{parse_channel, Observation};
use crate::{EngineConfig, EngineError};
use deploy_core::{
    CommodityConfig, CommodityId, CommodityLedger, CommoditySeries, CoreError, Kind, PrototypeId,
};
use deploy_expr::Equation;
use deploy_forecast::{ForecastMethod, ForecastParams};
use deploy_solver::{deploy_solver, DeploymentPlan, SolveRequest};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, trace, warn};

/// Receives build requests. Requests are fire-and-forget.
pub trait BuildScheduler {
    fn schedule_build(&mut self, prototype: &PrototypeId, count: u32);
}

impl BuildScheduler for Vec<(PrototypeId, u32)> {
    fn schedule_build(&mut self, prototype: &PrototypeId, count: u32) {
        self.push((prototype.clone(), count));
    }
}

/// What happened to one commodity during a tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Forecasts computed; `plan` is present when there was a shortage.
    Evaluated {
        deficit: Deficit,
        plan: Option<DeploymentPlan>,
    },
    /// Forecasting failed for this tick (too little history, unusable fit).
    Skipped { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommodityOutcome {
    pub commodity: CommodityId,
    pub outcome: Outcome,
}

/// Result of one decision pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub outcomes: Vec<CommodityOutcome>,
}

impl TickReport {
    /// Every build request issued during the pass.
    pub fn builds(&self) -> impl Iterator<Item = (&PrototypeId, u32)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Evaluated { plan: Some(plan), .. } => Some(plan.requests()),
                _ => None,
            })
            .flatten()
    }

    pub fn outcome(&self, commodity: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.commodity.as_str() == commodity)
            .map(|o| &o.outcome)
    }
}

/// State handed back when the run ends.
#[derive(Clone, Debug)]
pub struct RunRecord {
    pub ledger: CommodityLedger,
    /// Forecast supply/demand per commodity, keyed by the tick they were made at.
    pub forecasts: BTreeMap<CommodityId, CommoditySeries>,
    pub requested: IndexMap<PrototypeId, u64>,
}

/// Engine context: configuration, history, and per-run counters.
pub struct Engine {
    config: EngineConfig,
    commodities: CommodityConfig,
    ledger: CommodityLedger,
    deficit: DeficitCalculator,
    forecasts: BTreeMap<CommodityId, CommoditySeries>,
    requested: IndexMap<PrototypeId, u64>,
    last_report: Option<TickReport>,
}

impl Engine {
    /// Parse and validate `config`. Malformed commodities, an unknown method,
    /// invalid method parameters, or an unparseable equation fail here.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let commodities = CommodityConfig::parse(&config.commodities)?;
        let method = ForecastMethod::from_str(&config.calc_method)?;
        let driving = CommodityId::from(config.driving_commodity.trim());
        let driving_configured = commodities.producers(driving.as_str()).is_some();
        let demand_eq = if config.demand_eq.trim().is_empty() && !driving_configured {
            Equation::constant(0.0)
        } else {
            Equation::parse(&config.demand_eq)?
        };
        let ledger = CommodityLedger::for_config(&commodities);
        let forecasts = commodities
            .commodities()
            .map(|c| (c.clone(), CommoditySeries::default()))
            .collect();
        let params = ForecastParams {
            steps: config.steps,
            back_steps: config.back_steps,
            std_dev: 0.0,
            degree: config.degree,
        };
        method.validate(&params)?;
        let deficit = DeficitCalculator::new(
            method,
            params,
            config.supply_std_dev,
            config.demand_std_dev,
            demand_eq,
            driving,
        );
        info!(
            commodities = ?config.commodities,
            demand_eq = %config.demand_eq,
            calc_method = %method,
            record = config.record,
            driving = %config.driving_commodity,
            steps = config.steps,
            back_steps = config.back_steps,
            supply_std_dev = config.supply_std_dev,
            demand_std_dev = config.demand_std_dev,
            degree = config.degree,
            "engine configured"
        );
        Ok(Self {
            config,
            commodities,
            ledger,
            deficit,
            forecasts,
            requested: IndexMap::new(),
            last_report: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commodity_config(&self) -> &CommodityConfig {
        &self.commodities
    }

    pub fn method(&self) -> ForecastMethod {
        self.deficit.method()
    }

    pub fn ledger(&self) -> &CommodityLedger {
        &self.ledger
    }

    pub fn forecasts(&self, commodity: &str) -> Option<&CommoditySeries> {
        self.forecasts.get(commodity)
    }

    /// Builds requested so far, per prototype.
    pub fn requested(&self) -> &IndexMap<PrototypeId, u64> {
        &self.requested
    }

    pub fn total_requested(&self) -> u64 {
        self.requested.values().sum()
    }

    /// Channels the host should route to [`Engine::observe`].
    pub fn channels(&self) -> Vec<String> {
        self.ledger
            .commodities()
            .flat_map(|c| {
                [
                    format!("{}:{c}", Kind::Supply),
                    format!("{}:{c}", Kind::Demand),
                ]
            })
            .collect()
    }

    /// Accumulate one observation into the ledger.
    pub fn observe(&mut self, obs: &Observation) -> Result<(), EngineError> {
        let (kind, commodity) = parse_channel(&obs.channel)?;
        trace!(
            producer = %obs.producer,
            commodity,
            %kind,
            time = obs.time,
            value = obs.value,
            "observation"
        );
        self.ledger.record(commodity, obs.time, kind, obs.value)?;
        Ok(())
    }

    /// Run the decision pass for `tick`. A tick is decided at most once:
    /// repeating the call returns the stored report without new requests.
    pub fn decide(
        &mut self,
        tick: u64,
        scheduler: &mut dyn BuildScheduler,
        audit: &mut dyn AuditSink,
    ) -> Result<TickReport, EngineError> {
        if let Some(last) = &self.last_report {
            if tick == last.tick {
                debug!(tick, "tick already decided");
                return Ok(last.clone());
            }
            if tick < last.tick {
                return Err(EngineError::TickRegressed {
                    tick,
                    last: last.tick,
                });
            }
        }

        let order: Vec<CommodityId> = self.commodities.commodities().cloned().collect();
        let mut report = TickReport {
            tick,
            outcomes: Vec::with_capacity(order.len()),
        };
        for commodity in order {
            let outcome = self.decide_commodity(&commodity, tick, scheduler)?;
            if self.config.record {
                let line = self.audit_line(&commodity, tick, &outcome)?;
                if let Err(e) = audit.append(&commodity, &line) {
                    warn!(%commodity, error = %e, "audit write failed");
                }
            }
            report.outcomes.push(CommodityOutcome { commodity, outcome });
        }
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn decide_commodity(
        &mut self,
        commodity: &CommodityId,
        tick: u64,
        scheduler: &mut dyn BuildScheduler,
    ) -> Result<Outcome, EngineError> {
        let deficit = match self.deficit.calc_diff(&mut self.ledger, commodity.as_str(), tick) {
            Ok(d) => d,
            Err(EngineError::Forecast(e)) => {
                warn!(%commodity, tick, reason = %e, "skipping commodity this tick");
                return Ok(Outcome::Skipped {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        if let Some(trace) = self.forecasts.get_mut(commodity) {
            trace.supply.set(tick, deficit.supply);
            trace.demand.set(tick, deficit.demand);
        }
        if deficit.diff >= 0.0 {
            return Ok(Outcome::Evaluated {
                deficit,
                plan: None,
            });
        }

        let candidates = self
            .commodities
            .producers(commodity.as_str())
            .ok_or_else(|| CoreError::UnknownCommodity(commodity.to_string()))?;
        let plan = deploy_solver(&SolveRequest {
            commodity,
            deficit: -deficit.diff,
            candidates,
            ledger: &self.ledger,
            tick,
        })?;
        for (proto, count) in plan.requests() {
            info!(%commodity, tick, prototype = %proto, count, "scheduling builds");
            scheduler.schedule_build(proto, count);
            *self.requested.entry(proto.clone()).or_insert(0) += u64::from(count);
        }
        if plan.uncovered > 0.0 {
            warn!(%commodity, tick, uncovered = plan.uncovered, "shortage not fully covered");
        }
        Ok(Outcome::Evaluated {
            deficit,
            plan: Some(plan),
        })
    }

    fn audit_line(
        &self,
        commodity: &CommodityId,
        tick: u64,
        outcome: &Outcome,
    ) -> Result<String, EngineError> {
        Ok(match outcome {
            Outcome::Skipped { reason } => format!("Time {tick} skipped: {reason}"),
            Outcome::Evaluated { .. } => {
                let value = |kind| self.ledger.value_at(commodity.as_str(), tick, kind);
                let supply = value(Kind::Supply)?.unwrap_or(0.0);
                let demand = value(Kind::Demand)?.unwrap_or(0.0);
                format!(
                    "Time {tick} Deployed {} supply {supply} demand {demand}",
                    self.total_requested()
                )
            }
        })
    }

    /// End the run and hand back the accumulated state.
    pub fn finish(self) -> RunRecord {
        info!(requested = self.total_requested(), "engine finished");
        RunRecord {
            ledger: self.ledger,
            forecasts: self.forecasts,
            requested: self.requested,
        }
    }
}
