use crate::EngineError;
use deploy_core::{CommodityId, CommodityLedger, Kind};
use deploy_expr::Equation;
use deploy_forecast::{ForecastMethod, ForecastParams};
use serde::Serialize;
use tracing::debug;

/// Forecast supply and demand for the next step and their difference.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Deficit {
    pub supply: f64,
    pub demand: f64,
    /// `supply - demand`; negative means shortage.
    pub diff: f64,
}

/// Computes [`Deficit`]s against the ledger. The driving commodity's demand
/// comes from the demand equation; every other series is forecast.
#[derive(Clone, Debug)]
pub struct DeficitCalculator {
    method: ForecastMethod,
    supply_params: ForecastParams,
    demand_params: ForecastParams,
    demand_eq: Equation,
    driving: CommodityId,
}

impl DeficitCalculator {
    pub fn new(
        method: ForecastMethod,
        params: ForecastParams,
        supply_std_dev: f64,
        demand_std_dev: f64,
        demand_eq: Equation,
        driving: CommodityId,
    ) -> Self {
        Self {
            method,
            supply_params: ForecastParams {
                std_dev: supply_std_dev,
                ..params
            },
            demand_params: ForecastParams {
                std_dev: demand_std_dev,
                ..params
            },
            demand_eq,
            driving,
        }
    }

    pub fn method(&self) -> ForecastMethod {
        self.method
    }

    pub fn is_driving(&self, commodity: &str) -> bool {
        self.driving.as_str() == commodity
    }

    /// Demand of the driving commodity at `tick`.
    pub fn driving_demand(&self, tick: u64) -> Result<f64, EngineError> {
        Ok(self.demand_eq.eval_at(tick)?)
    }

    /// Seed `tick`, then forecast `tick + 1`. The driving commodity's demand
    /// at `tick + 1` is cached into the ledger.
    pub fn calc_diff(
        &self,
        ledger: &mut CommodityLedger,
        commodity: &str,
        tick: u64,
    ) -> Result<Deficit, EngineError> {
        let driving = self.is_driving(commodity);
        if ledger.value_at(commodity, tick, Kind::Demand)?.is_none() {
            let seed = if driving {
                self.driving_demand(tick)?
            } else {
                0.0
            };
            ledger.seed(commodity, tick, Kind::Demand, seed)?;
        }
        ledger.seed(commodity, tick, Kind::Supply, 0.0)?;

        let supply_history = ledger.history(commodity, Kind::Supply)?.values();
        let supply = self.method.forecast(&supply_history, &self.supply_params)?;

        let demand = if driving {
            let next = self.driving_demand(tick + 1)?;
            ledger.set(commodity, tick + 1, Kind::Demand, next)?;
            next
        } else {
            let demand_history = ledger.history(commodity, Kind::Demand)?.values();
            self.method.forecast(&demand_history, &self.demand_params)?
        };

        debug!(commodity, tick, supply, demand, method = %self.method, "forecast");
        Ok(Deficit {
            supply,
            demand,
            diff: supply - demand,
        })
    }
}
