#![deny(warnings)]

//! Deployment solver: turns a supply shortage into a build plan.
//!
//! Candidates are ranked by preference (evaluated at the current tick, highest
//! first, declaration order on ties) and filled greedily: each candidate gets
//! enough units to close the remaining deficit, capped by its secondary
//! commodity constraint when it declares one.

use deploy_core::{CommodityId, CommodityLedger, CoreError, Kind, PrototypeId, ProducerSpec};
use deploy_expr::EquationError;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Slack applied before flooring constraint headroom.
const HEADROOM_EPS: f64 = 1e-9;

/// Errors produced by the solver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// Preference expression could not be evaluated at this tick.
    #[error("preference of prototype `{prototype}`: {source}")]
    Preference {
        prototype: String,
        source: EquationError,
    },
    /// Deficit must be a finite number.
    #[error("deficit is not finite: {0}")]
    InvalidDeficit(f64),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Inputs for one commodity at one tick.
#[derive(Clone, Copy, Debug)]
pub struct SolveRequest<'a> {
    pub commodity: &'a CommodityId,
    /// Shortage magnitude (positive).
    pub deficit: f64,
    pub candidates: &'a IndexMap<PrototypeId, ProducerSpec>,
    pub ledger: &'a CommodityLedger,
    pub tick: u64,
}

/// Build counts for one commodity at one tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeploymentPlan {
    /// Every candidate in declaration order, zero counts included.
    pub builds: IndexMap<PrototypeId, u32>,
    /// Capacity the planned builds add.
    pub covered: f64,
    /// Part of the deficit left for the next tick.
    pub uncovered: f64,
}

impl DeploymentPlan {
    /// Prototypes with a non-zero count.
    pub fn requests(&self) -> impl Iterator<Item = (&PrototypeId, u32)> {
        self.builds
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(p, n)| (p, *n))
    }

    pub fn total_units(&self) -> u64 {
        self.builds.values().map(|n| u64::from(*n)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_units() == 0
    }
}

/// Candidates sorted by preference at `tick`, highest first; ties keep
/// declaration order.
pub fn rank_candidates<'a>(
    candidates: &'a IndexMap<PrototypeId, ProducerSpec>,
    tick: u64,
) -> Result<Vec<(&'a PrototypeId, &'a ProducerSpec, f64)>, SolverError> {
    let mut ranked = Vec::with_capacity(candidates.len());
    for (proto, spec) in candidates {
        let pref = spec
            .preference
            .eval_at(tick)
            .map_err(|source| SolverError::Preference {
                prototype: proto.0.clone(),
                source,
            })?;
        ranked.push((proto, spec, pref));
    }
    // stable: equal preferences stay in declaration order
    ranked.sort_by(|a, b| b.2.total_cmp(&a.2));
    Ok(ranked)
}

/// Greedy preference-ordered allocation of `req.deficit`.
pub fn deploy_solver(req: &SolveRequest<'_>) -> Result<DeploymentPlan, SolverError> {
    if !req.deficit.is_finite() {
        return Err(SolverError::InvalidDeficit(req.deficit));
    }
    let mut plan = DeploymentPlan {
        builds: req.candidates.keys().map(|p| (p.clone(), 0)).collect(),
        covered: 0.0,
        uncovered: req.deficit.max(0.0),
    };
    if plan.uncovered == 0.0 {
        return Ok(plan);
    }

    let mut drawn: HashMap<&CommodityId, f64> = HashMap::new();
    for (proto, spec, pref) in rank_candidates(req.candidates, req.tick)? {
        if plan.uncovered <= 0.0 {
            break;
        }
        let needed = (plan.uncovered / spec.capacity).ceil() as u32;
        let count = match &spec.constraint_commodity {
            Some(constraint) => {
                let used = match drawn.get(constraint) {
                    Some(v) => *v,
                    None => req
                        .ledger
                        .value_at(constraint.as_str(), req.tick, Kind::Demand)?
                        .unwrap_or(0.0),
                };
                let headroom = spec.constraint_value - used;
                let allowed = if headroom > 0.0 {
                    (headroom / spec.capacity + HEADROOM_EPS).floor() as u32
                } else {
                    0
                };
                let count = needed.min(allowed);
                drawn.insert(constraint, used + f64::from(count) * spec.capacity);
                count
            }
            None => needed,
        };
        debug!(
            commodity = %req.commodity,
            prototype = %proto,
            pref,
            needed,
            count,
            "solver candidate"
        );
        if count == 0 {
            continue;
        }
        let added = f64::from(count) * spec.capacity;
        plan.builds.insert(proto.clone(), count);
        plan.covered += added;
        plan.uncovered = (plan.uncovered - added).max(0.0);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::CommodityConfig;
    use proptest::prelude::*;

    fn solve(entries: &[&str], commodity: &str, deficit: f64, tick: u64) -> DeploymentPlan {
        let cfg = CommodityConfig::parse(entries).unwrap();
        let ledger = CommodityLedger::for_config(&cfg);
        solve_with(&cfg, &ledger, commodity, deficit, tick)
    }

    fn solve_with(
        cfg: &CommodityConfig,
        ledger: &CommodityLedger,
        commodity: &str,
        deficit: f64,
        tick: u64,
    ) -> DeploymentPlan {
        let id = CommodityId::from(commodity);
        deploy_solver(&SolveRequest {
            commodity: &id,
            deficit,
            candidates: cfg.producers(commodity).unwrap(),
            ledger,
            tick,
        })
        .unwrap()
    }

    fn counts(plan: &DeploymentPlan) -> Vec<(&str, u32)> {
        plan.builds.iter().map(|(p, n)| (p.as_str(), *n)).collect()
    }

    #[test]
    fn equal_preference_fills_first_candidate() {
        let plan = solve(&["fuel_first_100", "fuel_second_50"], "fuel", 150.0, 0);
        assert_eq!(counts(&plan), vec![("first", 2), ("second", 0)]);
        assert_eq!(plan.covered, 200.0);
        assert_eq!(plan.uncovered, 0.0);
        assert_eq!(plan.requests().count(), 1);
    }

    #[test]
    fn higher_preference_goes_first() {
        let plan = solve(&["fuel_cheap_100_1", "fuel_best_50_2"], "fuel", 120.0, 0);
        assert_eq!(counts(&plan), vec![("cheap", 0), ("best", 3)]);
    }

    #[test]
    fn time_dependent_preference_switches_over() {
        let entries = ["POWER_old_1000_10-0.1*t", "POWER_new_500_0.1*t"];
        let early = solve(&entries, "POWER", 900.0, 10);
        assert_eq!(counts(&early), vec![("old", 1), ("new", 0)]);
        let late = solve(&entries, "POWER", 900.0, 90);
        assert_eq!(counts(&late), vec![("old", 0), ("new", 2)]);
    }

    #[test]
    fn constraint_caps_and_spills_to_next_candidate() {
        let entries = ["POWER_reactor_1000_2_fuel_2500", "POWER_wind_300_1"];
        let plan = solve(&entries, "POWER", 3500.0, 0);
        // 2 reactors draw 2000 fuel; a third would exceed 2500
        assert_eq!(counts(&plan), vec![("reactor", 2), ("wind", 5)]);
        assert_eq!(plan.uncovered, 0.0);
    }

    #[test]
    fn constraint_counts_recorded_draw() {
        let entries = ["POWER_reactor_1000_0_fuel_2500"];
        let cfg = CommodityConfig::parse(&entries).unwrap();
        let mut ledger = CommodityLedger::for_config(&cfg);
        ledger.record("fuel", 4, Kind::Demand, 1200.0).unwrap();
        let plan = solve_with(&cfg, &ledger, "POWER", 5000.0, 4);
        assert_eq!(counts(&plan), vec![("reactor", 1)]);
        assert_eq!(plan.uncovered, 4000.0);
        // other ticks do not see that draw
        let plan = solve_with(&cfg, &ledger, "POWER", 5000.0, 5);
        assert_eq!(counts(&plan), vec![("reactor", 2)]);
    }

    #[test]
    fn shared_constraint_is_cumulative() {
        let entries = ["POWER_a_100_2_fuel_250", "POWER_b_100_1_fuel_250"];
        let plan = solve(&entries, "POWER", 1000.0, 0);
        assert_eq!(counts(&plan), vec![("a", 2), ("b", 0)]);
        assert_eq!(plan.covered, 200.0);
        assert_eq!(plan.uncovered, 800.0);
    }

    #[test]
    fn fully_constrained_gives_empty_plan() {
        let plan = solve(&["POWER_r_1000_0_fuel_0"], "POWER", 10.0, 0);
        assert!(plan.is_empty());
        assert_eq!(plan.uncovered, 10.0);
    }

    #[test]
    fn non_positive_deficit_builds_nothing() {
        let plan = solve(&["fuel_a_10"], "fuel", 0.0, 0);
        assert!(plan.is_empty());
        let cfg = CommodityConfig::parse(&["fuel_a_10"]).unwrap();
        let ledger = CommodityLedger::for_config(&cfg);
        let id = CommodityId::from("fuel");
        let err = deploy_solver(&SolveRequest {
            commodity: &id,
            deficit: f64::NAN,
            candidates: cfg.producers("fuel").unwrap(),
            ledger: &ledger,
            tick: 0,
        });
        assert!(matches!(err, Err(SolverError::InvalidDeficit(_))));
    }

    #[test]
    fn bad_preference_is_an_error() {
        let cfg = CommodityConfig::parse(&["fuel_a_10_1/t"]).unwrap();
        let ledger = CommodityLedger::for_config(&cfg);
        let id = CommodityId::from("fuel");
        let err = deploy_solver(&SolveRequest {
            commodity: &id,
            deficit: 5.0,
            candidates: cfg.producers("fuel").unwrap(),
            ledger: &ledger,
            tick: 0,
        })
        .unwrap_err();
        assert!(matches!(err, SolverError::Preference { ref prototype, .. } if prototype == "a"));
    }

    proptest! {
        #[test]
        fn allocation_invariants(
            caps in proptest::collection::vec(1u32..500, 1..5),
            prefs in proptest::collection::vec(0u32..3, 5),
            limits in proptest::collection::vec(proptest::option::of(0u32..2000), 5),
            deficit in 0.5f64..5000.0,
        ) {
            let entries: Vec<String> = caps
                .iter()
                .enumerate()
                .map(|(i, cap)| match limits[i] {
                    Some(limit) => format!("POWER_p{i}_{cap}_{}_fuel_{limit}", prefs[i]),
                    None => format!("POWER_p{i}_{cap}_{}", prefs[i]),
                })
                .collect();
            let cfg = CommodityConfig::parse(&entries).unwrap();
            let ledger = CommodityLedger::for_config(&cfg);
            let first = solve_with(&cfg, &ledger, "POWER", deficit, 0);
            let again = solve_with(&cfg, &ledger, "POWER", deficit, 0);
            prop_assert_eq!(&first, &again);

            let producers = cfg.producers("POWER").unwrap();
            let mut fuel_draw = 0.0;
            let mut loosest_built = 0.0f64;
            let mut any_unconstrained = false;
            for (proto, spec) in producers {
                let n = first.builds[proto];
                if spec.constraint_commodity.is_some() {
                    fuel_draw += f64::from(n) * spec.capacity;
                    if n > 0 {
                        loosest_built = loosest_built.max(spec.constraint_value);
                    }
                } else {
                    any_unconstrained = true;
                }
            }
            prop_assert!(fuel_draw <= loosest_built + 1e-6);
            if any_unconstrained {
                prop_assert!(first.covered >= deficit);
                prop_assert_eq!(first.uncovered, 0.0);
            }
            let covered_rest = (first.covered - (deficit - first.uncovered)).abs() < 1e-6;
            prop_assert!(covered_rest || first.uncovered == 0.0);
        }
    }
}
