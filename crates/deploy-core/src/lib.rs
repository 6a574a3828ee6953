#![deny(warnings)]

//! Core domain models for the deployment planner.
//!
//! This crate defines the commodity configuration parsed from the flat
//! `commodity_prototype_capacity[...]` strings and the ledger that accumulates
//! supply/demand observations per commodity and time step.

use deploy_expr::{Equation, EquationError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Name of a tracked commodity, e.g. "POWER" or "fuel".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommodityId(pub String);

/// Name of a producer prototype, e.g. "reactor".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrototypeId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                $ty(s.to_string())
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(CommodityId);
string_id!(PrototypeId);

/// Errors raised while building or querying core state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Entry has fewer than `commodity_prototype_capacity` fields.
    #[error("malformed commodity entry `{entry}`: {reason}")]
    Malformed { entry: String, reason: String },
    /// A numeric field failed to parse or is out of range.
    #[error("invalid {field} `{value}` in commodity entry `{entry}`")]
    InvalidNumber {
        entry: String,
        field: &'static str,
        value: String,
    },
    /// Preference is not a valid expression in `t`.
    #[error("invalid preference in commodity entry `{entry}`: {source}")]
    InvalidPreference { entry: String, source: EquationError },
    /// Commodity is not tracked by this ledger.
    #[error("unknown commodity: {0}")]
    UnknownCommodity(String),
}

/// One candidate producer for a commodity.
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerSpec {
    /// Output per built unit (> 0).
    pub capacity: f64,
    /// Ordering key; may depend on the tick, e.g. `0.01*t`.
    pub preference: Equation,
    /// Secondary commodity drawn by this producer, if any.
    pub constraint_commodity: Option<CommodityId>,
    /// Cap on the secondary commodity draw.
    pub constraint_value: f64,
}

/// Commodity → ordered prototype table, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommodityConfig {
    commodities: IndexMap<CommodityId, IndexMap<PrototypeId, ProducerSpec>>,
}

const FIELD_CAPACITY: &str = "capacity";
const FIELD_CONSTRAINT: &str = "constraint value";
const NO_CONSTRAINT: &str = "0";

fn parse_number(entry: &str, field: &'static str, raw: &str) -> Result<f64, CoreError> {
    let invalid = || CoreError::InvalidNumber {
        entry: entry.to_string(),
        field,
        value: raw.to_string(),
    };
    let v: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !v.is_finite() {
        return Err(invalid());
    }
    Ok(v)
}

/// Parse one `commodity_prototype_capacity[_pref[_constraint_commod[_constraint]]]` entry.
pub fn parse_entry(entry: &str) -> Result<(CommodityId, PrototypeId, ProducerSpec), CoreError> {
    let fields: Vec<&str> = entry.split('_').collect();
    if fields.len() < 3 {
        return Err(CoreError::Malformed {
            entry: entry.to_string(),
            reason: "need at least commodity_prototype_capacity".to_string(),
        });
    }
    if fields.len() > 6 {
        warn!(entry, "ignoring fields past the constraint value");
    }
    let commodity = fields[0].trim();
    let prototype = fields[1].trim();
    if commodity.is_empty() || prototype.is_empty() {
        return Err(CoreError::Malformed {
            entry: entry.to_string(),
            reason: "commodity and prototype names must be non-empty".to_string(),
        });
    }

    let capacity = parse_number(entry, FIELD_CAPACITY, fields[2])?;
    let pref_src = fields.get(3).copied().unwrap_or("0");
    let preference = Equation::parse(pref_src).map_err(|source| CoreError::InvalidPreference {
        entry: entry.to_string(),
        source,
    })?;
    let constraint_commodity = fields
        .get(4)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != NO_CONSTRAINT)
        .map(CommodityId::from);
    let constraint_value = match fields.get(5) {
        Some(raw) => parse_number(entry, FIELD_CONSTRAINT, raw)?,
        None => 0.0,
    };

    let spec = ProducerSpec {
        capacity,
        preference,
        constraint_commodity,
        constraint_value,
    };
    validate_producer(&spec).map_err(|_| CoreError::InvalidNumber {
        entry: entry.to_string(),
        field: FIELD_CAPACITY,
        value: fields[2].to_string(),
    })?;
    Ok((commodity.into(), prototype.into(), spec))
}

/// Validate producer invariants: capacity strictly positive, finite numbers.
pub fn validate_producer(p: &ProducerSpec) -> Result<(), CoreError> {
    if !(p.capacity.is_finite() && p.capacity > 0.0) || !p.constraint_value.is_finite() {
        return Err(CoreError::InvalidNumber {
            entry: String::new(),
            field: FIELD_CAPACITY,
            value: p.capacity.to_string(),
        });
    }
    Ok(())
}

impl CommodityConfig {
    /// Build from the flat configuration list. Redeclaring a prototype keeps
    /// its original position and takes the new values.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, CoreError> {
        let mut cfg = CommodityConfig::default();
        for entry in entries {
            let (commodity, prototype, spec) = parse_entry(entry.as_ref())?;
            cfg.commodities
                .entry(commodity)
                .or_default()
                .insert(prototype, spec);
        }
        Ok(cfg)
    }

    /// Commodities with at least one producer, in declaration order.
    pub fn commodities(&self) -> impl Iterator<Item = &CommodityId> {
        self.commodities.keys()
    }

    /// Producers for `commodity`, in declaration order.
    pub fn producers(&self, commodity: &str) -> Option<&IndexMap<PrototypeId, ProducerSpec>> {
        self.commodities.get(commodity)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&CommodityId, &IndexMap<PrototypeId, ProducerSpec>)> {
        self.commodities.iter()
    }

    /// Every commodity the ledger must track: configured ones plus any
    /// constraint commodities, without duplicates.
    pub fn tracked_commodities(&self) -> Vec<CommodityId> {
        let mut out: Vec<CommodityId> = self.commodities.keys().cloned().collect();
        for producers in self.commodities.values() {
            for spec in producers.values() {
                if let Some(c) = &spec.constraint_commodity {
                    if !out.contains(c) {
                        out.push(c.clone());
                    }
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.commodities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commodities.len()
    }
}

/// Which side of a commodity a series describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Supply,
    Demand,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Supply => "supply",
            Kind::Demand => "demand",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time step → accumulated value, ordered by time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries(BTreeMap<u64, f64>);

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate into the slot at `time`.
    pub fn add(&mut self, time: u64, value: f64) {
        *self.0.entry(time).or_insert(0.0) += value;
    }

    pub fn set(&mut self, time: u64, value: f64) {
        self.0.insert(time, value);
    }

    /// Write only when the slot is absent. Returns whether it wrote.
    pub fn seed(&mut self, time: u64, value: f64) -> bool {
        if self.0.contains_key(&time) {
            return false;
        }
        self.0.insert(time, value);
        true
    }

    pub fn get(&self, time: u64) -> Option<f64> {
        self.0.get(&time).copied()
    }

    pub fn contains(&self, time: u64) -> bool {
        self.0.contains_key(&time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.0.iter().map(|(t, v)| (*t, *v))
    }

    /// Values in time order.
    pub fn values(&self) -> Vec<f64> {
        self.0.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<(u64, f64)> {
        self.0.iter().next_back().map(|(t, v)| (*t, *v))
    }
}

impl FromIterator<(u64, f64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (u64, f64)>>(iter: I) -> Self {
        let mut ts = TimeSeries::new();
        for (t, v) in iter {
            ts.add(t, v);
        }
        ts
    }
}

/// Supply and demand series of one commodity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommoditySeries {
    pub supply: TimeSeries,
    pub demand: TimeSeries,
}

impl CommoditySeries {
    pub fn get(&self, kind: Kind) -> &TimeSeries {
        match kind {
            Kind::Supply => &self.supply,
            Kind::Demand => &self.demand,
        }
    }

    pub fn get_mut(&mut self, kind: Kind) -> &mut TimeSeries {
        match kind {
            Kind::Supply => &mut self.supply,
            Kind::Demand => &mut self.demand,
        }
    }
}

/// Per-commodity supply/demand history. Grows for the life of a run.
#[derive(Clone, Debug, Default)]
pub struct CommodityLedger {
    series: BTreeMap<CommodityId, CommoditySeries>,
}

impl CommodityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger tracking every commodity `cfg` needs.
    pub fn for_config(cfg: &CommodityConfig) -> Self {
        let mut ledger = Self::new();
        for c in cfg.tracked_commodities() {
            ledger.register(c);
        }
        ledger
    }

    /// Start tracking `commodity`; a no-op when already tracked.
    pub fn register(&mut self, commodity: CommodityId) {
        self.series.entry(commodity).or_default();
    }

    pub fn is_tracked(&self, commodity: &str) -> bool {
        self.series.contains_key(commodity)
    }

    pub fn commodities(&self) -> impl Iterator<Item = &CommodityId> {
        self.series.keys()
    }

    fn series_mut(&mut self, commodity: &str) -> Result<&mut CommoditySeries, CoreError> {
        self.series
            .get_mut(commodity)
            .ok_or_else(|| CoreError::UnknownCommodity(commodity.to_string()))
    }

    /// Accumulate `value` at `time`.
    pub fn record(
        &mut self,
        commodity: &str,
        time: u64,
        kind: Kind,
        value: f64,
    ) -> Result<(), CoreError> {
        self.series_mut(commodity)?.get_mut(kind).add(time, value);
        Ok(())
    }

    /// Overwrite the slot at `time`.
    pub fn set(
        &mut self,
        commodity: &str,
        time: u64,
        kind: Kind,
        value: f64,
    ) -> Result<(), CoreError> {
        self.series_mut(commodity)?.get_mut(kind).set(time, value);
        Ok(())
    }

    /// Write only when absent; returns whether the slot was created.
    pub fn seed(
        &mut self,
        commodity: &str,
        time: u64,
        kind: Kind,
        value: f64,
    ) -> Result<bool, CoreError> {
        Ok(self.series_mut(commodity)?.get_mut(kind).seed(time, value))
    }

    pub fn history(&self, commodity: &str, kind: Kind) -> Result<&TimeSeries, CoreError> {
        self.series
            .get(commodity)
            .map(|s| s.get(kind))
            .ok_or_else(|| CoreError::UnknownCommodity(commodity.to_string()))
    }

    pub fn value_at(
        &self,
        commodity: &str,
        time: u64,
        kind: Kind,
    ) -> Result<Option<f64>, CoreError> {
        Ok(self.history(commodity, kind)?.get(time))
    }

    pub fn series(&self, commodity: &str) -> Option<&CommoditySeries> {
        self.series.get(commodity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn minimal_entry_gets_neutral_defaults() {
        let cfg = CommodityConfig::parse(&["FUEL_Source_3000"]).unwrap();
        let fuel = cfg.producers("FUEL").unwrap();
        let source = &fuel["Source"];
        assert_eq!(source.capacity, 3000.0);
        assert_eq!(source.preference.source(), "0");
        assert_eq!(source.constraint_commodity, None);
        assert_eq!(source.constraint_value, 0.0);
    }

    #[test]
    fn full_entry_parses_every_field() {
        let (c, p, spec) = parse_entry("POWER_reactor_1000_0.01*t_fuel_3000").unwrap();
        assert_eq!(c.as_str(), "POWER");
        assert_eq!(p.as_str(), "reactor");
        assert_eq!(spec.capacity, 1000.0);
        assert_eq!(spec.preference.eval(100.0).unwrap(), 1.0);
        assert_eq!(spec.constraint_commodity, Some(CommodityId::from("fuel")));
        assert_eq!(spec.constraint_value, 3000.0);
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(matches!(parse_entry("FUEL_Source"), Err(CoreError::Malformed { .. })));
        assert!(matches!(parse_entry("FUEL__10"), Err(CoreError::Malformed { .. })));
        assert!(matches!(
            parse_entry("FUEL_Source_lots"),
            Err(CoreError::InvalidNumber { field: "capacity", .. })
        ));
        assert!(matches!(
            parse_entry("FUEL_Source_0"),
            Err(CoreError::InvalidNumber { field: "capacity", .. })
        ));
        assert!(matches!(
            parse_entry("FUEL_Source_10_1_U_many"),
            Err(CoreError::InvalidNumber { field: "constraint value", .. })
        ));
        assert!(matches!(
            parse_entry("FUEL_Source_10_os.system"),
            Err(CoreError::InvalidPreference { .. })
        ));
    }

    #[test]
    fn error_names_offending_entry() {
        let err = CommodityConfig::parse(&["ok_a_1", "bad"]).unwrap_err();
        assert!(err.to_string().contains("`bad`"));
    }

    #[test]
    fn redeclaration_keeps_position() {
        let cfg =
            CommodityConfig::parse(&["fuel_a_10", "fuel_b_20", "POWER_r_5", "fuel_a_30"]).unwrap();
        let names: Vec<_> = cfg.commodities().map(|c| c.as_str()).collect();
        assert_eq!(names, ["fuel", "POWER"]);
        let fuel = cfg.producers("fuel").unwrap();
        let protos: Vec<_> = fuel.keys().map(|p| p.as_str()).collect();
        assert_eq!(protos, ["a", "b"]);
        assert_eq!(fuel["a"].capacity, 30.0);
    }

    #[test]
    fn constraint_commodities_are_tracked() {
        let entries = ["POWER_reactor_1000_0_fuel_3000", "fuel_source_3000"];
        let cfg = CommodityConfig::parse(&entries).unwrap();
        let tracked: Vec<_> = cfg.tracked_commodities().into_iter().map(|c| c.0).collect();
        assert_eq!(tracked, ["POWER", "fuel"]);
        let cfg = CommodityConfig::parse(&["POWER_reactor_1000_0_water_10"]).unwrap();
        let ledger = CommodityLedger::for_config(&cfg);
        assert!(ledger.is_tracked("water"));
        assert!(ledger.is_tracked("POWER"));
    }

    #[test]
    fn ledger_accumulates_and_seeds() {
        let mut ledger = CommodityLedger::new();
        ledger.register("fuel".into());
        ledger.record("fuel", 3, Kind::Supply, 10.0).unwrap();
        ledger.record("fuel", 3, Kind::Supply, 5.0).unwrap();
        assert_eq!(ledger.value_at("fuel", 3, Kind::Supply).unwrap(), Some(15.0));
        assert!(!ledger.seed("fuel", 3, Kind::Supply, 0.0).unwrap());
        assert!(ledger.seed("fuel", 4, Kind::Demand, 7.0).unwrap());
        ledger.set("fuel", 4, Kind::Demand, 9.0).unwrap();
        let demand = ledger.history("fuel", Kind::Demand).unwrap();
        assert_eq!(demand.iter().collect::<Vec<_>>(), vec![(4, 9.0)]);
        assert_eq!(
            ledger.record("water", 0, Kind::Supply, 1.0),
            Err(CoreError::UnknownCommodity("water".to_string()))
        );
    }

    #[test]
    fn series_serializes_in_time_order() {
        let ts: TimeSeries = [(2, 1.0), (0, 3.0), (1, 2.0)].into_iter().collect();
        let s = serde_json::to_string(&ts).unwrap();
        assert_eq!(s, r#"{"0":3.0,"1":2.0,"2":1.0}"#);
        assert_eq!(ts.last(), Some((2, 1.0)));
    }

    proptest! {
        #[test]
        fn accumulation_is_order_independent(
            (increments, shuffled) in proptest::collection::vec((0u64..8, -1000i32..1000), 0..40)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let mut forward = CommodityLedger::new();
            forward.register("c".into());
            for (t, v) in &increments {
                forward.record("c", *t, Kind::Supply, *v as f64).unwrap();
            }
            let mut backward = CommodityLedger::new();
            backward.register("c".into());
            for (t, v) in &shuffled {
                backward.record("c", *t, Kind::Supply, *v as f64).unwrap();
            }
            prop_assert_eq!(
                forward.history("c", Kind::Supply).unwrap(),
                backward.history("c", Kind::Supply).unwrap()
            );
        }
    }
}
