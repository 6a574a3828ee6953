//! Headless facility simulation that drives the engine tick by tick.

use anyhow::{anyhow, bail, Result};
use chrono::{Months, NaiveDate};
use deploy_core::{CommodityConfig, CommodityId, Kind, PrototypeId};
use deploy_runtime::{AuditSink, Engine, EngineConfig, Observation, RunRecord};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// What one unit of a prototype does each tick.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Facility {
    pub output: String,
    pub throughput: f64,
    #[serde(default)]
    pub consumes: Option<String>,
    #[serde(default)]
    pub consumption: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InitialBuild {
    pub prototype: String,
    pub count: u32,
}

/// A scenario file. Prototypes without a `facilities` entry produce their
/// configured capacity and consume their constraint commodity.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub engine: EngineConfig,
    pub ticks: u64,
    pub start_date: NaiveDate,
    pub seed: u64,
    /// Relative throughput noise, in `[0, 1)`.
    pub noise: f64,
    pub facilities: BTreeMap<String, Facility>,
    pub initial: Vec<InitialBuild>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "growing-power".to_string(),
            engine: EngineConfig {
                commodities: vec![
                    "POWER_reactor_1000".to_string(),
                    "fuel_source_3000".to_string(),
                ],
                demand_eq: "1000*(1+1.5)**(t/12)".to_string(),
                ..EngineConfig::default()
            },
            ticks: 60,
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            seed: 42,
            noise: 0.0,
            facilities: BTreeMap::from([(
                "reactor".to_string(),
                Facility {
                    output: "POWER".to_string(),
                    throughput: 1000.0,
                    consumes: Some("fuel".to_string()),
                    consumption: 500.0,
                },
            )]),
            initial: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(text)?;
        if !(0.0..1.0).contains(&scenario.noise) {
            bail!("noise must be in [0, 1), got {}", scenario.noise);
        }
        Ok(scenario)
    }

    /// Calendar month of `tick`.
    pub fn date_of(&self, tick: u64) -> Result<NaiveDate> {
        let months = u32::try_from(tick)?;
        self.start_date
            .checked_add_months(Months::new(months))
            .ok_or_else(|| anyhow!("tick {tick} is past the calendar"))
    }
}

/// Operating fleet plus builds waiting to come online.
pub struct Host {
    facilities: BTreeMap<PrototypeId, Facility>,
    fleet: BTreeMap<PrototypeId, u32>,
    pending: Vec<(PrototypeId, u32)>,
    rng: ChaCha8Rng,
    noise: f64,
}

impl Host {
    pub fn new(scenario: &Scenario, config: &CommodityConfig) -> Result<Self> {
        let mut facilities: BTreeMap<PrototypeId, Facility> = BTreeMap::new();
        for (commodity, producers) in config.iter() {
            for (proto, spec) in producers {
                facilities.entry(proto.clone()).or_insert_with(|| Facility {
                    output: commodity.to_string(),
                    throughput: spec.capacity,
                    consumes: spec.constraint_commodity.as_ref().map(CommodityId::to_string),
                    consumption: if spec.constraint_commodity.is_some() {
                        spec.capacity
                    } else {
                        0.0
                    },
                });
            }
        }
        for (name, facility) in &scenario.facilities {
            facilities.insert(PrototypeId::from(name.as_str()), facility.clone());
        }

        let mut fleet = BTreeMap::new();
        for build in &scenario.initial {
            let proto = PrototypeId::from(build.prototype.as_str());
            if !facilities.contains_key(&proto) {
                bail!("initial build of unknown prototype `{proto}`");
            }
            *fleet.entry(proto).or_insert(0) += build.count;
        }
        Ok(Self {
            facilities,
            fleet,
            pending: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(scenario.seed),
            noise: scenario.noise,
        })
    }

    pub fn fleet(&self) -> &BTreeMap<PrototypeId, u32> {
        &self.fleet
    }

    /// Queue builds; they operate from the next tick.
    pub fn commission(&mut self, builds: Vec<(PrototypeId, u32)>) {
        self.pending.extend(builds);
    }

    pub fn bring_online(&mut self) {
        for (proto, count) in self.pending.drain(..) {
            *self.fleet.entry(proto).or_insert(0) += count;
        }
    }

    /// One supply report per operating facility type, plus its consumption.
    pub fn observations(&mut self, tick: u64) -> Vec<Observation> {
        let mut out = Vec::new();
        for (proto, &count) in &self.fleet {
            let Some(f) = self.facilities.get(proto) else {
                continue;
            };
            if count == 0 {
                continue;
            }
            let factor = if self.noise > 0.0 {
                1.0 + self.rng.gen_range(-self.noise..=self.noise)
            } else {
                1.0
            };
            let units = f64::from(count);
            out.push(Observation::new(
                proto.as_str(),
                tick,
                f.throughput * units * factor,
                Kind::Supply,
                &f.output,
            ));
            if let Some(input) = &f.consumes {
                out.push(Observation::new(
                    proto.as_str(),
                    tick,
                    f.consumption * units,
                    Kind::Demand,
                    input,
                ));
            }
        }
        out
    }
}

/// Everything a finished run hands back.
pub struct RunOutcome {
    pub record: RunRecord,
    pub fleet: BTreeMap<PrototypeId, u32>,
    pub method: String,
    pub end_date: NaiveDate,
}

pub fn run(scenario: &Scenario, audit: &mut dyn AuditSink) -> Result<RunOutcome> {
    let mut engine = Engine::new(scenario.engine.clone())?;
    let mut host = Host::new(scenario, engine.commodity_config())?;
    let channels: HashSet<String> = engine.channels().into_iter().collect();
    info!(scenario = %scenario.name, ticks = scenario.ticks, "run starting");

    for tick in 0..scenario.ticks {
        host.bring_online();
        for obs in host.observations(tick) {
            if channels.contains(&obs.channel) {
                engine.observe(&obs)?;
            }
        }
        let mut requested: Vec<(PrototypeId, u32)> = Vec::new();
        let report = engine.decide(tick, &mut requested, audit)?;
        let date = scenario.date_of(tick)?;
        debug!(
            tick,
            %date,
            builds = report.builds().count(),
            "tick decided"
        );
        host.commission(requested);
    }
    host.bring_online();

    let method = engine.method().to_string();
    let end_date = scenario.date_of(scenario.ticks)?;
    Ok(RunOutcome {
        record: engine.finish(),
        fleet: host.fleet().clone(),
        method,
        end_date,
    })
}
