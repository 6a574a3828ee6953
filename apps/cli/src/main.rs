#![deny(warnings)]

//! Headless scenario runner: drives the deployment engine against a simulated
//! fleet and reports how well supply tracked demand.

mod audit;
mod host;

use anyhow::{Context, Result};
use audit::FileAuditLog;
use deploy_metrics::{CommodityMetrics, MetricsReport};
use deploy_runtime::{AuditSink, NullAudit};
use host::Scenario;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<String>,
    ticks: Option<u64>,
    method: Option<String>,
    record: Option<String>,
    metrics_json: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--ticks" => args.ticks = it.next().and_then(|s| s.parse().ok()),
            "--method" => args.method = it.next(),
            "--record" => args.record = it.next(),
            "--metrics-json" => args.metrics_json = true,
            _ => {}
        }
    }
    args
}

fn load_scenario(args: &Args) -> Result<Scenario> {
    let mut scenario = match &args.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {path}"))?;
            Scenario::from_yaml(&text).with_context(|| format!("parsing scenario {path}"))?
        }
        None => Scenario::default(),
    };
    if let Some(ticks) = args.ticks {
        scenario.ticks = ticks;
    }
    if let Some(method) = &args.method {
        scenario.engine.calc_method = method.clone();
    }
    if args.record.is_some() {
        scenario.engine.record = true;
    }
    Ok(scenario)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args();
    info!(?args, git = env!("DEPLOY_GIT_SHA"), "starting CLI");

    let scenario = load_scenario(&args)?;
    let mut sink: Box<dyn AuditSink> = match &args.record {
        Some(dir) => Box::new(
            FileAuditLog::create(dir).with_context(|| format!("creating audit dir {dir}"))?,
        ),
        None => Box::new(NullAudit),
    };
    let outcome = host::run(&scenario, sink.as_mut())?;

    let record = &outcome.record;
    let builds: u64 = record.requested.values().sum();
    let commodities: Vec<CommodityMetrics> = record
        .ledger
        .commodities()
        .filter_map(|c| {
            record
                .ledger
                .series(c.as_str())
                .map(|s| CommodityMetrics::evaluate(c, s, record.forecasts.get(c)))
        })
        .collect();
    let report = MetricsReport {
        method: outcome.method.clone(),
        ticks: scenario.ticks,
        builds_requested: builds,
        commodities,
    };

    println!(
        "Run OK | scenario: {} | method: {} | ticks: {} | {} -> {} | builds: {}",
        scenario.name,
        report.method,
        report.ticks,
        scenario.start_date,
        outcome.end_date,
        builds
    );
    for (proto, count) in &outcome.fleet {
        println!("Fleet | {}: {}", proto, count);
    }
    for m in &report.commodities {
        println!(
            "KPI | {} | ticks: {} | residual: {:.1} | chi2: {:.3} | undersupplied: {} | supply MAE: {} | demand MAE: {}",
            m.commodity,
            m.ticks,
            m.residual_sum,
            m.chi_squared,
            m.undersupply_ticks,
            m.supply_forecast_mae
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}")),
            m.demand_forecast_mae
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}")),
        );
    }
    if args.metrics_json {
        println!("{}", report.to_json()?);
    }

    Ok(())
}
