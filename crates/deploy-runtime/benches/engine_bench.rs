use criterion::{criterion_group, criterion_main, Criterion};
use deploy_core::{Kind, PrototypeId};
use deploy_runtime::{Engine, EngineConfig, NullAudit, Observation};

fn bench_decide(c: &mut Criterion) {
    let config = EngineConfig {
        commodities: vec![
            "POWER_reactor_1000_1_fuel_30000".into(),
            "POWER_wind_200_2".into(),
            "fuel_source_3000".into(),
        ],
        demand_eq: "10*(1+1.5)**(t/12)".into(),
        ..EngineConfig::default()
    };
    c.bench_function("engine_120_ticks", |b| {
        b.iter(|| {
            let mut engine = Engine::new(config.clone()).unwrap();
            let mut builds: Vec<(PrototypeId, u32)> = Vec::new();
            for t in 0..120u64 {
                engine
                    .observe(&Observation::new("grid", t, 500.0, Kind::Supply, "POWER"))
                    .unwrap();
                engine
                    .observe(&Observation::new("mine", t, 2000.0, Kind::Supply, "fuel"))
                    .unwrap();
                engine.decide(t, &mut builds, &mut NullAudit).unwrap();
            }
            engine.total_requested()
        })
    });
}

criterion_group!(benches, bench_decide);
criterion_main!(benches);
