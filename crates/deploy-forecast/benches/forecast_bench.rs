use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deploy_forecast::{ForecastMethod, ForecastParams};

fn history(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 1000.0 * i as f64 + 250.0 * ((i % 12) as f64 - 6.0))
        .collect()
}

fn bench_methods(c: &mut Criterion) {
    let h = history(120);
    let params = ForecastParams {
        steps: 3,
        back_steps: 0,
        std_dev: 1.0,
        degree: 12,
    };
    for method in ForecastMethod::ALL {
        c.bench_function(&format!("forecast {method} x120"), |b| {
            b.iter(|| black_box(method.forecast(black_box(&h), &params)))
        });
    }
}

criterion_group!(benches, bench_methods);
criterion_main!(benches);
