//! Benchmarks for the filter, smoother and online append.

use anofox_dlm::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_seasonal(n: usize, period: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            0.05 * i as f64 + (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin()
        })
        .collect()
}

fn structural_model(values: &[f64]) -> Dlm {
    let mut dlm = Dlm::from_values(values);
    dlm.add(Trend::new(1, 0.98).unwrap()).unwrap();
    dlm.add(Seasonality::new(12, 0.99).unwrap()).unwrap();
    dlm.add(AutoReg::new(2, 0.99).unwrap()).unwrap();
    dlm.initialize().unwrap();
    dlm
}

fn bench_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("dlm_passes");

    for size in [128, 512, 2048].iter() {
        let values = generate_seasonal(*size, 12);

        group.bench_with_input(BenchmarkId::new("forward_filter", size), size, |b, &n| {
            let mut dlm = structural_model(&values);
            b.iter(|| dlm.forward_filter(0, black_box(n - 1), false))
        });

        group.bench_with_input(BenchmarkId::new("fit", size), size, |b, _| {
            b.iter(|| {
                let mut dlm = structural_model(black_box(&values));
                dlm.fit()
            })
        });
    }

    group.finish();
}

fn bench_online_append(c: &mut Criterion) {
    let values = generate_seasonal(1024, 12);
    let mut fitted = structural_model(&values[..1000]);
    fitted.fit_forward_filter().unwrap();

    c.bench_function("append_and_refilter", |b| {
        b.iter(|| {
            let mut dlm = fitted.clone();
            dlm.append(values[1000..].iter().map(|&v| Some(v)).collect())
                .unwrap();
            dlm.fit_forward_filter()
        })
    });
}

criterion_group!(benches, bench_passes, bench_online_append);
criterion_main!(benches);
