use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use vecplot::config::ReducerSettings;
use vecplot::tsne::TsneReducer;
use vecplot::vector_ops::pairwise_squared_distances;

const DIMENSIONS: usize = 128;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(30))
        .warm_up_time(std::time::Duration::from_secs(3))
        .configure_from_args()
}

fn random_vectors(n: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn bench_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairwise_distances");
    for n in [100, 500, 1000] {
        let data = random_vectors(n);
        let rows: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| pairwise_squared_distances(rows))
        });
    }
    group.finish();
}

fn bench_tsne(c: &mut Criterion) {
    let reducer = TsneReducer::new(&ReducerSettings {
        neighborhood_size: 30.0,
        random_seed: 42,
        max_iterations: 250,
        early_exaggeration: 12.0,
        learning_rate: None,
    });

    let mut group = c.benchmark_group("tsne_250_iterations");
    for n in [100, 300] {
        let data = random_vectors(n);
        let rows: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| reducer.reduce(rows).unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_distances, bench_tsne
}
criterion_main!(benches);
