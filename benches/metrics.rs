//! Leakage-metric benchmarks
//!
//! Baseline throughput of the three per-sample metrics over synthetic
//! trace sets at realistic capture sizes.
//!
//! Run with: cargo bench --bench metrics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use traza_db::metrics::{
    pearson_correlation, signal_to_noise_ratio, t_test_tvla, welch_t_test, LabelPartition,
};

const TRACES: usize = 1_000;
const SAMPLE_WIDTHS: [usize; 2] = [500, 5_000];

fn synthetic_traces(rng: &mut StdRng, rows: usize, samples: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, samples), |_| rng.gen::<f64>())
}

/// SNR over a 9-label Hamming-weight-style partition
fn bench_snr(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_to_noise_ratio");
    let mut rng = StdRng::seed_from_u64(1);

    for samples in SAMPLE_WIDTHS {
        let traces = synthetic_traces(&mut rng, TRACES, samples);
        let labels: Vec<i64> = (0..TRACES).map(|_| rng.gen_range(0..9)).collect();
        let partition = LabelPartition::from_labels(&labels, &traces).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(samples),
            &partition,
            |b, partition| {
                b.iter(|| signal_to_noise_ratio(black_box(partition)).unwrap());
            },
        );
    }
    group.finish();
}

/// Incremental and batch t-test over aligned populations
fn bench_ttest(c: &mut Criterion) {
    let mut group = c.benchmark_group("welch_t_test");
    let mut rng = StdRng::seed_from_u64(2);

    for samples in SAMPLE_WIDTHS {
        let fixed = synthetic_traces(&mut rng, TRACES, samples);
        let random = synthetic_traces(&mut rng, TRACES, samples);

        group.bench_with_input(
            BenchmarkId::new("incremental", samples),
            &(&fixed, &random),
            |b, (fixed, random)| {
                b.iter(|| t_test_tvla(black_box(fixed), black_box(random)).unwrap());
            },
        );
        group.bench_with_input(
            BenchmarkId::new("batch", samples),
            &(&fixed, &random),
            |b, (fixed, random)| {
                b.iter(|| welch_t_test(black_box(fixed), black_box(random)).unwrap());
            },
        );
    }
    group.finish();
}

/// Pearson correlation of one predicted-leakage column against all samples
fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pearson_correlation");
    let mut rng = StdRng::seed_from_u64(3);

    for samples in SAMPLE_WIDTHS {
        let observed = synthetic_traces(&mut rng, TRACES, samples);
        let predicted: Array1<f64> =
            Array1::from_iter((0..TRACES).map(|_| f64::from(rng.gen_range(0u32..9))));

        group.bench_with_input(
            BenchmarkId::from_parameter(samples),
            &(&predicted, &observed),
            |b, (predicted, observed)| {
                b.iter(|| pearson_correlation(black_box(predicted), black_box(observed)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_snr, bench_ttest, bench_correlation);
criterion_main!(benches);
