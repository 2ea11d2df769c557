use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use partconv::ThreeStageConvolver;
use std::hint::black_box;

const SAMPLE_RATE: usize = 48000;
const HEAD_BLOCK_SIZE: usize = 128;
const TAIL_BLOCK_SIZE: usize = 4096;

pub fn impulse_response_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Impulse Responses");

    for &len in &[1_000, 13_000, 34_000, 87_000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let kernel = create_synthetic_ir(len);
            let mut conv =
                ThreeStageConvolver::new(HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE, &kernel).unwrap();

            let input = vec![0.5f32; 128];
            let mut output = vec![0.0f32; 128];

            // Warm the pipeline so the tail stage is running.
            for _ in 0..100 {
                conv.process(&input, &mut output);
            }

            b.iter(|| {
                conv.process(black_box(&input), black_box(&mut output));
            });
        });
    }

    group.finish();
}

pub fn convolution_loop_benchmark(c: &mut Criterion) {
    use rustfft::num_complex::Complex;

    let num_bins = 2 * TAIL_BLOCK_SIZE / 2 + 1;
    let num_partitions = 22;

    let history: Vec<Vec<Complex<f32>>> =
        vec![vec![Complex::new(0.5, 0.3); num_bins]; num_partitions];
    let ir_partitions: Vec<Vec<Complex<f32>>> =
        vec![vec![Complex::new(0.7, 0.2); num_bins]; num_partitions];

    c.bench_function("Convolution Loop", |b| {
        let mut accumulator = vec![Complex::new(0.0, 0.0); num_bins];
        b.iter(|| {
            accumulator.fill(Complex::new(0.0, 0.0));
            for j in 0..num_partitions {
                for (k, acc) in accumulator.iter_mut().enumerate().take(num_bins) {
                    *acc += black_box(history[j][k]) * black_box(ir_partitions[j][k]);
                }
            }
            black_box(&accumulator);
        });
    });
}

fn create_synthetic_ir(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let decay = (-t * 3.0).exp();
            let freq = 440.0 * 2.0 * std::f32::consts::PI;
            (freq * t).sin() * decay
        })
        .collect()
}

criterion_group!(
    benches,
    impulse_response_benchmarks,
    convolution_loop_benchmark
);
criterion_main!(benches);
