//! Performance benchmarks for the focus measure
//!
//! Run with: cargo bench
//!
//! Workers must score a frame faster than the capture interval or the pool
//! starves and the sweep stalls; these numbers show the headroom per resolution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use servofocus::testing::focus_pattern;
use servofocus::{FocusMetric, LaplacianMean, Mask, Resolution};

fn centre_mask(resolution: Resolution) -> Mask {
    let (w, h) = (resolution.width, resolution.height);
    let bits = (0..h)
        .flat_map(|y| (0..w).map(move |x| x >= w / 4 && x < 3 * w / 4 && y >= h / 4 && y < 3 * h / 4))
        .collect();
    Mask::from_bits(resolution, bits).expect("mask size matches resolution")
}

fn bench_laplacian_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("Laplacian Mean");

    let resolutions = [
        (Resolution::new(320, 240), "240p"),
        (Resolution::new(640, 480), "480p"),
        (Resolution::new(1280, 720), "720p"),
    ];

    for (resolution, name) in resolutions {
        let frame = focus_pattern(resolution, 0.5);
        group.throughput(Throughput::Bytes(resolution.pixels() as u64));

        let full = Mask::full(resolution);
        group.bench_with_input(BenchmarkId::new("full", name), &frame, |b, frame| {
            b.iter(|| LaplacianMean.measure(black_box(frame), &full))
        });

        let centre = centre_mask(resolution);
        group.bench_with_input(BenchmarkId::new("centre", name), &frame, |b, frame| {
            b.iter(|| LaplacianMean.measure(black_box(frame), &centre))
        });
    }

    group.finish();
}

fn bench_response_map(c: &mut Criterion) {
    let resolution = Resolution::new(640, 480);
    let frame = focus_pattern(resolution, 0.5);

    c.bench_function("laplacian response 480p", |b| {
        b.iter(|| servofocus::quality::laplacian(black_box(&frame), resolution))
    });
}

criterion_group!(benches, bench_laplacian_mean, bench_response_map);
criterion_main!(benches);
