use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use burst_merge_rs::image_pipeline::{
    BurstFrame, BurstMerger, ComputeContext, FrameMetadata, MergeConfig, MergingAlgorithm,
    texture::{ImageBuffer, Mosaic},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn generate_burst(width: usize, height: usize, count: usize) -> Vec<BurstFrame> {
    let mut rng = StdRng::seed_from_u64(42);
    let metadata = FrameMetadata {
        black_levels: Some([512; 4]),
        white_level: Some(16383),
        color_factors: Some([2.1, 1.0, 1.7]),
        ..FrameMetadata::default()
    };
    let scene: Mosaic = ImageBuffer::from_fn(width, height, |x, y| {
        let pattern = ((x / 16 + y / 16) % 2) as f32 * 2000.0;
        1000.0 + pattern + (x + y) as f32
    });

    (0..count)
        .map(|_| {
            let pixels = scene
                .pixels()
                .iter()
                .map(|&v| v + rng.random_range(-40.0..40.0))
                .collect();
            BurstFrame::new(ImageBuffer::new(width, height, pixels), metadata.clone())
        })
        .collect()
}

fn benchmark_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_by_algorithm");
    group.sample_size(10);
    let ctx = ComputeContext::new(None).expect("compute context");

    for algorithm in [MergingAlgorithm::Fast, MergingAlgorithm::HigherQuality] {
        let frames = generate_burst(512, 512, 4);
        let config = MergeConfig::builder().algorithm(algorithm).build();
        let merger = BurstMerger::new(&ctx, config).expect("valid config");

        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &frames, |b, frames| {
            b.iter(|| merger.merge(black_box(frames.clone())));
        });
    }

    group.finish();
}

fn benchmark_burst_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_by_frame_count");
    group.sample_size(10);
    let ctx = ComputeContext::new(None).expect("compute context");
    let config = MergeConfig::builder().algorithm(MergingAlgorithm::Fast).build();
    let merger = BurstMerger::new(&ctx, config).expect("valid config");

    for count in [2, 4, 8] {
        let frames = generate_burst(256, 256, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &frames, |b, frames| {
            b.iter(|| merger.merge(black_box(frames.clone())));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_algorithms, benchmark_burst_sizes);
criterion_main!(benches);
