//! Benchmarks for segmentation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use digestflow::segment::segment_text;
use digestflow::testing::paragraph_text;

fn segment_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_text");
    for (label, paragraph) in [("paragraphs", 2_000), ("unbroken", 2_000_000)] {
        let text = paragraph_text(1_000_000, paragraph);
        group.bench_with_input(BenchmarkId::new(label, text.len()), &text, |b, text| {
            b.iter(|| segment_text(black_box(text), black_box(400_000)));
        });
    }
    group.finish();
}

criterion_group!(benches, segment_benchmark);
criterion_main!(benches);
