use criterion::{Criterion, criterion_group, criterion_main};
use landmark_index::chunking::{ChunkingConfig, chunk_text};
use std::hint::black_box;

pub fn criterion_benchmark(c: &mut Criterion) {
    // Roughly the length of a long designation report
    let text: String = (0..2000)
        .map(|i| format!("Sentence number {} describes another architectural detail. ", i))
        .collect();
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
