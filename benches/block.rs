use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

use czip::raw::{compress_block, compress_bound, decompress_block};
use czip::MAX_COMPRESS_LEN;

fn criterion_benchmark(c: &mut Criterion) {
    // One block of mixed content: compressible text, noise, zeros.
    let mut data = vec![0u8; MAX_COMPRESS_LEN];
    for (i, chunk) in data[..MAX_COMPRESS_LEN / 2]
        .chunks_mut(52)
        .enumerate()
    {
        let line = b"all work and no play makes jack a dull boy, take ";
        let take = chunk.len().min(line.len());
        chunk[..take].copy_from_slice(&line[..take]);
        chunk[0] = (i % 256) as u8;
    }
    thread_rng().fill(&mut data[MAX_COMPRESS_LEN / 2..MAX_COMPRESS_LEN * 3 / 4]);

    let mut compressed = vec![0u8; compress_bound(MAX_COMPRESS_LEN)];
    let len = compress_block(&data, &mut compressed).unwrap();

    c.bench_function("compress 64k block", |b| {
        let mut out = vec![0u8; compress_bound(MAX_COMPRESS_LEN)];
        b.iter(|| compress_block(black_box(&data), &mut out).unwrap())
    });

    c.bench_function("decompress 64k block", |b| {
        let mut out = vec![0u8; MAX_COMPRESS_LEN];
        b.iter(|| decompress_block(black_box(&compressed[..len]), &mut out).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
