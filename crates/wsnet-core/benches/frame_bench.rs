//! Criterion benchmarks for the frame codec and SEP parser.
//!
//! Run with:
//! ```bash
//! cargo bench --package wsnet-core --bench frame_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wsnet_core::{decode_frame, encode_masked_frame, encode_text_frame, OpCode, SepRequest};

const LIMIT: u64 = 16 * 1024 * 1024;
const MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

// Small (7-bit length), medium (16-bit length), large (64-bit length).
const SIZES: &[usize] = &[64, 4 * 1024, 128 * 1024];

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_text_frame");
    for &size in SIZES {
        let text = "a".repeat(size);
        group.bench_with_input(BenchmarkId::new("bytes", size), &text, |b, text| {
            b.iter(|| encode_text_frame(black_box(text)));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for &size in SIZES {
        let bytes = encode_masked_frame(OpCode::Text, "a".repeat(size).as_bytes(), MASK);
        group.bench_with_input(BenchmarkId::new("bytes", size), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes), LIMIT).unwrap());
        });
    }
    group.finish();
}

fn bench_sep_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sep_parse");
    group.bench_function("route_only", |b| {
        b.iter(|| SepRequest::parse(black_box("ping")).unwrap());
    });
    group.bench_function("content_type_id_payload", |b| {
        b.iter(|| SepRequest::parse(black_box("json save:12345\n{\"value\":\"hello\"}")).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_sep_parse);
criterion_main!(benches);
