//! Type encoding benchmarks
//!
//! Splitting and signature parsing, cold and memoized.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use typthon_objc::codec::{split_cached, MethodSignature};
use typthon_objc::split;

const ENCODINGS: &[(&str, &str)] = &[
    ("scalar", "v16@0:8"),
    ("object_args", "@40@0:8@16@24Q32"),
    ("struct_return", "{CGRect={CGPoint=dd}{CGSize=dd}}16@0:8"),
    (
        "nested",
        "v64@0:8{CGAffineTransform=dddddd}16^{__CFString=}@\"NSString\"[4{CGPoint=dd}]",
    ),
];

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    for (name, encoding) in ENCODINGS {
        group.bench_with_input(BenchmarkId::new("uncached", name), encoding, |b, encoding| {
            b.iter(|| split(black_box(encoding)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("cached", name), encoding, |b, encoding| {
            b.iter(|| split_cached(black_box(encoding)).unwrap())
        });
    }
    group.finish();
}

fn bench_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    for (name, encoding) in ENCODINGS {
        group.bench_with_input(BenchmarkId::new("parse", name), encoding, |b, encoding| {
            b.iter(|| MethodSignature::parse(black_box(encoding)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_split, bench_signature);
criterion_main!(benches);
