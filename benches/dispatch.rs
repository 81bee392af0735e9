//! Message send benchmarks against the simulated runtime
//!
//! Covers the full path: lookup, marshalling, libffi call, result
//! conversion and wrapper caching.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use typthon_objc::{Bridge, BridgeConfig, Instance, Value};

fn setup() -> (&'static Bridge, Instance) {
    let bridge = Bridge::simulated(BridgeConfig::default()).unwrap();
    let array = bridge
        .get_class("NSMutableArray")
        .unwrap()
        .send("new", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();
    (bridge, array)
}

fn bench_sends(c: &mut Criterion) {
    let (bridge, array) = setup();
    let screen = bridge
        .get_class("SimScreen")
        .unwrap()
        .send("mainScreen", &[])
        .unwrap()
        .as_instance()
        .unwrap()
        .clone();

    let mut group = c.benchmark_group("send");
    group.bench_function("scalar_return", |b| {
        b.iter(|| array.send(black_box("count"), &[]).unwrap())
    });
    group.bench_function("bound_method", |b| {
        let count = array.method("count").unwrap();
        b.iter(|| count.call(&[]).unwrap())
    });
    group.bench_function("struct_return", |b| {
        b.iter(|| screen.send(black_box("frame"), &[]).unwrap())
    });
    group.bench_function("object_return_cached_wrapper", |b| {
        b.iter(|| screen.send(black_box("self"), &[]).unwrap())
    });
    group.finish();
}

fn bench_conversion(c: &mut Criterion) {
    let (bridge, _) = setup();
    let value = Value::List((0..16).map(Value::Int).collect());

    c.bench_function("convert/list_round_trip", |b| {
        b.iter(|| {
            let boxed = bridge.box_value(black_box(&value)).unwrap();
            let back = boxed.to_value().unwrap();
            boxed.release().unwrap();
            back
        })
    });
}

fn bench_pools(c: &mut Criterion) {
    let (bridge, _) = setup();
    let number = bridge.get_class("NSNumber").unwrap();

    c.bench_function("lifecycle/autoreleased_wrap_and_evict", |b| {
        b.iter(|| {
            bridge
                .with_autorelease_pool(|| number.send("numberWithLongLong:", &[Value::Int(7)]))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_sends, bench_conversion, bench_pools);
criterion_main!(benches);
