use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use spillway::binding::{BindingSet, BindingSetCodec};
use spillway::codec::{decode_from_slice, encode_to_vec, ValueCodec};
use spillway::collection::SetLike;
use spillway::config::SpillConfig;
use spillway::factory::CollectionFactory;
use spillway::value::Value;

fn sample_values() -> Vec<Value> {
    (0..1000)
        .map(|i| match i % 4 {
            0 => Value::iri(format!("http://example.org/resource/{i}")),
            1 => Value::integer(i),
            2 => Value::lang_literal(format!("label {i}"), "en"),
            _ => Value::triple(
                Value::blank_node(format!("b{i}")),
                Value::iri("http://example.org/p"),
                Value::literal(format!("object {i}")),
            ),
        })
        .collect()
}

fn bench_value_codec(c: &mut Criterion) {
    let values = sample_values();
    let encoded: Vec<Vec<u8>> = values
        .iter()
        .map(|v| encode_to_vec(&ValueCodec, v).expect("encode"))
        .collect();
    c.bench_function("encode 1000 values", |b| {
        b.iter(|| {
            for value in &values {
                black_box(encode_to_vec(&ValueCodec, value).expect("encode"));
            }
        })
    });
    c.bench_function("decode 1000 values", |b| {
        b.iter(|| {
            for bytes in &encoded {
                black_box(decode_from_slice(&ValueCodec, bytes).expect("decode"));
            }
        })
    });
}

fn bench_binding_set_codec(c: &mut Criterion) {
    let codec = BindingSetCodec::new();
    let rows: Vec<BindingSet> = sample_values()
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            BindingSet::new()
                .with("s", Value::iri(format!("http://example.org/{i}")))
                .with(format!("v{}", i % 3), v)
        })
        .collect();
    c.bench_function("encode 1000 binding sets", |b| {
        b.iter(|| {
            for row in &rows {
                black_box(encode_to_vec(&codec, row).expect("encode"));
            }
        })
    });
}

fn bench_spillable_set(c: &mut Criterion) {
    let values = sample_values();
    c.bench_function("value set in memory", |b| {
        b.iter(|| {
            let factory = CollectionFactory::in_memory();
            let mut set = factory.create_value_set();
            for value in &values {
                set.insert(value.clone()).expect("insert");
            }
            black_box(set.len())
        })
    });
    c.bench_function("value set spilled past 16", |b| {
        b.iter(|| {
            let factory = CollectionFactory::new(SpillConfig::default().with_commit_interval(500));
            let mut set = factory.create_value_set();
            for value in &values {
                set.insert(value.clone()).expect("insert");
            }
            black_box(set.len())
        })
    });
}

criterion_group!(
    benches,
    bench_value_codec,
    bench_binding_set_codec,
    bench_spillable_set
);
criterion_main!(benches);
