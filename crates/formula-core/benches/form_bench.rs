//! Benchmarks for decision evaluation and form-level propagation.
//!
//! Run with: cargo bench -p formula-core -- form

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;

use formula_core::{AbstractModel, D, Decision, FieldConfig, FormConfig, Relation};
use serde_json::json;

// ---------------------------------------------------------------------------
// 1. Decision evaluation over balanced trees
// ---------------------------------------------------------------------------

fn balanced(depth: u32, next: &mut usize) -> Decision {
    if depth == 0 {
        *next += 1;
        return Decision::from(format!("f{}", *next % 16));
    }
    let left = balanced(depth - 1, next);
    let right = balanced(depth - 1, next);
    if depth % 2 == 0 { D::and(left, right) } else { D::or(left, D::not(right)) }
}

fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("form/decision");
    let flags: HashMap<String, bool> = (0..16).map(|i| (format!("f{i}"), i % 3 != 0)).collect();

    for depth in [2u32, 6, 10] {
        let decision = balanced(depth, &mut 0);
        group.throughput(Throughput::Elements(decision.size() as u64));
        group.bench_with_input(BenchmarkId::new("evaluate", depth), &decision, |b, decision| {
            b.iter(|| black_box(decision.evaluate(&flags)));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. One source field feeding N relations
// ---------------------------------------------------------------------------

fn bench_relation_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("form/relations");

    for count in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(count as u64));
        let config = (0..count).fold(FormConfig::new("bench").with_field(FieldConfig::new("source")), |config, i| {
            config.with_field(FieldConfig::new(format!("f{i}")).with_relation(Relation::new("source", |field, value| {
                field.set_value(value.clone());
            })))
        });
        let model = AbstractModel::new(config).expect("bench form");

        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::new("set", count), &(), |b, _| {
            b.iter(|| {
                next += 1;
                model.set_field_value("source", json!(next)).expect("source field");
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Shared flag hiding N fields
// ---------------------------------------------------------------------------

fn bench_visibility(c: &mut Criterion) {
    let mut group = c.benchmark_group("form/visibility");

    for count in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(count as u64));
        let config = (0..count).fold(
            FormConfig::new("bench")
                .with_bool("off", |model| model.value("toggle") == json!(true))
                .with_field(FieldConfig::new("toggle")),
            |config, i| config.with_field(FieldConfig::new(format!("f{i}")).with_hidden(D::flag("off"))),
        );
        let model = AbstractModel::new(config).expect("bench form");

        let mut on = false;
        group.bench_with_input(BenchmarkId::new("toggle", count), &(), |b, _| {
            b.iter(|| {
                on = !on;
                model.set_field_value("toggle", json!(on)).expect("toggle field");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decision, bench_relation_fan_out, bench_visibility);
criterion_main!(benches);
