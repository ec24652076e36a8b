//! Performance benchmarks for witrack core operations
//!
//! Run with: `cargo bench -p witrack-core`
//!
//! These benchmarks measure critical path performance:
//! - Criteria compilation of wide expressions
//! - Field conversion of a full planner item
//! - Reorder round trips against the in-memory store

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;
use witrack_core::config::OrderingConfig;
use witrack_core::criteria::{compile, Expression, SpaceFilter};
use witrack_core::db::{InMemoryStore, ReorderDirection};
use witrack_core::models::{
    planner_item_fields, system, FieldValue, NewWorkItemType, WorkItemType,
};
use witrack_core::services::{WorkItemService, WorkItemTypeCache, WorkItemTypeService};

/// `(state = s0) or (state = s1) or ...` with a column comparison per branch
fn wide_expression(branches: usize) -> Expression {
    (1..branches).fold(branch(0), |acc, i| Expression::or(acc, branch(i)))
}

fn branch(i: usize) -> Expression {
    Expression::and(
        Expression::equals(
            Expression::field(system::STATE),
            Expression::literal(format!("state {}", i)),
        ),
        Expression::not(Expression::field("Number"), Expression::literal(i as i64)),
    )
}

fn planner_values() -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert(system::TITLE.to_string(), FieldValue::from("Benchmark item"));
    fields.insert(system::STATE.to_string(), FieldValue::from("open"));
    fields.insert(
        system::ASSIGNEES.to_string(),
        FieldValue::from(vec!["alice", "bob", "carol"]),
    );
    fields.insert(system::LABELS.to_string(), FieldValue::from(vec!["perf"]));
    fields
}

/// Benchmark criteria compilation
///
/// Target: < 50µs for a 100-branch expression
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("criteria_compile");
    let expr = wide_expression(100);
    let space = Uuid::new_v4();

    group.bench_function("100_branches", |b| {
        b.iter(|| black_box(compile(black_box(&expr))))
    });

    group.bench_function("space_filter", |b| {
        b.iter(|| black_box(SpaceFilter::compile(space, Some(expr.clone())).unwrap()))
    });

    group.finish();
}

/// Benchmark field conversion in both directions
fn bench_field_conversion(c: &mut Criterion) {
    let wit = WorkItemType::extend(
        None,
        NewWorkItemType::new("planneritem", Uuid::new_v4()).with_fields(planner_item_fields()),
    )
    .unwrap();
    let values = planner_values();
    let stored = wit.convert_fields_to_model(&values).unwrap();

    c.bench_function("convert_fields_to_model", |b| {
        b.iter(|| black_box(wit.convert_fields_to_model(black_box(&values)).unwrap()))
    });

    c.bench_function("convert_fields_from_model", |b| {
        b.iter(|| black_box(wit.convert_fields_from_model(black_box(&stored)).unwrap()))
    });
}

/// Benchmark repeated moves between the same two neighbours
///
/// Measures the load/compute/conditional-write cycle of a reorder.
fn bench_reorder(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("reorder_above_cycle", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let store = Arc::new(InMemoryStore::new());
                let types =
                    WorkItemTypeService::new(store.clone(), Arc::new(WorkItemTypeCache::new()));
                let items = WorkItemService::new(store, types.clone(), OrderingConfig::default());
                let space = Uuid::new_v4();
                let user = Uuid::new_v4();
                let wit = types
                    .create(
                        NewWorkItemType::new("task", space).with_fields(planner_item_fields()),
                        None,
                    )
                    .await
                    .unwrap();

                let lower = items
                    .create(space, wit.id, planner_values(), user)
                    .await
                    .unwrap();
                let _upper = items
                    .create(space, wit.id, planner_values(), user)
                    .await
                    .unwrap();

                let mut total = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let item = items
                        .create(space, wit.id, planner_values(), user)
                        .await
                        .unwrap();

                    let start = std::time::Instant::now();
                    let moved = items
                        .reorder(space, &item, ReorderDirection::Above, Some(lower.id), user)
                        .await;
                    total += start.elapsed();

                    black_box(moved.unwrap());
                }

                total
            })
        });
    });
}

criterion_group!(benches, bench_compile, bench_field_conversion, bench_reorder);
criterion_main!(benches);
