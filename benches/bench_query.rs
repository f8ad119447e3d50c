use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use docgraph::{Database, DatabaseConfig, Properties, TypeKind, Value, properties};
use serde_json::json;

const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn bench_scales() -> &'static [usize] {
    &[1_000, 10_000]
}

fn seeded(records: usize) -> Database {
    let db = Database::open_in_memory(&DatabaseConfig::default()).expect("db");
    db.declare_type("Person", TypeKind::Vertex).expect("Person");
    db.declare_type("Knows", TypeKind::Edge).expect("Knows");
    db.begin().expect("begin");
    let mut ids = Vec::with_capacity(records);
    for i in 0..records {
        let id = db
            .create_record(
                "Person",
                properties(json!({"name": format!("person-{i}"), "age": (i % 90) as i64, "cohort": i % 16}))
                    .expect("props"),
            )
            .expect("create");
        ids.push(id);
    }
    for pair in ids.windows(2) {
        db.create_edge("Knows", pair[0], pair[1], Properties::new())
            .expect("edge");
    }
    db.commit().expect("commit");
    db
}

fn bench_insert_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_records");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &records in bench_scales() {
        group.bench_function(BenchmarkId::from_parameter(records), |b| {
            b.iter(|| seeded(records));
        });
    }
    group.finish();
}

fn bench_filter_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_query");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &records in bench_scales() {
        let db = seeded(records);
        group.bench_function(BenchmarkId::from_parameter(records), |b| {
            b.iter(|| {
                db.query("SELECT name FROM Person WHERE age > ?", &[Value::Int(45)])
                    .expect("query")
                    .count()
            });
        });
    }
    group.finish();
}

fn bench_group_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &records in bench_scales() {
        let db = seeded(records);
        group.bench_function(BenchmarkId::from_parameter(records), |b| {
            b.iter(|| {
                db.query(
                    "SELECT cohort, COUNT(*) AS n, AVG(age) AS avg FROM Person GROUP BY cohort",
                    &[],
                )
                .expect("query")
                .count()
            });
        });
    }
    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_out");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &records in bench_scales() {
        let db = seeded(records);
        group.bench_function(BenchmarkId::from_parameter(records), |b| {
            b.iter(|| {
                db.query("SELECT expand(out('Knows')) FROM Person", &[])
                    .expect("query")
                    .count()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert_records,
    bench_filter_query,
    bench_group_by,
    bench_expand
);
criterion_main!(benches);
