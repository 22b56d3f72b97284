//! Benchmarks for transactional inserts and cascading deletes.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use cinder_core::schema::Column;
use cinder_core::{DataType, EngineConfig, Row, Value};
use cinder_storage::{ConcurrencyControl, Database, TransactionManager};
use std::sync::Arc;

fn manager() -> TransactionManager {
    TransactionManager::new(Arc::new(ConcurrencyControl::new()), EngineConfig::default())
}

fn school(departments: i64, students_per_department: i64) -> (Database, TransactionManager) {
    let db = Database::new("bench");
    let tm = manager();
    db.create_table("Departments", vec![Column::new("id", DataType::Int64).primary_key()])
        .unwrap();
    db.create_table(
        "Students",
        vec![
            Column::new("id", DataType::Int64).primary_key(),
            Column::new("name", DataType::String),
            Column::new("dept_id", DataType::Int64).references("Departments", "id"),
        ],
    )
    .unwrap();
    for dept in 0..departments {
        db.insert_row("Departments", Row::new().with("id", dept), &tm).unwrap();
        for n in 0..students_per_department {
            let id = dept * students_per_department + n;
            db.insert_row(
                "Students",
                Row::new()
                    .with("id", id)
                    .with("name", format!("student{}", id))
                    .with("dept_id", dept),
                &tm,
            )
            .unwrap();
        }
    }
    (db, tm)
}

fn insert_commit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_commit");
    for count in [10i64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || school(1, 0),
                |(db, tm)| {
                    let tx = tm.begin_transaction();
                    for id in 0..count {
                        db.insert_row_tx(
                            tx,
                            "Students",
                            Row::new().with("id", id).with("dept_id", 0),
                            &tm,
                        )
                        .unwrap();
                    }
                    tm.commit_transaction(tx, &db).unwrap();
                    black_box(db)
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn cascade_delete_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_delete");
    for children in [10i64, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(children), &children, |b, &children| {
            b.iter_batched(
                || school(4, children),
                |(db, tm)| {
                    let key = Value::Int64(2);
                    black_box(db.delete_row("Departments", &key, &tm, None).unwrap())
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn visible_rows_benchmark(c: &mut Criterion) {
    let (db, tm) = school(10, 100);
    let writer = tm.begin_transaction();
    for id in 0..50 {
        db.update_row_tx(writer, "Students", &Value::Int64(id), Row::new().with("name", "x"), &tm)
            .unwrap();
    }
    let reader = tm.begin_transaction();
    c.bench_function("visible_rows_with_pending_updates", |b| {
        b.iter(|| black_box(tm.get_visible_rows(reader, "Students", &db).unwrap()))
    });
}

criterion_group!(
    benches,
    insert_commit_benchmark,
    cascade_delete_benchmark,
    visible_rows_benchmark
);
criterion_main!(benches);
