//! Benchmarks for cinder-index using criterion.

use cinder_core::{Row, Value};
use cinder_index::{BTree, ColumnIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn btree_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for degree in [3, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(degree), degree, |b, &degree| {
            b.iter(|| {
                let mut tree = BTree::new(degree).unwrap();
                for i in 0..10_000i64 {
                    tree.insert(i, i);
                }
                black_box(tree)
            });
        });
    }

    group.finish();
}

fn btree_search_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_search");

    for size in [100i64, 1000, 10000].iter() {
        let mut tree = BTree::new(3).unwrap();
        for i in 0..*size {
            tree.insert(i, i);
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in (0..100).map(|x| x * size / 100) {
                    black_box(tree.search(&i));
                }
            });
        });
    }

    group.finish();
}

fn btree_remove_benchmark(c: &mut Criterion) {
    c.bench_function("btree_remove_half", |b| {
        b.iter_batched(
            || {
                let mut tree = BTree::new(3).unwrap();
                for i in 0..10_000i64 {
                    tree.insert(i, i);
                }
                tree
            },
            |mut tree| {
                for i in (0..10_000i64).step_by(2) {
                    black_box(tree.remove(&i));
                }
                tree
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn column_index_benchmark(c: &mut Criterion) {
    let rows: Vec<Row> = (0..1000i64)
        .map(|i| Row::new().with("id", i).with("name", format!("Student {}", i % 50)))
        .collect();

    c.bench_function("column_index_add_1000", |b| {
        b.iter(|| {
            let mut index = ColumnIndex::new("name", 3).unwrap();
            for row in &rows {
                index.add_to_index(row.get_or_null("name"), row.clone());
            }
            black_box(index)
        });
    });

    let mut index = ColumnIndex::new("name", 3).unwrap();
    for row in &rows {
        index.add_to_index(row.get_or_null("name"), row.clone());
    }
    c.bench_function("column_index_lookup", |b| {
        b.iter(|| black_box(index.lookup(&Value::from("student 7"))));
    });
}

criterion_group!(
    benches,
    btree_insert_benchmark,
    btree_search_benchmark,
    btree_remove_benchmark,
    column_index_benchmark
);
criterion_main!(benches);
