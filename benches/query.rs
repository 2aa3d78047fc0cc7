use std::hint::black_box;
use std::rc::Rc;

use tracecore::db::ColumnSchema;
use tracecore::db::ColumnTable;
use tracecore::db::ConstraintOp;
use tracecore::db::DbSqliteTable;
use tracecore::db::DbSqliteTableContext;
use tracecore::db::QueryCache;
use tracecore::db::QueryConstraints;
use tracecore::db::Schema;
use tracecore::db::SqlType;
use tracecore::db::SqlValue;

use criterion::measurement::Measurement;
use criterion::Bencher;
use criterion::BenchmarkGroup;


const ROW_COUNT: i64 = 100_000;
const TS: u32 = 1;
const VALUE: u32 = 2;
const NAME: u32 = 3;


fn table(cache: bool) -> DbSqliteTable {
    let schema = Schema::new(vec![
        ColumnSchema::id("id"),
        ColumnSchema::new("ts", SqlType::Long).sorted(),
        ColumnSchema::new("value", SqlType::Long),
        ColumnSchema::new("name", SqlType::String),
    ]);
    let mut builder = ColumnTable::builder(schema);
    for id in 0..ROW_COUNT {
        let () = builder
            .push_row(vec![
                SqlValue::from(id),
                SqlValue::from(id * 10),
                SqlValue::from(id % 97),
                SqlValue::from(format!("slice{}", id % 1013)),
            ])
            .unwrap();
    }
    let table = Rc::new(builder.build().unwrap());
    let cache = cache.then(QueryCache::new_shared);
    let context = DbSqliteTableContext::new_static(cache, table);
    DbSqliteTable::new("slice", Rc::new(context)).unwrap()
}


/// Estimate the cost of a query with a mix of constraints.
fn cost_estimation() {
    let schema = Schema::new(vec![
        ColumnSchema::id("id"),
        ColumnSchema::new("ts", SqlType::Long).sorted(),
        ColumnSchema::new("value", SqlType::Long),
        ColumnSchema::new("name", SqlType::String),
    ]);
    let qc = QueryConstraints::new()
        .with_constraint(VALUE, ConstraintOp::Eq)
        .with_constraint(TS, ConstraintOp::Ge)
        .with_constraint(TS, ConstraintOp::Lt)
        .with_constraint(NAME, ConstraintOp::Glob)
        .with_order_by(VALUE, false)
        .with_order_by(TS, false);

    let cost = DbSqliteTable::estimate_cost(black_box(&schema), black_box(1 << 20), black_box(&qc));
    assert!(cost.cost > 0.0);
}

/// Filter a table on its sorted column.
fn filter_sorted<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let table = table(false);
    let qc = QueryConstraints::new()
        .with_constraint(TS, ConstraintOp::Ge)
        .with_constraint(TS, ConstraintOp::Lt);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();

    let () = b.iter(|| {
        let count = cursor
            .scan(&plan, &[SqlValue::from(5000i64), SqlValue::from(6000i64)])
            .unwrap()
            .count();
        assert_eq!(count, 100);
    });
}

/// Repeatedly filter a table on an unsorted column, letting the adapter
/// cache a sorted projection.
fn filter_unsorted_cached<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let table = table(true);
    let qc = QueryConstraints::new().with_constraint(VALUE, ConstraintOp::Eq);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();

    let () = b.iter(|| {
        let count = cursor
            .scan(&plan, &[SqlValue::from(black_box(42i64))])
            .unwrap()
            .count();
        assert!(count > 0);
    });
}

/// Filter a table on an unsorted column without caching.
fn filter_unsorted_uncached<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let table = table(false);
    let qc = QueryConstraints::new().with_constraint(VALUE, ConstraintOp::Eq);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();

    let () = b.iter(|| {
        let count = cursor
            .scan(&plan, &[SqlValue::from(black_box(42i64))])
            .unwrap()
            .count();
        assert!(count > 0);
    });
}

/// Filter by glob pattern.
fn filter_glob<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let table = table(false);
    let qc = QueryConstraints::new().with_constraint(NAME, ConstraintOp::Glob);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();

    let () = b.iter(|| {
        let count = cursor
            .scan(&plan, &[SqlValue::from("slice10?")])
            .unwrap()
            .count();
        assert!(count > 0);
    });
}


pub fn benchmark<M>(group: &mut BenchmarkGroup<'_, M>)
where
    M: Measurement,
{
    bench_fn!(group, cost_estimation);
    bench_sub_fn!(group, filter_sorted);
    bench_sub_fn!(group, filter_unsorted_cached);
    bench_sub_fn!(group, filter_unsorted_uncached);
    bench_sub_fn!(group, filter_glob);
}
