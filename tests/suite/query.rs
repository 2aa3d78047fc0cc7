use std::rc::Rc;

use tracecore::db::ColumnTable;
use tracecore::db::ConstraintOp;
use tracecore::db::DbSqliteTable;
use tracecore::db::DbSqliteTableContext;
use tracecore::db::FilterHistory;
use tracecore::db::QueryCache;
use tracecore::db::QueryConstraints;
use tracecore::db::RuntimeTableRegistry;
use tracecore::db::SqlValue;
use tracecore::db::Table as _;
use tracecore::db::REPEATED_QUERY_CACHE_THRESHOLD;
use tracecore::mapping::AncestorCallsites;
use tracecore::mapping::CreateMappingParams;
use tracecore::mapping::MappingTracker;
use tracecore::AddressRange;
use tracecore::ErrorKind;

use test_log::test;


/// Create a tracker with a few mappings and frames in each.
fn populated_tracker() -> MappingTracker {
    let mut tracker = MappingTracker::new();
    for (idx, name) in ["/bin/app", "/lib/libc.so", "/lib/libm.so"].iter().enumerate() {
        let start = 0x10000 * (idx as u64 + 1);
        let params = CreateMappingParams::new(AddressRange::from_start_and_size(start, 0x1000), *name);
        let mapping = tracker.create_user_memory_mapping(1, params).unwrap();
        for pc in 0..8u64 {
            let _frame = tracker
                .intern_frame(mapping, pc * 0x10, &format!("{name}_fn{pc}"))
                .unwrap();
        }
    }
    tracker
}


/// Check that the mapping table can be queried through the adapter.
#[test]
fn mapping_table_queries() {
    let tracker = populated_tracker();
    let mappings = Rc::new(tracker.storage().mapping_table().unwrap());
    let context = DbSqliteTableContext::new_static(None, mappings);
    let table = DbSqliteTable::new("stack_profile_mapping", Rc::new(context)).unwrap();
    assert!(table
        .sqlite_schema()
        .to_create_table_stmt()
        .starts_with("CREATE TABLE x( id BIG INT, build_id STRING"));

    let name = table.schema().column_index("name").unwrap();
    let start = table.schema().column_index("start").unwrap();
    let qc = QueryConstraints::new().with_constraint(name, ConstraintOp::Eq);
    let plan = table.plan(&qc).unwrap();
    assert!(plan.is_omitted(0));

    let mut cursor = table.create_cursor();
    let rows = cursor
        .scan(&plan, &[SqlValue::from("/lib/libc.so")])
        .unwrap()
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][start as usize], SqlValue::from(0x20000u64));

    let qc = QueryConstraints::new().with_constraint(name, ConstraintOp::Glob);
    let plan = table.plan(&qc).unwrap();
    let count = cursor
        .scan(&plan, &[SqlValue::from("/lib/*")])
        .unwrap()
        .count();
    assert_eq!(count, 2);
}

/// Check that frames can be filtered by mapping and ordered.
#[test]
fn frame_table_queries() {
    let tracker = populated_tracker();
    let frames = Rc::new(tracker.storage().frame_table().unwrap());
    assert_eq!(frames.row_count(), 24);

    let context = DbSqliteTableContext::new_static(None, frames);
    let table = DbSqliteTable::new("stack_profile_frame", Rc::new(context)).unwrap();
    let mapping = table.schema().column_index("mapping").unwrap();
    let rel_pc = table.schema().column_index("rel_pc").unwrap();

    let qc = QueryConstraints::new()
        .with_constraint(mapping, ConstraintOp::Eq)
        .with_constraint(rel_pc, ConstraintOp::Ge)
        .with_order_by(rel_pc, true);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();
    let pcs = cursor
        .scan(&plan, &[SqlValue::from(1u32), SqlValue::from(0x50u64)])
        .unwrap()
        .map(|row| row[rel_pc as usize].clone())
        .collect::<Vec<_>>();
    assert_eq!(
        pcs,
        vec![
            SqlValue::from(0x70u64),
            SqlValue::from(0x60u64),
            SqlValue::from(0x50u64)
        ]
    );
}

/// Check that the id column is always considered first.
#[test]
fn id_constraint_first() {
    let tracker = populated_tracker();
    let frames = Rc::new(tracker.storage().frame_table().unwrap());
    let context = DbSqliteTableContext::new_static(None, frames);
    let table = DbSqliteTable::new("stack_profile_frame", Rc::new(context)).unwrap();
    let name = table.schema().column_index("name").unwrap();

    let mut qc = QueryConstraints::new()
        .with_constraint(name, ConstraintOp::Eq)
        .with_constraint(0, ConstraintOp::Eq);
    let id_cost = table
        .best_index(&QueryConstraints::new().with_constraint(0, ConstraintOp::Eq))
        .unwrap()
        .estimated_cost;
    let name_cost = table
        .best_index(&QueryConstraints::new().with_constraint(name, ConstraintOp::Eq))
        .unwrap()
        .estimated_cost;
    assert!(id_cost < name_cost);

    let () = table.modify_constraints(&mut qc);
    assert_eq!(qc.constraints()[0].column, 0);
    assert_eq!(qc.constraints()[1].column, name);

    // The plan reports values in original order.
    let qc = QueryConstraints::new()
        .with_constraint(name, ConstraintOp::Eq)
        .with_constraint(0, ConstraintOp::Eq);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();
    let rows = cursor
        .scan(&plan, &[SqlValue::from("/bin/app_fn3"), SqlValue::from(3u32)])
        .unwrap()
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], SqlValue::from(3u32));
}

/// Make sure that the query cache gets populated on the third identical
/// query in a row.
#[test]
fn query_cache_trigger() {
    let tracker = populated_tracker();
    let frames = Rc::new(tracker.storage().frame_table().unwrap());
    let cache = QueryCache::new_shared();
    let context = DbSqliteTableContext::new_static(Some(Rc::clone(&cache)), frames);
    let table = DbSqliteTable::new("stack_profile_frame", Rc::new(context)).unwrap();
    let mapping = table.schema().column_index("mapping").unwrap();
    let rel_pc = table.schema().column_index("rel_pc").unwrap();

    let by_mapping = QueryConstraints::new().with_constraint(mapping, ConstraintOp::Eq);
    let by_pc = QueryConstraints::new().with_constraint(rel_pc, ConstraintOp::Eq);

    let mut cursor = table.create_cursor();
    let argv = [SqlValue::from(2u32)];
    let () = cursor
        .filter(&by_mapping, &argv, FilterHistory::Different)
        .unwrap();
    let () = cursor.filter(&by_mapping, &argv, FilterHistory::Same).unwrap();
    // A different query resets the repeat counter.
    let () = cursor
        .filter(&by_pc, &[SqlValue::from(0x10u64)], FilterHistory::Different)
        .unwrap();
    let () = cursor
        .filter(&by_mapping, &argv, FilterHistory::Different)
        .unwrap();
    let () = cursor.filter(&by_mapping, &argv, FilterHistory::Same).unwrap();
    assert!(cache.borrow().is_empty());

    let () = cursor.filter(&by_mapping, &argv, FilterHistory::Same).unwrap();
    assert!(!cache.borrow().is_empty());
    assert_eq!(REPEATED_QUERY_CACHE_THRESHOLD, 3);

    let mut count = 0;
    while !cursor.eof() {
        assert_eq!(cursor.column(mapping), Some(SqlValue::from(2u32)));
        let () = cursor.next();
        count += 1;
    }
    assert_eq!(count, 8);
}

/// Exercise the ancestor callsite table function end to end.
#[test]
fn ancestor_callsite_function() {
    let mut tracker = MappingTracker::new();
    let kernel = tracker.get_or_create_kernel_memory_mapping_default();
    let frames = ["start_kernel", "do_idle", "cpu_startup_entry", "schedule"]
        .iter()
        .enumerate()
        .map(|(idx, name)| tracker.intern_frame(kernel, idx as u64, name).unwrap())
        .collect::<Vec<_>>();
    let leaf = tracker.intern_callstack(&frames).unwrap().unwrap();

    let function = AncestorCallsites::new(tracker.storage());
    let context = DbSqliteTableContext::new_table_function(None, Box::new(function));
    let table = DbSqliteTable::new("ancestor_callsite", Rc::new(context)).unwrap();
    let start_id = table.schema().column_index("start_id").unwrap();
    let frame_id = table.schema().column_index("frame_id").unwrap();

    let err = table.best_index(&QueryConstraints::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);

    let qc = QueryConstraints::new().with_constraint(start_id, ConstraintOp::Eq);
    let plan = table.plan(&qc).unwrap();
    let mut cursor = table.create_cursor();
    let ancestors = cursor
        .scan(&plan, &[SqlValue::from(leaf)])
        .unwrap()
        .map(|row| row[frame_id as usize].clone())
        .collect::<Vec<_>>();
    let expected = frames[..3]
        .iter()
        .copied()
        .map(SqlValue::from)
        .collect::<Vec<_>>();
    assert_eq!(ancestors, expected);
}

/// Check that runtime tables are erased once their adapter is gone.
#[test]
fn runtime_table_life_cycle() {
    let tracker = populated_tracker();
    let registry = Rc::new(RuntimeTableRegistry::new());
    let frames: Rc<ColumnTable> = Rc::new(tracker.storage().frame_table().unwrap());
    let () = registry.create_table("frames", Rc::<ColumnTable>::clone(&frames)).unwrap();
    let err = registry.create_table("frames", frames).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let context = Rc::new(DbSqliteTableContext::new_runtime(None, Rc::clone(&registry)));
    {
        let table = DbSqliteTable::new("frames", Rc::clone(&context)).unwrap();
        let plan = table.plan(&QueryConstraints::new()).unwrap();
        let mut cursor = table.create_cursor();
        assert_eq!(cursor.scan(&plan, &[]).unwrap().count(), 24);
    }
    assert!(!registry.contains("frames"));

    let err = DbSqliteTable::new("frames", context).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
