//! Columnar tables and their adapter to an embedded SQL engine.

mod query_cache;
mod query_constraints;
mod runtime;
mod sqlite_table;
mod table;
mod value;

pub use query_cache::QueryCache;
pub use query_cache::SharedQueryCache;
pub use query_constraints::ConstraintOp;
pub use query_constraints::IndexConstraint;
pub use query_constraints::OrderBy;
pub use query_constraints::QueryConstraints;
pub use runtime::RuntimeTableRegistry;
pub use sqlite_table::BestIndexInfo;
pub use sqlite_table::Cursor;
pub use sqlite_table::DbSqliteTable;
pub use sqlite_table::DbSqliteTableContext;
pub use sqlite_table::FilterHistory;
pub use sqlite_table::QueryCost;
pub use sqlite_table::QueryPlan;
pub use sqlite_table::Rows;
pub use sqlite_table::SqliteColumn;
pub use sqlite_table::SqliteSchema;
pub use sqlite_table::StaticTableFunction;
pub use sqlite_table::TableComputation;
pub use sqlite_table::FIXED_QUERY_COST;
pub use sqlite_table::ID_EQUALITY_FILTER_COST;
pub use sqlite_table::ITERATION_COST_FACTOR;
pub use sqlite_table::REPEATED_QUERY_CACHE_THRESHOLD;
pub use table::ColumnSchema;
pub use table::ColumnTable;
pub use table::ColumnTableBuilder;
pub use table::Constraint;
pub use table::FilterOp;
pub use table::Order;
pub use table::RowMap;
pub use table::Schema;
pub use table::Table;
pub use table::TableIterator;
pub use value::SqlType;
pub use value::SqlValue;
