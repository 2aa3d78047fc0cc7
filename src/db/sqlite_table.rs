//! An adapter exposing [`Table`] objects to an embedded SQL engine as
//! virtual tables.
//!
//! The adapter participates in query planning by estimating the cost of
//! constraint sets ([`DbSqliteTable::best_index`]), reorders constraints
//! so that cheap ones run first ([`DbSqliteTable::modify_constraints`])
//! and pushes constraints and orderings down into the column store when
//! a query runs ([`Cursor::filter`]).
//!
//! Besides the callback style protocol used by SQL engines, a two-phase
//! interface is provided: [`DbSqliteTable::plan`] followed by
//! [`Cursor::scan`].

use std::fmt::Debug;
use std::rc::Rc;

use regex::Regex;

use crate::db::Constraint;
use crate::db::FilterOp;
use crate::db::IndexConstraint;
use crate::db::Order;
use crate::db::QueryConstraints;
use crate::db::RowMap;
use crate::db::RuntimeTableRegistry;
use crate::db::Schema;
use crate::db::SharedQueryCache;
use crate::db::SqlType;
use crate::db::SqlValue;
use crate::db::Table;
use crate::db::TableIterator;
use crate::log::debug;
use crate::log::trace;
use crate::util::log2;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


/// The fixed cost of setting up and tearing down a query, in units of
/// rows scanned.
pub const FIXED_QUERY_COST: f64 = 1000.0;
/// The cost of filtering by id equality.
///
/// The filter itself is cheap, but when joining against another table the
/// engine issues one filter call per row, each of which is roughly ten
/// times as expensive as iterating a single row.
pub const ID_EQUALITY_FILTER_COST: f64 = 10.0;
/// The cost of iterating a row relative to filtering it.
pub const ITERATION_COST_FACTOR: f64 = 2.0;
/// The number of consecutive identical filter calls on a cursor after
/// which a sorted projection of the table gets cached.
pub const REPEATED_QUERY_CACHE_THRESHOLD: u32 = 3;


/// The way a [`DbSqliteTable`] obtains the table it queries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TableComputation {
    /// A table that exists for the lifetime of the adapter.
    Static,
    /// A table created at runtime and stored in a
    /// [`RuntimeTableRegistry`].
    Runtime,
    /// A table computed on every query by a [`StaticTableFunction`].
    TableFunction,
}


/// A table-valued function.
///
/// Hidden columns of the function's schema are its arguments. Every
/// argument has to be bound by exactly one equality constraint.
pub trait StaticTableFunction: Debug {
    /// Create the schema of the tables produced by the function.
    fn create_schema(&self) -> Schema;

    /// Estimate the number of rows a computed table has.
    fn estimate_row_count(&self) -> u32;

    /// Compute the table for the provided arguments, in hidden column
    /// order.
    fn compute_table(&self, arguments: &[SqlValue]) -> Result<Rc<dyn Table>>;
}


#[derive(Debug)]
enum Source {
    Static(Rc<dyn Table>),
    Runtime(Rc<RuntimeTableRegistry>),
    TableFunction(Box<dyn StaticTableFunction>),
}


/// Everything needed to create [`DbSqliteTable`] objects for a given
/// table.
#[derive(Debug)]
pub struct DbSqliteTableContext {
    cache: Option<SharedQueryCache>,
    source: Source,
}

impl DbSqliteTableContext {
    /// Create a context for a static table.
    pub fn new_static(cache: Option<SharedQueryCache>, table: Rc<dyn Table>) -> Self {
        Self {
            cache,
            source: Source::Static(table),
        }
    }

    /// Create a context for tables stored in `registry`.
    pub fn new_runtime(
        cache: Option<SharedQueryCache>,
        registry: Rc<RuntimeTableRegistry>,
    ) -> Self {
        Self {
            cache,
            source: Source::Runtime(registry),
        }
    }

    /// Create a context for a table-valued function.
    pub fn new_table_function(
        cache: Option<SharedQueryCache>,
        function: Box<dyn StaticTableFunction>,
    ) -> Self {
        Self {
            cache,
            source: Source::TableFunction(function),
        }
    }

    /// Retrieve the computation strategy of the context.
    pub fn computation(&self) -> TableComputation {
        match self.source {
            Source::Static(..) => TableComputation::Static,
            Source::Runtime(..) => TableComputation::Runtime,
            Source::TableFunction(..) => TableComputation::TableFunction,
        }
    }
}


/// A column as declared to the SQL engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SqliteColumn {
    /// The index of the column in the table's schema.
    pub index: u32,
    /// The column's name.
    pub name: String,
    /// The column's type.
    pub ty: SqlType,
    /// Whether the column is hidden.
    pub hidden: bool,
}


/// A table schema as declared to the SQL engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SqliteSchema {
    /// The columns of the table.
    pub columns: Vec<SqliteColumn>,
    /// The indices of the primary key columns.
    pub primary_keys: Vec<usize>,
}

impl SqliteSchema {
    /// Create the `CREATE TABLE` statement declaring the table to the
    /// engine.
    pub fn to_create_table_stmt(&self) -> String {
        let mut stmt = String::from("CREATE TABLE x(");
        for column in &self.columns {
            stmt.push(' ');
            stmt.push_str(&column.name);
            if column.ty != SqlType::Null {
                stmt.push(' ');
                stmt.push_str(column.ty.as_str());
            }
            stmt.push_str(if column.hidden { " HIDDEN," } else { "," });
        }

        let keys = self
            .primary_keys
            .iter()
            .filter_map(|idx| self.columns.get(*idx))
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        stmt.push_str(" PRIMARY KEY(");
        stmt.push_str(&keys);
        stmt.push_str(")) WITHOUT ROWID;");
        stmt
    }
}


/// The estimated cost of a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryCost {
    /// The abstract cost, in units of rows scanned.
    pub cost: f64,
    /// The estimated number of rows produced.
    pub rows: u32,
}


/// The result of query planning for a constraint set.
#[derive(Clone, Debug, PartialEq)]
pub struct BestIndexInfo {
    /// The estimated cost of the query.
    pub estimated_cost: f64,
    /// The estimated number of rows produced.
    pub estimated_rows: u32,
    /// For each constraint, whether the engine may skip re-checking it
    /// because the adapter applies it itself.
    pub omit_constraint: Vec<bool>,
    /// Whether the engine may skip sorting the output.
    pub omit_order_by: bool,
}


/// Whether a filter call uses the same constraint set as the previous
/// one on the same cursor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterHistory {
    /// The constraint set differs from the previous one.
    Different,
    /// The constraint set is identical to the previous one.
    Same,
}


/// A query planned with [`DbSqliteTable::plan`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    constraints: QueryConstraints,
    /// For each (reordered) constraint, the index of the constraint in
    /// the caller's original constraint list.
    value_order: Vec<usize>,
    info: BestIndexInfo,
}

impl QueryPlan {
    /// Retrieve the reordered constraints and trimmed orderings.
    #[inline]
    pub fn constraints(&self) -> &QueryConstraints {
        &self.constraints
    }

    /// Retrieve the cost estimate and omission information.
    ///
    /// `omit_constraint` is indexed by reordered constraint, see
    /// [`constraints`](Self::constraints).
    #[inline]
    pub fn info(&self) -> &BestIndexInfo {
        &self.info
    }

    /// Check whether the constraint at index `idx` of the caller's
    /// original constraint list is applied by the adapter.
    ///
    /// Constraints that are not applied have to be checked by the caller.
    pub fn is_omitted(&self, idx: usize) -> bool {
        self.value_order
            .iter()
            .position(|orig| *orig == idx)
            .and_then(|pos| self.info.omit_constraint.get(pos))
            .copied()
            .unwrap_or(false)
    }
}


/// Reorder constraints so that cheaper ones are applied first and drop
/// ordering terms that are already satisfied.
///
/// Returns, for each constraint position after reordering, the index it
/// had before.
fn modify_constraints_impl(schema: &Schema, qc: &mut QueryConstraints) -> Vec<usize> {
    let rank = |c: &IndexConstraint| match schema.column(c.column) {
        Some(column) if column.is_id => 0,
        Some(column) if column.is_set_id => 1,
        Some(column) if column.is_sorted => 2,
        _ => 3,
    };

    let original = qc.constraints().to_vec();
    let mut order = (0..original.len()).collect::<Vec<_>>();
    let () = order.sort_by_key(|idx| rank(&original[*idx]));
    *qc.constraints_mut() = order.iter().map(|idx| original[*idx]).collect();

    // Terms on columns pinned by an equality constraint are meaningless.
    let () = qc.order_by_mut().retain(|ob| {
        !original
            .iter()
            .any(|c| c.column == ob.column && c.op.is_eq())
    });

    // Trailing ascending terms on sorted columns are satisfied by the
    // natural order of the table.
    while let Some(ob) = qc.order_by().last().copied() {
        let is_sorted = schema.column(ob.column).is_some_and(|c| c.is_sorted);
        if ob.desc || !is_sorted {
            break
        }
        let _ob = qc.order_by_mut().pop();
    }

    order
}

fn validate_table_function_arguments(
    name: &str,
    schema: &Schema,
    qc: &QueryConstraints,
) -> Result<()> {
    for (idx, column) in schema.columns.iter().enumerate() {
        if !column.is_hidden {
            continue
        }

        let mut constraints = qc
            .constraints()
            .iter()
            .filter(|c| c.column as usize == idx);
        let constraint = constraints.next().ok_or_else(|| {
            Error::with_constraint(format!(
                "failed to find constraint on column `{}` in function {name}",
                column.name
            ))
        })?;

        if !constraint.op.is_eq() {
            return Err(Error::with_constraint(format!(
                "only equality constraints supported on column `{}`",
                column.name
            )))
        }

        if constraints.next().is_some() {
            return Err(Error::with_constraint(format!(
                "found multiple constraints on column `{}` in function {name}",
                column.name
            )))
        }
    }
    Ok(())
}


/// A virtual table adapter over a [`Table`].
#[derive(Debug)]
pub struct DbSqliteTable {
    name: String,
    context: Rc<DbSqliteTableContext>,
    schema: Schema,
    sqlite_schema: SqliteSchema,
    /// The table to query, for static and runtime tables.
    upstream: Option<Rc<dyn Table>>,
}

impl DbSqliteTable {
    /// Create an adapter called `name` for the table described by
    /// `context`.
    ///
    /// For runtime tables, `name` is the name under which the table is
    /// registered.
    pub fn new(name: impl Into<String>, context: Rc<DbSqliteTableContext>) -> Result<Self> {
        let name = name.into();
        let (schema, upstream) = match &context.source {
            Source::Static(table) => (table.schema().clone(), Some(Rc::clone(table))),
            Source::Runtime(registry) => {
                let table = registry
                    .get(&name)
                    .ok_or_not_found(|| format!("runtime table `{name}` does not exist"))?;
                if table.schema().is_empty() {
                    return Err(Error::with_corrupt_input(format!(
                        "runtime table `{name}` has no columns"
                    )))
                }
                (table.schema().clone(), Some(table))
            }
            Source::TableFunction(function) => (function.create_schema(), None),
        };

        let sqlite_schema = Self::compute_schema(&schema, &name)?;
        Ok(Self {
            name,
            context,
            schema,
            sqlite_schema,
            upstream,
        })
    }

    /// Compute the schema to declare to the SQL engine.
    ///
    /// Every table needs to have exactly one id column, which becomes the
    /// primary key.
    pub fn compute_schema(schema: &Schema, table_name: &str) -> Result<SqliteSchema> {
        let columns = schema
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| SqliteColumn {
                index: idx as u32,
                name: column.name.clone(),
                ty: column.ty,
                hidden: column.is_hidden,
            })
            .collect();

        let mut ids = schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_id)
            .map(|(idx, _)| idx);
        let id = ids.next().ok_or_corrupt_input(|| {
            format!("id column not found in {table_name}; all tables need to contain an id column")
        })?;
        if ids.next().is_some() {
            return Err(Error::with_corrupt_input(format!(
                "{table_name} contains more than one id column"
            )))
        }

        Ok(SqliteSchema {
            columns,
            primary_keys: vec![id],
        })
    }

    /// Estimate the cost of running a query with the given constraints
    /// against a table with `row_count` rows.
    pub fn estimate_cost(schema: &Schema, row_count: u32, qc: &QueryConstraints) -> QueryCost {
        // As a rough heuristic, assume that an equality or range
        // constraint cuts down the number of rows by about double the
        // logarithm of their count.
        fn narrow(rows: u32) -> u32 {
            ((f64::from(rows) / (2.0 * log2(rows))) as u32).max(1)
        }

        // If the table is empty, any constraint set only pays the fixed
        // cost and we know for sure that no rows will be returned.
        if row_count == 0 {
            return QueryCost {
                cost: FIXED_QUERY_COST,
                rows: 0,
            }
        }

        // The estimated row count stays at least one unless we are certain
        // that no rows will be produced.
        let mut rows = row_count;
        let mut filter_cost = 0.0;
        let constraints = qc.constraints();

        for c in constraints {
            if rows < 2 {
                break
            }

            let (is_id, is_sorted) = schema
                .column(c.column)
                .map(|column| (column.is_id, column.is_sorted))
                .unwrap_or((false, false));

            if c.op.is_eq() && is_id {
                // Small tables would otherwise make a binary search on any
                // other column look cheaper than an id lookup.
                filter_cost += ID_EQUALITY_FILTER_COST.min(log2(rows) / 2.0);
                rows = 1;
            } else if c.op.is_eq() {
                // A single equality constraint gets served from a sorted
                // projection once repeated often enough.
                filter_cost += if constraints.len() == 1 || is_sorted {
                    log2(rows)
                } else {
                    f64::from(rows)
                };
                rows = narrow(rows);
            } else if is_sorted && c.op.is_range() {
                filter_cost += log2(rows);
                rows = narrow(rows);
            } else {
                filter_cost += f64::from(rows);
                rows = (rows / 2).max(1);
            }
        }

        let sort_cost = qc.order_by().len() as f64 * f64::from(rows) * log2(rows);
        let iteration_cost = f64::from(rows) * ITERATION_COST_FACTOR;

        QueryCost {
            cost: FIXED_QUERY_COST + filter_cost + sort_cost + iteration_cost,
            rows,
        }
    }

    /// Compute planning information for a table with the given schema
    /// and row count.
    pub fn best_index_for(schema: &Schema, row_count: u32, qc: &QueryConstraints) -> BestIndexInfo {
        let QueryCost { cost, rows } = Self::estimate_cost(schema, row_count, qc);
        let omit_constraint = qc
            .constraints()
            .iter()
            .map(|c| c.op.to_filter_op().is_some())
            .collect();

        BestIndexInfo {
            estimated_cost: cost,
            estimated_rows: rows,
            omit_constraint,
            // We can sort on any column correctly.
            omit_order_by: true,
        }
    }

    fn check_columns(&self, qc: &QueryConstraints) -> Result<()> {
        let columns = qc
            .constraints()
            .iter()
            .map(|c| c.column)
            .chain(qc.order_by().iter().map(|ob| ob.column));
        for column in columns {
            let _column = self.schema.column(column).ok_or_invalid_input(|| {
                format!("column index {column} out of bounds for table {}", self.name)
            })?;
        }
        Ok(())
    }

    /// Compute planning information for the provided constraint set.
    ///
    /// For table functions, an error of kind
    /// [`ErrorKind::Constraint`][crate::ErrorKind::Constraint] is
    /// reported if not every argument is bound by exactly one equality
    /// constraint.
    pub fn best_index(&self, qc: &QueryConstraints) -> Result<BestIndexInfo> {
        let () = self.check_columns(qc)?;

        let row_count = match &self.context.source {
            Source::Static(..) | Source::Runtime(..) => {
                self.upstream.as_ref().map_or(0, |table| table.row_count())
            }
            Source::TableFunction(function) => {
                let () = validate_table_function_arguments(&self.name, &self.schema, qc)?;
                function.estimate_row_count()
            }
        };

        let info = Self::best_index_for(&self.schema, row_count, qc);
        debug!(
            "{}: estimated cost {} for {} rows of {row_count}",
            self.name, info.estimated_cost, info.estimated_rows
        );
        Ok(info)
    }

    /// Reorder the constraints of `qc` so that cheap ones come first and
    /// remove ordering terms the table satisfies anyway.
    ///
    /// Constraints on id columns come first, followed by ones on set id
    /// columns and then ones on sorted columns. Ordering terms on columns
    /// constrained by equality are removed, as are trailing ascending
    /// terms on sorted columns.
    pub fn modify_constraints(&self, qc: &mut QueryConstraints) {
        let _order = modify_constraints_impl(&self.schema, qc);
    }

    /// Plan a query: rewrite the constraints and estimate the cost.
    ///
    /// Values for the query have to be provided to [`Cursor::scan`] in
    /// the order of the constraints in `qc`.
    pub fn plan(&self, qc: &QueryConstraints) -> Result<QueryPlan> {
        let () = self.check_columns(qc)?;
        let mut constraints = qc.clone();
        let value_order = modify_constraints_impl(&self.schema, &mut constraints);
        let info = self.best_index(&constraints)?;
        Ok(QueryPlan {
            constraints,
            value_order,
            info,
        })
    }

    /// Create a cursor for running queries against the table.
    pub fn create_cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Retrieve the adapter's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retrieve the schema of the adapted table.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Retrieve the schema as declared to the SQL engine.
    #[inline]
    pub fn sqlite_schema(&self) -> &SqliteSchema {
        &self.sqlite_schema
    }

    /// Retrieve the computation strategy.
    #[inline]
    pub fn computation(&self) -> TableComputation {
        self.context.computation()
    }
}

impl Drop for DbSqliteTable {
    fn drop(&mut self) {
        if let Source::Runtime(registry) = &self.context.source {
            debug!("erasing runtime table `{}`", self.name);
            let _table = registry.drop_table(&self.name);
        }
    }
}


#[derive(Debug)]
enum Mode {
    /// The query selected at most a single row.
    SingleRow(Option<u32>),
    Table(TableIterator),
}


/// A cursor running queries against a [`DbSqliteTable`].
#[derive(Debug)]
pub struct Cursor<'table> {
    table: &'table DbSqliteTable,
    cache: Option<SharedQueryCache>,
    /// The table to filter. For table functions, this is the table
    /// computed by the most recent filter call.
    upstream: Option<Rc<dyn Table>>,
    /// A sorted projection of `upstream`, if one is available for the
    /// current constraint set.
    sorted_cache_table: Option<Rc<dyn Table>>,
    argument_index_per_column: Vec<Option<usize>>,
    table_function_arguments: Vec<SqlValue>,
    constraints: Vec<Constraint>,
    orders: Vec<Order>,
    repeated_cache_count: u32,
    last_query: Option<QueryConstraints>,
    mode: Mode,
    eof: bool,
}

impl<'table> Cursor<'table> {
    fn new(table: &'table DbSqliteTable) -> Self {
        let (argument_index_per_column, argument_count) = match table.computation() {
            TableComputation::Static | TableComputation::Runtime => {
                (vec![None; table.schema.len()], 0)
            }
            TableComputation::TableFunction => {
                let mut count = 0;
                let indices = table
                    .schema
                    .columns
                    .iter()
                    .map(|column| {
                        column.is_hidden.then(|| {
                            count += 1;
                            count - 1
                        })
                    })
                    .collect();
                (indices, count)
            }
        };

        Self {
            table,
            cache: table.context.cache.clone(),
            upstream: table.upstream.clone(),
            sorted_cache_table: None,
            argument_index_per_column,
            table_function_arguments: vec![SqlValue::Null; argument_count],
            constraints: Vec::new(),
            orders: Vec::new(),
            repeated_cache_count: 0,
            last_query: None,
            mode: Mode::SingleRow(None),
            eof: true,
        }
    }

    fn source_table(&self) -> Option<&Rc<dyn Table>> {
        self.sorted_cache_table.as_ref().or(self.upstream.as_ref())
    }

    fn try_cache_create_sorted_table(&mut self, qc: &QueryConstraints, history: FilterHistory) {
        // Caching can be disabled by not providing a cache.
        let Some(cache) = &self.cache else { return };
        let Some(upstream) = &self.upstream else {
            return
        };

        if history == FilterHistory::Different {
            self.repeated_cache_count = 0;
            // Another cursor may have cached the new constraint set.
            self.sorted_cache_table = cache.borrow().get_if_cached(upstream, qc.constraints());
            return
        }

        if self.sorted_cache_table.is_some() {
            return
        }

        self.repeated_cache_count += 1;
        // The counter tracks repeats, so the query currently running is
        // one more than that.
        if self.repeated_cache_count + 1 != REPEATED_QUERY_CACHE_THRESHOLD {
            return
        }

        // Only a single equality constraint can be served from a table
        // sorted by the constrained column.
        let [c] = qc.constraints() else { return };
        if !c.op.is_eq() {
            return
        }

        let is_sorted = self
            .table
            .schema
            .column(c.column)
            .map_or(true, |column| column.is_sorted);
        if is_sorted {
            return
        }

        let order = Order {
            col_idx: c.column,
            desc: false,
        };
        let table = cache
            .borrow_mut()
            .get_or_cache(upstream, qc.constraints(), || upstream.sort(&[order]));
        self.sorted_cache_table = Some(table);
    }

    fn populate_constraints_and_arguments(
        &mut self,
        qc: &QueryConstraints,
        argv: &[SqlValue],
    ) -> Result<()> {
        let () = self.constraints.clear();
        let () = self
            .table_function_arguments
            .iter_mut()
            .for_each(|arg| *arg = SqlValue::Null);

        for (c, value) in qc.constraints().iter().zip(argv) {
            // Constraints we can't filter on ourselves are left to the
            // engine.
            let Some(op) = c.op.to_filter_op() else {
                continue
            };

            if op == FilterOp::Regex {
                let pattern = value
                    .as_str()
                    .ok_or_invalid_input(|| "value has to be a string")?;
                let _regex = Regex::new(pattern).map_err(|err| {
                    Error::with_invalid_input(format!("invalid regular expression `{pattern}`: {err}"))
                })?;
            }

            let argument = self
                .argument_index_per_column
                .get(c.column as usize)
                .ok_or_invalid_input(|| format!("column index {} out of bounds", c.column))?;
            if let Some(idx) = argument {
                if let Some(arg) = self.table_function_arguments.get_mut(*idx) {
                    *arg = value.clone();
                }
            } else {
                let () = self.constraints.push(Constraint {
                    col_idx: c.column,
                    op,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    fn populate_order_bys(&mut self, qc: &QueryConstraints) {
        self.orders = qc
            .order_by()
            .iter()
            .map(|ob| Order {
                col_idx: ob.column,
                desc: ob.desc,
            })
            .collect();
    }

    fn column_name(&self, col: u32) -> &str {
        self.table
            .schema
            .column(col)
            .map(|column| column.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Create a human readable description of the current filter.
    fn describe_filter(&self) -> String {
        let constraints = self
            .constraints
            .iter()
            .map(|c| {
                let name = self.column_name(c.col_idx);
                match c.op {
                    FilterOp::IsNull | FilterOp::IsNotNull => format!("{name} {}", c.op.as_str()),
                    op => format!("{name} {} {}", op.as_str(), c.value),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let orders = self
            .orders
            .iter()
            .map(|o| {
                let name = self.column_name(o.col_idx);
                if o.desc {
                    format!("{name} desc")
                } else {
                    name.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}: filter [{constraints}] order by [{orders}]",
            self.table.name
        )
    }

    /// Run a query.
    ///
    /// `argv` contains one value per constraint of `qc`. `history`
    /// reports whether `qc` is identical to the constraint set of the
    /// previous filter call on this cursor.
    pub fn filter(
        &mut self,
        qc: &QueryConstraints,
        argv: &[SqlValue],
        history: FilterHistory,
    ) -> Result<()> {
        // Release the previous iterator before anything else.
        self.mode = Mode::SingleRow(None);
        self.eof = true;

        if argv.len() != qc.constraints().len() {
            return Err(Error::with_invalid_input(format!(
                "{} values provided for {} constraints",
                argv.len(),
                qc.constraints().len()
            )))
        }

        let () = self.populate_constraints_and_arguments(qc, argv)?;
        let () = self.populate_order_bys(qc);
        self.last_query = Some(qc.clone());

        let table = self.table;
        match &table.context.source {
            Source::Static(..) | Source::Runtime(..) => {
                let () = self.try_cache_create_sorted_table(qc, history);
            }
            Source::TableFunction(function) => {
                trace!("{}: computing table function", table.name);
                let computed = function
                    .compute_table(&self.table_function_arguments)
                    .with_context(|| format!("{}: failed to compute table", table.name))?;
                self.upstream = Some(computed);
            }
        }

        let source = self
            .source_table()
            .cloned()
            .ok_or_not_found(|| format!("{}: no table to query", self.table.name))?;
        debug!("{}", self.describe_filter());

        let rows = source
            .query_to_row_map(&self.constraints, &self.orders)
            .with_context(|| format!("{}: failed to filter table", self.table.name))?;
        // Queries narrowing down to a single row, such as id joins, are
        // served without an iterator.
        if let RowMap::Range(range) = &rows {
            if range.len() <= 1 {
                let row = rows.get(0);
                self.eof = row.is_none();
                self.mode = Mode::SingleRow(row);
                return Ok(())
            }
        }

        let iter = source.apply_and_iterate_rows(rows);
        self.eof = iter.is_eof();
        self.mode = Mode::Table(iter);
        Ok(())
    }

    /// Advance to the next row.
    pub fn next(&mut self) {
        match &mut self.mode {
            Mode::SingleRow(..) => self.eof = true,
            Mode::Table(iter) => {
                let () = iter.advance();
                self.eof = iter.is_eof();
            }
        }
    }

    /// Check whether all rows have been consumed.
    #[inline]
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Retrieve the value of column `col` of the current row.
    pub fn column(&self, col: u32) -> Option<SqlValue> {
        if self.eof {
            return None
        }

        match &self.mode {
            Mode::SingleRow(row) => {
                let row = (*row)?;
                Some(self.source_table()?.cell(row, col))
            }
            Mode::Table(iter) => iter.cell(col),
        }
    }

    /// Run a query planned with [`DbSqliteTable::plan`].
    ///
    /// `values` contains one value per constraint of the query, in the
    /// order the constraints were provided to `plan`. The returned
    /// iterator produces one value per schema column for each row.
    /// Constraints the plan does not report as omitted are not applied
    /// and have to be checked by the caller.
    pub fn scan(&mut self, plan: &QueryPlan, values: &[SqlValue]) -> Result<Rows<'_, 'table>> {
        if values.len() != plan.value_order.len() {
            return Err(Error::with_invalid_input(format!(
                "{} values provided for {} constraints",
                values.len(),
                plan.value_order.len()
            )))
        }

        let argv = plan
            .value_order
            .iter()
            .map(|idx| values[*idx].clone())
            .collect::<Vec<_>>();
        let history = if self.last_query.as_ref() == Some(&plan.constraints) {
            FilterHistory::Same
        } else {
            FilterHistory::Different
        };

        let () = self.filter(&plan.constraints, &argv, history)?;
        Ok(Rows { cursor: self })
    }
}


/// An iterator over the rows produced by [`Cursor::scan`].
#[derive(Debug)]
pub struct Rows<'cursor, 'table> {
    cursor: &'cursor mut Cursor<'table>,
}

impl Iterator for Rows<'_, '_> {
    type Item = Vec<SqlValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.eof() {
            return None
        }

        let count = self.cursor.table.schema.len() as u32;
        let row = (0..count)
            .map(|col| self.cursor.column(col).unwrap_or(SqlValue::Null))
            .collect();
        let () = self.cursor.next();
        Some(row)
    }
}
