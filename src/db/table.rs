use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::Range;
use std::rc::Rc;

use regex::Regex;

use crate::db::SqlType;
use crate::db::SqlValue;
use crate::Error;
use crate::IntoError as _;
use crate::Result;


/// The description of a single column of a [`Table`].
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    /// The column's name.
    pub name: String,
    /// The type of values stored in the column (`NULL` aside).
    pub ty: SqlType,
    /// Whether the column holds the table's row identity.
    pub is_id: bool,
    /// Whether values of the column are sorted in ascending order.
    pub is_sorted: bool,
    /// Whether the column is hidden from `SELECT *` style queries.
    pub is_hidden: bool,
    /// Whether the column holds a "set id", i.e., the id of the first
    /// row of a run of rows sharing the same value.
    pub is_set_id: bool,
}

impl ColumnSchema {
    /// Create a new plain column.
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_id: false,
            is_sorted: false,
            is_hidden: false,
            is_set_id: false,
        }
    }

    /// Create an id column. Id columns are always sorted.
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            is_id: true,
            is_sorted: true,
            ..Self::new(name, SqlType::Long)
        }
    }

    /// Mark the column as sorted.
    pub fn sorted(mut self) -> Self {
        self.is_sorted = true;
        self
    }

    /// Mark the column as hidden.
    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    /// Mark the column as a set id column. Set ids are sorted by
    /// construction.
    pub fn set_id(mut self) -> Self {
        self.is_set_id = true;
        self.is_sorted = true;
        self
    }
}


/// The schema of a [`Table`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    /// The table's columns, in order.
    pub columns: Vec<ColumnSchema>,
}

impl Schema {
    /// Create a new schema from a list of columns.
    #[inline]
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    /// Retrieve the column at index `col`.
    #[inline]
    pub fn column(&self, col: u32) -> Option<&ColumnSchema> {
        self.columns.get(col as usize)
    }

    /// Look up the index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .map(|idx| idx as u32)
    }

    /// Retrieve the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the schema has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}


/// A filter operation understood by the column store.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `GLOB`, with the usual `*`, `?` and `[...]` wildcards.
    Glob,
    /// `REGEXP`
    Regex,
}

impl FilterOp {
    /// Retrieve the SQL spelling of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::Glob => "GLOB",
            Self::Regex => "REGEXP",
        }
    }
}


/// A constraint on a single column.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    /// The index of the constrained column.
    pub col_idx: u32,
    /// The comparison to perform.
    pub op: FilterOp,
    /// The value to compare against. Unused by `IS [NOT] NULL`.
    pub value: SqlValue,
}


/// An ordering on a single column.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Order {
    /// The index of the column to order by.
    pub col_idx: u32,
    /// Whether to order descending.
    pub desc: bool,
}


/// A selection of rows of a table, in iteration order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RowMap {
    /// A contiguous range of rows.
    Range(Range<u32>),
    /// An explicit list of row indices.
    Index(Vec<u32>),
}

impl RowMap {
    /// Check whether the selection is a contiguous range.
    #[inline]
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(..))
    }

    /// Retrieve the number of selected rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Range(range) => range.len(),
            Self::Index(indices) => indices.len(),
        }
    }

    /// Check whether no rows are selected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the `idx`th selected row.
    pub fn get(&self, idx: usize) -> Option<u32> {
        match self {
            Self::Range(range) => range.clone().nth(idx),
            Self::Index(indices) => indices.get(idx).copied(),
        }
    }

    /// Iterate over the selected rows.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let (range, indices) = match self {
            Self::Range(range) => (range.clone(), [].as_slice()),
            Self::Index(indices) => (0..0, indices.as_slice()),
        };
        range.chain(indices.iter().copied())
    }

    fn filter<F>(self, mut f: F) -> Self
    where
        F: FnMut(u32) -> bool,
    {
        Self::Index(self.iter().filter(|row| f(*row)).collect())
    }

    fn into_indices(self) -> Vec<u32> {
        match self {
            Self::Range(range) => range.collect(),
            Self::Index(indices) => indices,
        }
    }
}


/// The interface of a queryable, columnar table.
pub trait Table: Debug {
    /// Retrieve the table's schema.
    fn schema(&self) -> &Schema;

    /// Retrieve the number of rows in the table.
    fn row_count(&self) -> u32;

    /// Retrieve the value stored at `row` in column `col`.
    ///
    /// Out of bounds accesses produce `NULL`.
    fn cell(&self, row: u32, col: u32) -> SqlValue;

    /// Compute the rows matching all `constraints`, ordered by `orders`.
    fn query_to_row_map(&self, constraints: &[Constraint], orders: &[Order]) -> Result<RowMap>;

    /// Create a copy of the table with rows ordered by `orders`.
    ///
    /// If the first ordering is ascending, the resulting table reports
    /// the corresponding column as sorted. No other column is reported
    /// sorted.
    fn sort(&self, orders: &[Order]) -> Rc<dyn Table>;

    /// Create an iterator over the given selection of rows.
    fn apply_and_iterate_rows(self: Rc<Self>, rows: RowMap) -> TableIterator;
}


/// A cursor over a selection of rows of a [`Table`].
#[derive(Debug)]
pub struct TableIterator {
    table: Rc<dyn Table>,
    rows: RowMap,
    pos: usize,
}

impl TableIterator {
    /// Create a new iterator positioned at the first row of `rows`.
    pub fn new(table: Rc<dyn Table>, rows: RowMap) -> Self {
        Self {
            table,
            rows,
            pos: 0,
        }
    }

    /// Retrieve the table row the iterator currently points to.
    #[inline]
    pub fn row(&self) -> Option<u32> {
        self.rows.get(self.pos)
    }

    /// Check whether the iterator is exhausted.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    /// Move to the next row.
    #[inline]
    pub fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    /// Retrieve the value of column `col` in the current row.
    pub fn cell(&self, col: u32) -> Option<SqlValue> {
        let row = self.row()?;
        Some(self.table.cell(row, col))
    }
}


/// Translate a SQL `GLOB` pattern into an anchored regular expression.
pub(crate) fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let () = out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut raw = String::from("[");
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'^') {
                    let _caret = chars.next();
                    raw.push('^');
                    class.push('^');
                }
                // A leading `]` is part of the class.
                if chars.peek() == Some(&']') {
                    let _bracket = chars.next();
                    raw.push(']');
                    class.push_str("\\]");
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break
                    }
                    raw.push(c);
                    if matches!(c, '\\' | '[' | '&' | '~') {
                        class.push('\\');
                    }
                    class.push(c);
                }

                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    // An unterminated class matches literally.
                    out.push_str(&regex::escape(&raw));
                }
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    let () = out.push('$');
    out
}


/// A compiled form of a [`Constraint`] used for linear scans.
enum Matcher<'value> {
    Compare(FilterOp, &'value SqlValue),
    IsNull,
    IsNotNull,
    Regex(Regex),
}

impl<'value> Matcher<'value> {
    fn new(constraint: &'value Constraint) -> Result<Self> {
        let matcher = match constraint.op {
            FilterOp::IsNull => Self::IsNull,
            FilterOp::IsNotNull => Self::IsNotNull,
            op @ (FilterOp::Glob | FilterOp::Regex) => {
                let pattern = constraint.value.as_str().ok_or_invalid_input(|| {
                    format!(
                        "{} requires a string pattern; got `{}`",
                        op.as_str(),
                        constraint.value
                    )
                })?;
                let expr = if op == FilterOp::Glob {
                    glob_to_regex(pattern)
                } else {
                    pattern.to_string()
                };
                let regex = Regex::new(&expr).map_err(|err| {
                    Error::with_invalid_input(format!(
                        "invalid {} pattern `{pattern}`: {err}",
                        op.as_str()
                    ))
                })?;
                Self::Regex(regex)
            }
            op => Self::Compare(op, &constraint.value),
        };
        Ok(matcher)
    }

    fn matches(&self, value: &SqlValue) -> bool {
        match self {
            Self::IsNull => value.is_null(),
            Self::IsNotNull => !value.is_null(),
            Self::Regex(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
            Self::Compare(op, other) => {
                // Any comparison involving NULL is itself NULL and, hence,
                // does not match.
                if value.is_null() || other.is_null() {
                    return false
                }

                let ordering = value.total_cmp(other);
                match op {
                    FilterOp::Eq => ordering == Ordering::Equal,
                    FilterOp::Ne => ordering != Ordering::Equal,
                    FilterOp::Lt => ordering == Ordering::Less,
                    FilterOp::Le => ordering != Ordering::Greater,
                    FilterOp::Gt => ordering == Ordering::Greater,
                    FilterOp::Ge => ordering != Ordering::Less,
                    FilterOp::IsNull | FilterOp::IsNotNull | FilterOp::Glob | FilterOp::Regex => {
                        false
                    }
                }
            }
        }
    }
}


/// Narrow `range` of a sorted column down to the rows satisfying the
/// comparison, using binary search.
///
/// `None` is returned if `op` cannot be answered this way.
fn search_sorted(
    column: &[SqlValue],
    range: &Range<u32>,
    op: FilterOp,
    value: &SqlValue,
) -> Option<Range<u32>> {
    let slice = column.get(range.start as usize..range.end as usize)?;
    let nulls = slice.partition_point(SqlValue::is_null);
    let lower = slice.partition_point(|v| v.total_cmp(value) == Ordering::Less);
    let upper = slice.partition_point(|v| v.total_cmp(value) != Ordering::Greater);

    let (start, end) = match op {
        FilterOp::Eq => (lower, upper),
        FilterOp::Lt => (nulls, lower),
        FilterOp::Le => (nulls, upper),
        FilterOp::Gt => (upper, slice.len()),
        FilterOp::Ge => (lower, slice.len()),
        FilterOp::Ne
        | FilterOp::IsNull
        | FilterOp::IsNotNull
        | FilterOp::Glob
        | FilterOp::Regex => return None,
    };
    Some(range.start + start as u32..range.start + end.max(start) as u32)
}


/// An in-memory, column oriented [`Table`].
#[derive(Clone, Debug)]
pub struct ColumnTable {
    schema: Schema,
    columns: Vec<Vec<SqlValue>>,
    row_count: u32,
}

impl ColumnTable {
    /// Create a builder for a table with the provided schema.
    #[inline]
    pub fn builder(schema: Schema) -> ColumnTableBuilder {
        ColumnTableBuilder::new(schema)
    }

    fn column(&self, col: u32) -> Result<&[SqlValue]> {
        self.columns
            .get(col as usize)
            .map(Vec::as_slice)
            .ok_or_invalid_input(|| {
                format!(
                    "column index {col} out of bounds for table with {} columns",
                    self.columns.len()
                )
            })
    }

    fn compare_rows(&self, a: u32, b: u32, orders: &[Order]) -> Ordering {
        for order in orders {
            let Some(column) = self.columns.get(order.col_idx as usize) else {
                continue
            };
            let ordering = column[a as usize].total_cmp(&column[b as usize]);
            let ordering = if order.desc {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering
            }
        }
        Ordering::Equal
    }
}

impl Table for ColumnTable {
    #[inline]
    fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    fn row_count(&self) -> u32 {
        self.row_count
    }

    fn cell(&self, row: u32, col: u32) -> SqlValue {
        self.columns
            .get(col as usize)
            .and_then(|column| column.get(row as usize))
            .cloned()
            .unwrap_or(SqlValue::Null)
    }

    fn query_to_row_map(&self, constraints: &[Constraint], orders: &[Order]) -> Result<RowMap> {
        let mut rows = RowMap::Range(0..self.row_count);

        for constraint in constraints {
            let column = self.column(constraint.col_idx)?;
            let is_sorted = self
                .schema
                .column(constraint.col_idx)
                .is_some_and(|schema| schema.is_sorted);

            let sorted_range = match &rows {
                RowMap::Range(range) if is_sorted && !constraint.value.is_null() => {
                    search_sorted(column, range, constraint.op, &constraint.value)
                }
                _ => None,
            };

            rows = if let Some(range) = sorted_range {
                RowMap::Range(range)
            } else {
                let matcher = Matcher::new(constraint)?;
                rows.filter(|row| matcher.matches(&column[row as usize]))
            };
        }

        if !orders.is_empty() {
            for order in orders {
                let _column = self.column(order.col_idx)?;
            }

            let mut indices = rows.into_indices();
            let () = indices.sort_by(|a, b| self.compare_rows(*a, *b, orders));
            rows = RowMap::Index(indices);
        }
        Ok(rows)
    }

    fn sort(&self, orders: &[Order]) -> Rc<dyn Table> {
        let mut indices = (0..self.row_count).collect::<Vec<_>>();
        let () = indices.sort_by(|a, b| self.compare_rows(*a, *b, orders));

        let columns = self
            .columns
            .iter()
            .map(|column| {
                indices
                    .iter()
                    .map(|row| column[*row as usize].clone())
                    .collect()
            })
            .collect();

        let mut schema = self.schema.clone();
        let () = schema
            .columns
            .iter_mut()
            .for_each(|column| column.is_sorted = false);
        if let Some(order) = orders.first() {
            if let Some(column) = schema.columns.get_mut(order.col_idx as usize) {
                column.is_sorted = !order.desc;
            }
        }

        Rc::new(Self {
            schema,
            columns,
            row_count: self.row_count,
        })
    }

    #[inline]
    fn apply_and_iterate_rows(self: Rc<Self>, rows: RowMap) -> TableIterator {
        TableIterator::new(self, rows)
    }
}


/// A builder for [`ColumnTable`] objects.
#[derive(Debug)]
pub struct ColumnTableBuilder {
    schema: Schema,
    columns: Vec<Vec<SqlValue>>,
}

impl ColumnTableBuilder {
    fn new(schema: Schema) -> Self {
        let columns = schema.columns.iter().map(|_| Vec::new()).collect();
        Self { schema, columns }
    }

    /// Append a row. `row` has to provide exactly one value per column.
    pub fn push_row(&mut self, row: Vec<SqlValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::with_invalid_input(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )))
        }

        let () = self
            .columns
            .iter_mut()
            .zip(row)
            .for_each(|(column, value)| column.push(value));
        Ok(())
    }

    /// Finish building the table.
    ///
    /// Columns marked sorted are checked to actually be sorted.
    pub fn build(self) -> Result<ColumnTable> {
        let Self { schema, columns } = self;

        for (column, values) in schema.columns.iter().zip(&columns) {
            if column.is_sorted {
                let unsorted = values
                    .windows(2)
                    .any(|pair| pair[0].total_cmp(&pair[1]) == Ordering::Greater);
                if unsorted {
                    return Err(Error::with_invalid_data(format!(
                        "column `{}` is declared sorted but is not",
                        column.name
                    )))
                }
            }
        }

        let row_count = columns.first().map(Vec::len).unwrap_or(0);
        let row_count = u32::try_from(row_count).map_err(|_| {
            Error::with_invalid_input(format!("table with {row_count} rows is too large"))
        })?;

        Ok(ColumnTable {
            schema,
            columns,
            row_count,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use crate::ErrorKind;

    use test_log::test;


    const ID: u32 = 0;
    const NAME: u32 = 1;
    const VALUE: u32 = 2;
    const TS: u32 = 3;

    fn table() -> ColumnTable {
        let schema = Schema::new(vec![
            ColumnSchema::id("id"),
            ColumnSchema::new("name", SqlType::String),
            ColumnSchema::new("value", SqlType::Long),
            ColumnSchema::new("ts", SqlType::Long).sorted(),
        ]);
        let rows = [
            ("main", Some(30), None),
            ("foo", Some(10), Some(100)),
            ("foo_bar", None, Some(100)),
            ("bar", Some(20), Some(200)),
            ("baz", Some(10), Some(300)),
        ];

        let mut builder = ColumnTable::builder(schema);
        for (id, (name, value, ts)) in rows.into_iter().enumerate() {
            let row = vec![
                SqlValue::from(id as i64),
                SqlValue::from(name),
                SqlValue::from(value.map(i64::from)),
                SqlValue::from(ts.map(i64::from)),
            ];
            let () = builder.push_row(row).unwrap();
        }
        builder.build().unwrap()
    }

    fn eq(col_idx: u32, op: FilterOp, value: impl Into<SqlValue>) -> Constraint {
        Constraint {
            col_idx,
            op,
            value: value.into(),
        }
    }

    /// Check that constraints on sorted columns produce contiguous row
    /// ranges.
    #[test]
    fn sorted_column_search() {
        let table = table();

        let rows = table
            .query_to_row_map(&[eq(TS, FilterOp::Eq, 100i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Range(1..3));

        let rows = table
            .query_to_row_map(&[eq(TS, FilterOp::Lt, 200i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Range(1..3));

        let rows = table
            .query_to_row_map(&[eq(TS, FilterOp::Ge, 200i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Range(3..5));

        let rows = table
            .query_to_row_map(&[eq(TS, FilterOp::Gt, 300i64)], &[])
            .unwrap();
        assert!(rows.is_empty());

        let rows = table
            .query_to_row_map(&[eq(ID, FilterOp::Eq, 4i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Range(4..5));
    }

    /// Check that constraints on unsorted columns scan the table.
    #[test]
    fn unsorted_column_scan() {
        let table = table();

        let rows = table
            .query_to_row_map(&[eq(VALUE, FilterOp::Eq, 10i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![1, 4]));

        // NULL never compares equal or unequal.
        let rows = table
            .query_to_row_map(&[eq(VALUE, FilterOp::Ne, 10i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![0, 3]));

        let rows = table
            .query_to_row_map(&[eq(VALUE, FilterOp::IsNull, SqlValue::Null)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![2]));

        let rows = table
            .query_to_row_map(
                &[
                    eq(TS, FilterOp::Ge, 100i64),
                    eq(VALUE, FilterOp::IsNotNull, SqlValue::Null),
                ],
                &[],
            )
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![1, 3, 4]));
    }

    /// Exercise `GLOB` and `REGEXP` filtering.
    #[test]
    fn pattern_filtering() {
        let table = table();

        let rows = table
            .query_to_row_map(&[eq(NAME, FilterOp::Glob, "foo*")], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![1, 2]));

        let rows = table
            .query_to_row_map(&[eq(NAME, FilterOp::Glob, "ba?")], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![3, 4]));

        let rows = table
            .query_to_row_map(&[eq(NAME, FilterOp::Glob, "ba[^r]")], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![4]));

        let rows = table
            .query_to_row_map(&[eq(NAME, FilterOp::Regex, "^ba")], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Index(vec![3, 4]));

        let err = table
            .query_to_row_map(&[eq(NAME, FilterOp::Regex, "(unclosed")], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    /// Check that GLOB patterns are translated properly.
    #[test]
    fn glob_translation() {
        assert_eq!(glob_to_regex("a*b?"), "(?s)^a.*b.$");
        assert_eq!(glob_to_regex("a.b"), "(?s)^a\\.b$");
        assert_eq!(glob_to_regex("[^a-c]"), "(?s)^[^a-c]$");

        let regex = Regex::new(&glob_to_regex("[]x]")).unwrap();
        assert!(regex.is_match("]"));
        assert!(regex.is_match("x"));
        assert!(!regex.is_match("y"));

        let regex = Regex::new(&glob_to_regex("[abc")).unwrap();
        assert!(regex.is_match("[abc"));
    }

    /// Check that results honor the requested order.
    #[test]
    fn ordering() {
        let table = table();
        let orders = [
            Order {
                col_idx: VALUE,
                desc: true,
            },
            Order {
                col_idx: ID,
                desc: false,
            },
        ];
        let rows = table.query_to_row_map(&[], &orders).unwrap();
        assert_eq!(rows, RowMap::Index(vec![0, 3, 1, 4, 2]));
    }

    /// Make sure that sorting a table flags the right column as sorted.
    #[test]
    fn sort_table() {
        let table = table();
        let sorted = table.sort(&[Order {
            col_idx: VALUE,
            desc: false,
        }]);

        let flags = sorted
            .schema()
            .columns
            .iter()
            .map(|column| column.is_sorted)
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![false, false, true, false]);
        assert_eq!(sorted.cell(0, VALUE), SqlValue::Null);
        assert_eq!(sorted.cell(1, NAME), SqlValue::from("foo"));
        assert_eq!(sorted.cell(2, NAME), SqlValue::from("baz"));

        let rows = sorted
            .query_to_row_map(&[eq(VALUE, FilterOp::Eq, 10i64)], &[])
            .unwrap();
        assert_eq!(rows, RowMap::Range(1..3));

        let sorted = table.sort(&[Order {
            col_idx: VALUE,
            desc: true,
        }]);
        assert!(sorted.schema().columns.iter().all(|column| !column.is_sorted));
    }

    /// Check that we can iterate over a row selection.
    #[test]
    fn iterate_rows() {
        let table = Rc::new(table());
        let mut it = table.apply_and_iterate_rows(RowMap::Index(vec![3, 1]));
        assert_eq!(it.cell(NAME), Some(SqlValue::from("bar")));
        let () = it.advance();
        assert_eq!(it.row(), Some(1));
        let () = it.advance();
        assert!(it.is_eof());
        assert_eq!(it.cell(NAME), None);
    }

    /// Check that the builder validates its input.
    #[test]
    fn builder_validation() {
        let schema = Schema::new(vec![ColumnSchema::id("id")]);
        let mut builder = ColumnTable::builder(schema);
        let err = builder.push_row(vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let () = builder.push_row(vec![SqlValue::from(1i64)]).unwrap();
        let () = builder.push_row(vec![SqlValue::from(0i64)]).unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = table()
            .query_to_row_map(&[eq(42, FilterOp::Eq, 1i64)], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
