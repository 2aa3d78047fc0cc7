use crate::db::FilterOp;


/// A comparison operator as reported by the SQL engine during query
/// planning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConstraintOp {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `MATCH`
    Match,
    /// `LIKE`
    Like,
    /// `GLOB`
    Glob,
    /// `REGEXP`
    Regexp,
    /// `!=`
    Ne,
    /// `IS NOT`
    IsNot,
    /// `IS NOT NULL`
    IsNotNull,
    /// `IS NULL`
    IsNull,
    /// `IS`
    Is,
    /// `LIMIT`
    Limit,
    /// `OFFSET`
    Offset,
}

impl ConstraintOp {
    /// Translate the engine operator into one the column store can
    /// evaluate.
    ///
    /// `None` means the engine has to evaluate the constraint itself.
    pub fn to_filter_op(self) -> Option<FilterOp> {
        match self {
            Self::Eq => Some(FilterOp::Eq),
            Self::Gt => Some(FilterOp::Gt),
            Self::Lt => Some(FilterOp::Lt),
            Self::Ne => Some(FilterOp::Ne),
            Self::Ge => Some(FilterOp::Ge),
            Self::Le => Some(FilterOp::Le),
            Self::IsNull => Some(FilterOp::IsNull),
            Self::IsNotNull => Some(FilterOp::IsNotNull),
            Self::Glob => Some(FilterOp::Glob),
            Self::Regexp => Some(FilterOp::Regex),
            Self::Like | Self::Limit | Self::Offset | Self::Is | Self::IsNot | Self::Match => None,
        }
    }

    /// Check whether the operator is an equality comparison.
    #[inline]
    pub fn is_eq(self) -> bool {
        self == Self::Eq
    }

    /// Check whether the operator is a range comparison (`<`, `<=`, `>`
    /// or `>=`).
    #[inline]
    pub fn is_range(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}


/// A constraint on a column, as seen during query planning.
///
/// The value to compare against is only provided once the query runs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IndexConstraint {
    /// The index of the constrained column.
    pub column: u32,
    /// The comparison.
    pub op: ConstraintOp,
}


/// An ordering term, as seen during query planning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OrderBy {
    /// The index of the column to order by.
    pub column: u32,
    /// Whether to order descending.
    pub desc: bool,
}


/// The constraints and orderings of a query against a single table.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct QueryConstraints {
    constraints: Vec<IndexConstraint>,
    order_by: Vec<OrderBy>,
}

impl QueryConstraints {
    /// Create a new, empty object.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint on `column`.
    pub fn add_constraint(&mut self, column: u32, op: ConstraintOp) {
        self.constraints.push(IndexConstraint { column, op });
    }

    /// Add an ordering term on `column`.
    pub fn add_order_by(&mut self, column: u32, desc: bool) {
        self.order_by.push(OrderBy { column, desc });
    }

    /// Builder style version of [`add_constraint`](Self::add_constraint).
    #[inline]
    pub fn with_constraint(mut self, column: u32, op: ConstraintOp) -> Self {
        let () = self.add_constraint(column, op);
        self
    }

    /// Builder style version of [`add_order_by`](Self::add_order_by).
    #[inline]
    pub fn with_order_by(mut self, column: u32, desc: bool) -> Self {
        let () = self.add_order_by(column, desc);
        self
    }

    /// Retrieve the constraints.
    #[inline]
    pub fn constraints(&self) -> &[IndexConstraint] {
        &self.constraints
    }

    /// Retrieve the ordering terms.
    #[inline]
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    #[inline]
    pub(crate) fn constraints_mut(&mut self) -> &mut Vec<IndexConstraint> {
        &mut self.constraints
    }

    #[inline]
    pub(crate) fn order_by_mut(&mut self) -> &mut Vec<OrderBy> {
        &mut self.order_by
    }
}
