use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

use crate::db::IndexConstraint;
use crate::db::Table;
use crate::log::debug;


/// A [`QueryCache`] shared between all cursors of one or more tables.
pub type SharedQueryCache = Rc<RefCell<QueryCache>>;


#[derive(Debug)]
struct CachedTable {
    /// The table the cached one was derived from.
    ///
    /// We hold on to a weak reference only: it keeps the allocation
    /// around, so that the address can't be reused by a different table
    /// while we are still comparing against it.
    source: Weak<dyn Table>,
    constraints: Vec<IndexConstraint>,
    table: Rc<dyn Table>,
}

impl CachedTable {
    fn matches(&self, source: &Rc<dyn Table>, constraints: &[IndexConstraint]) -> bool {
        let cached = Weak::as_ptr(&self.source).cast::<()>();
        let source = Rc::as_ptr(source).cast::<()>();
        cached == source && self.constraints == constraints
    }
}


/// A cache of sorted projections of tables, keyed by source table and
/// constraint set.
///
/// The cache currently holds a single entry: caching a new projection
/// evicts the previous one.
#[derive(Debug, Default)]
pub struct QueryCache {
    cached: Option<CachedTable>,
}

impl QueryCache {
    /// Create a new, empty cache.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, empty cache ready for sharing.
    #[inline]
    pub fn new_shared() -> SharedQueryCache {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Retrieve the table cached for `source` and `constraints`, if any.
    pub fn get_if_cached(
        &self,
        source: &Rc<dyn Table>,
        constraints: &[IndexConstraint],
    ) -> Option<Rc<dyn Table>> {
        self.cached
            .as_ref()
            .filter(|cached| cached.matches(source, constraints))
            .map(|cached| Rc::clone(&cached.table))
    }

    /// Retrieve the table cached for `source` and `constraints`,
    /// computing and caching it with `f` if necessary.
    pub fn get_or_cache<F>(
        &mut self,
        source: &Rc<dyn Table>,
        constraints: &[IndexConstraint],
        f: F,
    ) -> Rc<dyn Table>
    where
        F: FnOnce() -> Rc<dyn Table>,
    {
        if let Some(table) = self.get_if_cached(source, constraints) {
            return table
        }

        debug!(
            "caching sorted table with {} rows for constraints {constraints:?}",
            source.row_count()
        );
        let table = f();
        self.cached = Some(CachedTable {
            source: Rc::downgrade(source),
            constraints: constraints.to_vec(),
            table: Rc::clone(&table),
        });
        table
    }

    /// Remove any cached table.
    #[inline]
    pub fn clear(&mut self) {
        self.cached = None;
    }

    /// Check whether the cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cached.is_none()
    }
}
