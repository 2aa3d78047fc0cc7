use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::db::Table;
use crate::log::debug;
use crate::Error;
use crate::Result;


/// A registry of tables created at runtime, e.g., as the result of a
/// `CREATE TABLE ... AS` statement.
///
/// Tables are shared with the adapters querying them. Dropping the
/// adapter for a runtime table removes the table from the registry.
#[derive(Debug, Default)]
pub struct RuntimeTableRegistry {
    tables: RefCell<HashMap<String, Rc<dyn Table>>>,
}

impl RuntimeTableRegistry {
    /// Create a new, empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under `name`.
    pub fn create_table(&self, name: &str, table: Rc<dyn Table>) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        if tables.contains_key(name) {
            return Err(Error::with_invalid_input(format!(
                "runtime table `{name}` already exists"
            )))
        }

        debug!("creating runtime table `{name}` with {} rows", table.row_count());
        let _prev = tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Retrieve the table registered under `name`.
    pub fn get(&self, name: &str) -> Option<Rc<dyn Table>> {
        self.tables.borrow().get(name).cloned()
    }

    /// Remove the table registered under `name`, returning it.
    pub fn drop_table(&self, name: &str) -> Option<Rc<dyn Table>> {
        let table = self.tables.borrow_mut().remove(name);
        if table.is_some() {
            debug!("dropped runtime table `{name}`");
        }
        table
    }

    /// Check whether a table is registered under `name`.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.borrow().contains_key(name)
    }

    /// Retrieve the number of registered tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.borrow().len()
    }

    /// Check whether no table is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.borrow().is_empty()
    }
}
