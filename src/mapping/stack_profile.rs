use std::collections::HashMap;
use std::rc::Rc;

use crate::db::ColumnSchema;
use crate::db::ColumnTable;
use crate::db::Schema;
use crate::db::SqlType;
use crate::db::SqlValue;
use crate::db::StaticTableFunction;
use crate::db::Table;
use crate::log::trace;
use crate::storage::CallsiteId;
use crate::storage::CallsiteRow;
use crate::storage::FrameId;
use crate::storage::RowId as _;
use crate::storage::TraceStorage;
use crate::Error;
use crate::IntoError as _;
use crate::Result;


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct CallsiteKey {
    parent: Option<CallsiteId>,
    frame: FrameId,
    depth: u32,
}


/// Bookkeeping for stack profiles: created frames and interned
/// callsites.
#[derive(Debug, Default)]
pub struct StackProfileTracker {
    created_frames: Vec<FrameId>,
    callsites: HashMap<CallsiteKey, CallsiteId>,
}

impl StackProfileTracker {
    /// Create a new, empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify the tracker that a new frame row got created.
    pub fn on_frame_created(&mut self, frame: FrameId) {
        let () = self.created_frames.push(frame);
    }

    /// Retrieve all frames created so far, in creation order.
    #[inline]
    pub fn created_frames(&self) -> &[FrameId] {
        &self.created_frames
    }

    /// Intern the callsite executing `frame` when called from `parent`.
    ///
    /// The depth of the callsite is derived from its parent, with root
    /// callsites having a depth of zero.
    pub fn intern_callsite(
        &mut self,
        storage: &mut TraceStorage,
        parent: Option<CallsiteId>,
        frame: FrameId,
    ) -> Result<CallsiteId> {
        let _row = storage
            .frames()
            .get(frame)
            .ok_or_invalid_input(|| format!("frame {frame} does not exist"))?;
        let depth = match parent {
            Some(parent) => {
                let row = storage
                    .callsites()
                    .get(parent)
                    .ok_or_invalid_input(|| format!("parent callsite {parent} does not exist"))?;
                row.depth + 1
            }
            None => 0,
        };

        let key = CallsiteKey {
            parent,
            frame,
            depth,
        };
        if let Some(id) = self.callsites.get(&key) {
            return Ok(*id)
        }

        let id = storage.insert_callsite(CallsiteRow {
            depth,
            parent_id: parent,
            frame_id: frame,
        });
        let _prev = self.callsites.insert(key, id);
        trace!("created callsite {id} for frame {frame} at depth {depth}");
        Ok(id)
    }

    /// Intern a complete call stack, given as frames ordered from the
    /// root to the leaf.
    ///
    /// Returns the leaf callsite, or `None` for an empty stack.
    pub fn intern_callstack(
        &mut self,
        storage: &mut TraceStorage,
        frames: &[FrameId],
    ) -> Result<Option<CallsiteId>> {
        frames.iter().try_fold(None, |parent, frame| {
            self.intern_callsite(storage, parent, *frame).map(Some)
        })
    }
}


/// A table function producing all ancestors of a callsite.
///
/// The function operates on a snapshot of the callsite table taken at
/// creation time. The callsite to start from is bound through the
/// hidden `start_id` column. Ancestors are reported root first; the
/// start callsite itself is not part of the result.
#[derive(Debug)]
pub struct AncestorCallsites {
    callsites: Rc<[CallsiteRow]>,
}

impl AncestorCallsites {
    /// Create the table function over the current callsites in
    /// `storage`.
    pub fn new(storage: &TraceStorage) -> Self {
        let callsites = storage
            .callsites()
            .iter()
            .map(|(_id, row)| row.clone())
            .collect();
        Self { callsites }
    }

    fn callsite(&self, id: CallsiteId) -> Option<&CallsiteRow> {
        self.callsites.get(id.index() as usize)
    }
}

impl StaticTableFunction for AncestorCallsites {
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            ColumnSchema::id("id"),
            ColumnSchema::new("depth", SqlType::Long),
            ColumnSchema::new("parent_id", SqlType::Long),
            ColumnSchema::new("frame_id", SqlType::Long),
            ColumnSchema::new("start_id", SqlType::Long).hidden(),
        ])
    }

    fn estimate_row_count(&self) -> u32 {
        // Stacks are rarely deeper than a few dozen frames.
        32
    }

    fn compute_table(&self, arguments: &[SqlValue]) -> Result<Rc<dyn Table>> {
        let start = arguments
            .first()
            .and_then(SqlValue::as_long)
            .ok_or_invalid_input(|| "start_id has to be an integer")?;
        let start_id = u32::try_from(start)
            .ok()
            .map(CallsiteId::new)
            .filter(|id| self.callsite(*id).is_some())
            .ok_or_else(|| Error::with_invalid_input(format!("callsite {start} does not exist")))?;

        let mut ancestors = Vec::new();
        let mut next = self.callsite(start_id).and_then(|row| row.parent_id);
        while let Some(id) = next {
            let row = self
                .callsite(id)
                .ok_or_corrupt_input(|| format!("callsite {id} references unknown parent"))?;
            let () = ancestors.push((id, row));
            next = row.parent_id;
        }
        let () = ancestors.sort_by_key(|(id, _row)| *id);

        let mut builder = ColumnTable::builder(self.create_schema());
        for (id, row) in ancestors {
            let () = builder.push_row(vec![
                SqlValue::from(id),
                SqlValue::from(row.depth),
                SqlValue::from(row.parent_id),
                SqlValue::from(row.frame_id),
                SqlValue::from(start_id),
            ])?;
        }
        Ok(Rc::new(builder.build()?))
    }
}
