//! Output tables populated while processing a trace.

use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::marker::PhantomData;

use crate::db::ColumnSchema;
use crate::db::ColumnTable;
use crate::db::Schema;
use crate::db::SqlType;
use crate::db::SqlValue;
use crate::Addr;
use crate::Result;


/// A type usable as the identity of a row in a [`RowTable`].
pub trait RowId: Copy {
    /// Create an id from a row index.
    fn from_index(idx: u32) -> Self;

    /// Retrieve the row index of the id.
    fn index(self) -> u32;
}


macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(u32);

        impl $name {
            /// Create an id from its raw value.
            #[inline]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Retrieve the raw value of the id.
            #[inline]
            pub const fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl RowId for $name {
            #[inline]
            fn from_index(idx: u32) -> Self {
                Self(idx)
            }

            #[inline]
            fn index(self) -> u32 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, f)
            }
        }

        impl From<$name> for SqlValue {
            #[inline]
            fn from(id: $name) -> Self {
                SqlValue::from(id.0)
            }
        }
    };
}

define_id!(
    /// The identity of an interned string.
    StringId
);
define_id!(
    /// The identity of a row in the mapping table.
    MappingId
);
define_id!(
    /// The identity of a row in the frame table.
    FrameId
);
define_id!(
    /// The identity of a row in the callsite table.
    CallsiteId
);

impl StringId {
    /// The id of the empty string.
    pub const EMPTY: StringId = StringId(0);
}


/// A pool of interned strings.
///
/// Interning the same string twice produces the same [`StringId`]. The
/// empty string is always present, as [`StringId::EMPTY`].
#[derive(Debug)]
pub struct StringPool {
    strings: Vec<Box<str>>,
    ids: HashMap<Box<str>, StringId>,
}

impl StringPool {
    /// Create a new pool containing only the empty string.
    pub fn new() -> Self {
        let mut slf = Self {
            strings: Vec::new(),
            ids: HashMap::new(),
        };
        let _empty = slf.intern("");
        slf
    }

    /// Intern `s`, returning its id.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.ids.get(s) {
            return *id
        }

        let id = StringId(self.strings.len() as u32);
        let () = self.strings.push(Box::from(s));
        let _prev = self.ids.insert(Box::from(s), id);
        id
    }

    /// Look up the id of `s`, if it has been interned.
    #[inline]
    pub fn find(&self, s: &str) -> Option<StringId> {
        self.ids.get(s).copied()
    }

    /// Retrieve the string with the given id.
    #[inline]
    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(Box::as_ref)
    }

    /// Retrieve the number of interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check whether the pool is empty. It never is.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}


/// A row of the mapping table.
#[derive(Clone, Debug, PartialEq)]
pub struct MappingRow {
    /// The hex encoded build id, or the empty string.
    pub build_id: StringId,
    /// The offset into the backing file at which the mapping starts.
    pub exact_offset: u64,
    /// The offset of the first page of the mapping.
    pub start_offset: u64,
    /// The first address covered by the mapping.
    pub start: Addr,
    /// The first address past the mapping.
    pub end: Addr,
    /// The bias between addresses in the binary and in memory.
    pub load_bias: u64,
    /// The name of the mapping, usually the path of the backing file.
    pub name: StringId,
}


/// A row of the frame table.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRow {
    /// The name of the function, or the empty string if unknown.
    pub name: StringId,
    /// The mapping the frame belongs to.
    pub mapping: MappingId,
    /// The program counter, relative to the mapping.
    pub rel_pc: u64,
}


/// A row of the callsite table.
#[derive(Clone, Debug, PartialEq)]
pub struct CallsiteRow {
    /// The depth of the callsite in its stack, zero being the root.
    pub depth: u32,
    /// The calling callsite, if any.
    pub parent_id: Option<CallsiteId>,
    /// The frame executing at this callsite.
    pub frame_id: FrameId,
}


/// An append-only table of rows indexed by an id type.
#[derive(Debug)]
pub struct RowTable<I, R> {
    rows: Vec<R>,
    _id: PhantomData<I>,
}

impl<I, R> RowTable<I, R>
where
    I: RowId,
{
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            _id: PhantomData,
        }
    }

    fn insert(&mut self, row: R) -> I {
        let id = I::from_index(self.rows.len() as u32);
        let () = self.rows.push(row);
        id
    }

    /// Retrieve the row with the provided id.
    #[inline]
    pub fn get(&self, id: I) -> Option<&R> {
        self.rows.get(id.index() as usize)
    }

    /// Retrieve the number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over all rows, in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (I, &R)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (I::from_index(idx as u32), row))
    }
}


/// The storage for everything produced while interning mappings, frames
/// and callsites.
#[derive(Debug)]
pub struct TraceStorage {
    strings: StringPool,
    mappings: RowTable<MappingId, MappingRow>,
    frames: RowTable<FrameId, FrameRow>,
    callsites: RowTable<CallsiteId, CallsiteRow>,
}

impl TraceStorage {
    /// Create a new, empty storage.
    pub fn new() -> Self {
        Self {
            strings: StringPool::new(),
            mappings: RowTable::new(),
            frames: RowTable::new(),
            callsites: RowTable::new(),
        }
    }

    /// Intern a string.
    #[inline]
    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    /// Retrieve the string pool.
    #[inline]
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// Retrieve the string with the given id, or the empty string if
    /// there is none.
    #[inline]
    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id).unwrap_or("")
    }

    /// Retrieve the mapping table.
    #[inline]
    pub fn mappings(&self) -> &RowTable<MappingId, MappingRow> {
        &self.mappings
    }

    /// Retrieve the frame table.
    #[inline]
    pub fn frames(&self) -> &RowTable<FrameId, FrameRow> {
        &self.frames
    }

    /// Retrieve the callsite table.
    #[inline]
    pub fn callsites(&self) -> &RowTable<CallsiteId, CallsiteRow> {
        &self.callsites
    }

    pub(crate) fn insert_mapping(&mut self, row: MappingRow) -> MappingId {
        self.mappings.insert(row)
    }

    /// Insert a new row into the frame table.
    ///
    /// No deduplication happens here: interning frames is the
    /// responsibility of the owning mapping or its JIT delegate.
    pub fn insert_frame(&mut self, mapping: MappingId, rel_pc: u64, name: &str) -> FrameId {
        let name = self.intern_string(name);
        self.frames.insert(FrameRow {
            name,
            mapping,
            rel_pc,
        })
    }

    pub(crate) fn insert_callsite(&mut self, row: CallsiteRow) -> CallsiteId {
        self.callsites.insert(row)
    }

    /// Export the mapping table as a queryable table.
    pub fn mapping_table(&self) -> Result<ColumnTable> {
        let schema = Schema::new(vec![
            ColumnSchema::id("id"),
            ColumnSchema::new("build_id", SqlType::String),
            ColumnSchema::new("exact_offset", SqlType::Long),
            ColumnSchema::new("start_offset", SqlType::Long),
            ColumnSchema::new("start", SqlType::Long),
            ColumnSchema::new("end", SqlType::Long),
            ColumnSchema::new("load_bias", SqlType::Long),
            ColumnSchema::new("name", SqlType::String),
        ]);

        let mut builder = ColumnTable::builder(schema);
        for (id, row) in self.mappings.iter() {
            let () = builder.push_row(vec![
                SqlValue::from(id),
                SqlValue::from(self.string(row.build_id)),
                SqlValue::from(row.exact_offset),
                SqlValue::from(row.start_offset),
                SqlValue::from(row.start),
                SqlValue::from(row.end),
                SqlValue::from(row.load_bias),
                SqlValue::from(self.string(row.name)),
            ])?;
        }
        builder.build()
    }

    /// Export the frame table as a queryable table.
    pub fn frame_table(&self) -> Result<ColumnTable> {
        let schema = Schema::new(vec![
            ColumnSchema::id("id"),
            ColumnSchema::new("name", SqlType::String),
            ColumnSchema::new("mapping", SqlType::Long),
            ColumnSchema::new("rel_pc", SqlType::Long),
        ]);

        let mut builder = ColumnTable::builder(schema);
        for (id, row) in self.frames.iter() {
            let () = builder.push_row(vec![
                SqlValue::from(id),
                SqlValue::from(self.string(row.name)),
                SqlValue::from(row.mapping),
                SqlValue::from(row.rel_pc),
            ])?;
        }
        builder.build()
    }

    /// Export the callsite table as a queryable table.
    pub fn callsite_table(&self) -> Result<ColumnTable> {
        let schema = Schema::new(vec![
            ColumnSchema::id("id"),
            ColumnSchema::new("depth", SqlType::Long),
            ColumnSchema::new("parent_id", SqlType::Long),
            ColumnSchema::new("frame_id", SqlType::Long),
        ]);

        let mut builder = ColumnTable::builder(schema);
        for (id, row) in self.callsites.iter() {
            let () = builder.push_row(vec![
                SqlValue::from(id),
                SqlValue::from(row.depth),
                SqlValue::from(row.parent_id),
                SqlValue::from(row.frame_id),
            ])?;
        }
        builder.build()
    }
}

impl Default for TraceStorage {
    fn default() -> Self {
        Self::new()
    }
}
