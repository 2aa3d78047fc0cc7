use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use crate::log::debug;
use crate::mapping::CreateMappingParams;
use crate::mapping::MappingTracker;
use crate::mapping::VirtualMemoryMapping;
use crate::storage::FrameId;
use crate::storage::MappingId;
use crate::storage::StringId;
use crate::storage::TraceStorage;
use crate::AddressRange;
use crate::AddressRangeMap;
use crate::Error;
use crate::Result;
use crate::Upid;


/// A shared handle to a [`JitDelegate`].
pub type JitDelegateRef = Rc<RefCell<dyn JitDelegate>>;


/// An object taking over frame creation for a range of JIT-compiled
/// code.
///
/// JIT-compiled code may move in memory over time, so the same program
/// counter can refer to different functions at different points in
/// time. The [`MappingTracker`] does not keep track of such moves but
/// forwards frame interning for registered JIT ranges to a delegate.
pub trait JitDelegate: Debug {
    /// Intern a frame for `rel_pc` in `mapping`.
    ///
    /// Returns the frame's id and whether a new frame row got created.
    fn intern_frame(
        &mut self,
        storage: &mut TraceStorage,
        mapping: &VirtualMemoryMapping,
        rel_pc: u64,
        function_name: &str,
    ) -> Result<(FrameId, bool)>;

    /// Materialize a user space mapping in process `upid`, for an address
    /// inside the JIT `range` the delegate was registered for.
    ///
    /// Some data sources never emit mmap events for JIT-compiled code,
    /// in which case the mapping is created lazily on first lookup.
    fn create_mapping(
        &mut self,
        tracker: &mut MappingTracker,
        upid: Upid,
        range: AddressRange,
    ) -> Result<MappingId>;
}


#[derive(Debug)]
struct JitFunction {
    name: String,
    range: AddressRange,
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct JitFrameKey {
    /// The function generation the frame belongs to, if any function
    /// is known for the address.
    function: Option<usize>,
    rel_pc: u64,
    name: StringId,
}


/// A stock [`JitDelegate`] keeping track of the functions compiled into
/// a JIT cache.
///
/// Every call to [`load_code`](JitCache::load_code) starts a new
/// function generation for its range, replacing whatever was there
/// before. Frames are interned per generation, so the same program
/// counter yields different frames before and after code got replaced.
#[derive(Debug)]
pub struct JitCache {
    name: String,
    upid: Upid,
    range: AddressRange,
    functions: Vec<JitFunction>,
    functions_by_address: AddressRangeMap<usize>,
    frames: HashMap<JitFrameKey, FrameId>,
    mapping: Option<MappingId>,
}

impl JitCache {
    /// Create a new JIT cache called `name` covering `range` in the
    /// address space of process `upid`.
    pub fn new(name: impl Into<String>, upid: Upid, range: AddressRange) -> Self {
        Self {
            name: name.into(),
            upid,
            range,
            functions: Vec::new(),
            functions_by_address: AddressRangeMap::new(),
            frames: HashMap::new(),
            mapping: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn upid(&self) -> Upid {
        self.upid
    }

    #[inline]
    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Record that `function_name` got compiled into `range`.
    ///
    /// Functions previously loaded into any part of `range` are
    /// forgotten.
    pub fn load_code(&mut self, range: AddressRange, function_name: &str) -> Result<()> {
        if !self.range.contains_range(&range) {
            return Err(Error::with_invalid_input(format!(
                "code range {range} is not part of JIT cache {} ({})",
                self.name, self.range
            )))
        }
        if range.is_empty() {
            return Err(Error::with_invalid_input(format!(
                "cannot load `{function_name}` into empty range {range}"
            )))
        }

        let idx = self.functions.len();
        let () = self.functions.push(JitFunction {
            name: function_name.to_string(),
            range,
        });
        let replaced = self.functions_by_address.delete_overlaps_and_emplace(range, idx);
        debug!(
            "loaded `{function_name}` into {range} of JIT cache {}, replacing {} function(s)",
            self.name,
            replaced.len()
        );
        Ok(())
    }

    /// Look up the name of the function currently loaded at `addr`.
    pub fn find_function(&self, addr: u64) -> Option<(AddressRange, &str)> {
        let (_range, idx) = self.functions_by_address.find(addr)?;
        let function = self.functions.get(*idx)?;
        Some((function.range, function.name.as_str()))
    }

    /// Retrieve the id of the mapping materialized for this cache, if
    /// any.
    #[inline]
    pub fn mapping(&self) -> Option<MappingId> {
        self.mapping
    }
}

impl JitDelegate for JitCache {
    fn intern_frame(
        &mut self,
        storage: &mut TraceStorage,
        mapping: &VirtualMemoryMapping,
        rel_pc: u64,
        function_name: &str,
    ) -> Result<(FrameId, bool)> {
        let addr = mapping.to_absolute_pc(rel_pc);
        let function = self
            .functions_by_address
            .find(addr)
            .and_then(|(_range, idx)| Some((*idx, self.functions.get(*idx)?)));

        // The JIT knows better what lives at an address than whoever
        // reported the sample.
        let (function, name) = match function {
            Some((idx, function)) => (Some(idx), function.name.as_str()),
            None => (None, function_name),
        };

        let key = JitFrameKey {
            function,
            rel_pc,
            name: storage.intern_string(name),
        };
        if let Some(frame) = self.frames.get(&key) {
            return Ok((*frame, false))
        }

        let frame = storage.insert_frame(mapping.mapping_id(), rel_pc, name);
        let _prev = self.frames.insert(key, frame);
        Ok((frame, true))
    }

    fn create_mapping(
        &mut self,
        tracker: &mut MappingTracker,
        upid: Upid,
        range: AddressRange,
    ) -> Result<MappingId> {
        if upid != self.upid || !self.range.contains_range(&range) {
            return Err(Error::with_invalid_input(format!(
                "JIT cache `{}` of process {} at {} cannot back JIT range {range} of process {upid}",
                self.name, self.upid, self.range
            )))
        }

        if let Some(mapping) = self.mapping {
            return Ok(mapping)
        }

        let params = CreateMappingParams::new(self.range, format!("[jit: {}]", self.name));
        let mapping = tracker.create_user_memory_mapping(self.upid, params)?;
        debug!("materialized mapping {mapping} for JIT cache {}", self.name);
        self.mapping = Some(mapping);
        Ok(mapping)
    }
}
