use std::collections::HashMap;
use std::rc::Rc;

use crate::log::trace;
use crate::mapping::BuildId;
use crate::mapping::CreateMappingParams;
use crate::mapping::JitDelegateRef;
use crate::storage::FrameId;
use crate::storage::MappingId;
use crate::storage::MappingRow;
use crate::storage::StringId;
use crate::storage::TraceStorage;
use crate::Addr;
use crate::AddressRange;
use crate::Upid;


/// The kind of a [`VirtualMemoryMapping`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MappingKind {
    /// A mapping of the kernel or of a kernel module.
    Kernel,
    /// A mapping in the address space of a user space process.
    User {
        /// The process the mapping belongs to.
        upid: Upid,
    },
    /// A mapping not tied to any address space, e.g., one created for
    /// symbolization of a binary outside of any process context.
    Other,
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct FrameKey {
    rel_pc: u64,
    name: StringId,
}


/// A memory mapping of some binary, in the kernel or in a process.
///
/// Mappings own the interning of frames within them.
#[derive(Debug)]
pub struct VirtualMemoryMapping {
    id: MappingId,
    kind: MappingKind,
    memory_range: AddressRange,
    offset: u64,
    load_bias: u64,
    name: String,
    build_id: Option<BuildId>,
    jit_delegate: Option<JitDelegateRef>,
    interned_frames: HashMap<FrameKey, FrameId>,
    frames_by_rel_pc: HashMap<u64, Vec<FrameId>>,
}

impl VirtualMemoryMapping {
    /// Create a new mapping, inserting a row for it into the mapping
    /// table.
    pub(crate) fn new(
        storage: &mut TraceStorage,
        kind: MappingKind,
        params: CreateMappingParams,
    ) -> Self {
        let CreateMappingParams {
            memory_range,
            exact_offset,
            start_offset,
            load_bias,
            name,
            build_id,
        } = params;

        let build_id_str = build_id
            .as_ref()
            .map(BuildId::to_hex)
            .unwrap_or_default();
        let row = MappingRow {
            build_id: storage.intern_string(&build_id_str),
            exact_offset,
            start_offset,
            start: memory_range.start(),
            end: memory_range.end(),
            load_bias,
            name: storage.intern_string(&name),
        };
        let id = storage.insert_mapping(row);

        Self {
            id,
            kind,
            memory_range,
            offset: exact_offset,
            load_bias,
            name,
            build_id,
            jit_delegate: None,
            interned_frames: HashMap::new(),
            frames_by_rel_pc: HashMap::new(),
        }
    }

    /// Retrieve the id of the mapping's row in the mapping table.
    #[inline]
    pub fn mapping_id(&self) -> MappingId {
        self.id
    }

    /// Retrieve the mapping's kind.
    #[inline]
    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    /// Retrieve the process the mapping belongs to, if it is a user
    /// space mapping.
    #[inline]
    pub fn upid(&self) -> Option<Upid> {
        match self.kind {
            MappingKind::User { upid } => Some(upid),
            MappingKind::Kernel | MappingKind::Other => None,
        }
    }

    #[inline]
    pub fn memory_range(&self) -> AddressRange {
        self.memory_range
    }

    /// Retrieve the offset into the backing file at which the mapping
    /// starts.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn load_bias(&self) -> u64 {
        self.load_bias
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn build_id(&self) -> Option<&BuildId> {
        self.build_id.as_ref()
    }

    /// Check whether a JIT delegate owns frame interning for this
    /// mapping.
    #[inline]
    pub fn has_jit_delegate(&self) -> bool {
        self.jit_delegate.is_some()
    }

    /// Convert an absolute address into one relative to the mapping.
    #[inline]
    pub fn to_relative_pc(&self, addr: Addr) -> u64 {
        addr.wrapping_sub(self.memory_range.start())
            .wrapping_add(self.offset)
            .wrapping_add(self.load_bias)
    }

    /// Convert an address relative to the mapping into an absolute one.
    #[inline]
    pub fn to_absolute_pc(&self, rel_pc: u64) -> Addr {
        rel_pc
            .wrapping_sub(self.load_bias)
            .wrapping_sub(self.offset)
            .wrapping_add(self.memory_range.start())
    }

    /// Retrieve all frames interned for `rel_pc`, in creation order.
    pub fn find_frame_ids(&self, rel_pc: u64) -> &[FrameId] {
        self.frames_by_rel_pc
            .get(&rel_pc)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn jit_delegate(&self) -> Option<JitDelegateRef> {
        self.jit_delegate.as_ref().map(Rc::clone)
    }

    #[inline]
    pub(crate) fn set_jit_delegate(&mut self, delegate: JitDelegateRef) {
        self.jit_delegate = Some(delegate);
    }

    /// Intern a frame using the mapping's own frame cache.
    ///
    /// Returns the frame's id and whether a new frame row got created.
    pub(crate) fn intern_frame_impl(
        &mut self,
        storage: &mut TraceStorage,
        rel_pc: u64,
        function_name: &str,
    ) -> (FrameId, bool) {
        let key = FrameKey {
            rel_pc,
            name: storage.intern_string(function_name),
        };
        if let Some(id) = self.interned_frames.get(&key) {
            return (*id, false)
        }

        let id = storage.insert_frame(self.id, rel_pc, function_name);
        let _prev = self.interned_frames.insert(key, id);
        trace!(
            "created frame {id} for {function_name}@{rel_pc:#x} in mapping {}",
            self.id
        );
        (id, true)
    }

    /// Remember a newly created frame for lookup by `rel_pc`.
    pub(crate) fn record_frame(&mut self, rel_pc: u64, frame: FrameId) {
        let () = self.frames_by_rel_pc.entry(rel_pc).or_default().push(frame);
    }
}
