use std::collections::HashMap;
use std::rc::Rc;

use crate::log::debug;
use crate::log::trace;
use crate::mapping::BuildId;
use crate::mapping::CreateMappingParams;
use crate::mapping::JitDelegateRef;
use crate::mapping::MappingKind;
use crate::mapping::StackProfileTracker;
use crate::mapping::VirtualMemoryMapping;
use crate::storage::CallsiteId;
use crate::storage::FrameId;
use crate::storage::MappingId;
use crate::storage::TraceStorage;
use crate::Addr;
use crate::AddressRange;
use crate::AddressRangeMap;
use crate::Error;
use crate::IntoError as _;
use crate::Result;
use crate::Upid;


/// The name used for the kernel mapping created when no kernel mapping
/// was ever reported.
const DEFAULT_KERNEL_MAPPING_NAME: &str = "/kernel";


/// Check whether `name` refers to a kernel module, as opposed to the
/// main kernel image.
fn is_kernel_module(name: &str) -> bool {
    !name.starts_with("[kernel.kallsyms]") && name != "/kernel"
}

fn ensure_non_empty(range: AddressRange, name: &str) -> Result<()> {
    if range.is_empty() {
        return Err(Error::with_invalid_input(format!(
            "mapping `{name}` covers empty range {range}"
        )))
    }
    Ok(())
}


/// Keeps track of all memory mappings of a trace.
///
/// Three types of mappings are tracked: kernel mappings, user space
/// mappings and "other" mappings, for which data sources do not provide
/// enough information to tell whether they belong to the kernel or to a
/// process.
///
/// Mappings are never removed or modified once registered. Calls that
/// would violate the no-overlap invariants fail with
/// [`ErrorKind::CorruptInput`][crate::ErrorKind::CorruptInput] and leave
/// the tracker unchanged.
#[derive(Debug)]
pub struct MappingTracker {
    storage: TraceStorage,
    stack_profile: StackProfileTracker,
    /// The id of the first mapping created by this tracker. Rows present
    /// in the storage before that belong to nobody.
    first_mapping: u32,
    /// All mappings created by this tracker, indexed by their `MappingId`
    /// relative to `first_mapping`.
    mappings: Vec<VirtualMemoryMapping>,
    interned_mappings: HashMap<CreateMappingParams, MappingId>,
    mappings_by_name_and_build_id: HashMap<(String, Option<BuildId>), Vec<MappingId>>,
    user_memory: HashMap<Upid, AddressRangeMap<MappingId>>,
    kernel_modules: AddressRangeMap<MappingId>,
    kernel: Option<MappingId>,
    /// Whether `kernel` is the default mapping spanning all addresses.
    default_kernel: bool,
    jit_delegates: HashMap<Upid, AddressRangeMap<JitDelegateRef>>,
}

impl MappingTracker {
    /// Create a new tracker with empty output tables.
    pub fn new() -> Self {
        Self::with_storage(TraceStorage::new())
    }

    /// Create a new tracker writing into `storage`.
    ///
    /// Mapping rows already contained in `storage` are left alone: they
    /// are not known to the tracker and cannot be looked up through it.
    pub fn with_storage(storage: TraceStorage) -> Self {
        // Ids are row indices, which are bounded by `u32` to begin with.
        let first_mapping = u32::try_from(storage.mappings().len()).unwrap_or(u32::MAX);
        Self {
            storage,
            stack_profile: StackProfileTracker::new(),
            first_mapping,
            mappings: Vec::new(),
            interned_mappings: HashMap::new(),
            mappings_by_name_and_build_id: HashMap::new(),
            user_memory: HashMap::new(),
            kernel_modules: AddressRangeMap::new(),
            kernel: None,
            default_kernel: false,
            jit_delegates: HashMap::new(),
        }
    }

    fn add_mapping(&mut self, kind: MappingKind, params: CreateMappingParams) -> MappingId {
        let mapping = VirtualMemoryMapping::new(&mut self.storage, kind, params);
        let id = mapping.mapping_id();
        debug_assert_eq!(self.index(id), Some(self.mappings.len()));
        debug!(
            "created {kind:?} mapping {id} `{}` for {}",
            mapping.name(),
            mapping.memory_range()
        );

        let key = (mapping.name().to_string(), mapping.build_id().cloned());
        let () = self
            .mappings_by_name_and_build_id
            .entry(key)
            .or_default()
            .push(id);
        let () = self.mappings.push(mapping);
        id
    }

    fn index(&self, id: MappingId) -> Option<usize> {
        let idx = id.as_u32().checked_sub(self.first_mapping)?;
        Some(idx as usize)
    }

    fn mapping_mut(&mut self, id: MappingId) -> Option<&mut VirtualMemoryMapping> {
        let idx = self.index(id)?;
        self.mappings.get_mut(idx)
    }

    /// Register a mapping of the kernel or of one of its modules.
    ///
    /// Mappings called `/kernel` or starting with `[kernel.kallsyms]`
    /// denote the main kernel image, of which there is only one.
    /// Registering it again with the same address range returns the
    /// existing mapping. Everything else is considered a kernel module.
    pub fn create_kernel_memory_mapping(&mut self, params: CreateMappingParams) -> Result<MappingId> {
        let range = params.memory_range;
        let is_module = is_kernel_module(&params.name);

        if !is_module {
            if let Some(kernel) = self.kernel {
                let existing = self
                    .mapping(kernel)
                    .ok_or_corrupt_input(|| format!("kernel mapping {kernel} does not exist"))?
                    .memory_range();
                if existing != range {
                    return Err(Error::with_corrupt_input(format!(
                        "kernel mapping `{}` at {range} conflicts with existing kernel mapping at {existing}",
                        params.name
                    )))
                }
                trace!("kernel mapping at {range} already registered as {kernel}");
                return Ok(kernel)
            }
        }

        let () = ensure_non_empty(range, &params.name)?;
        if is_module {
            if let Some((existing, id)) = self.kernel_modules.overlaps(range).next() {
                return Err(Error::with_corrupt_input(format!(
                    "kernel module `{}` at {range} overlaps mapping {id} at {existing}",
                    params.name
                )))
            }
        }

        let id = self.add_mapping(MappingKind::Kernel, params);
        if is_module {
            let inserted = self.kernel_modules.emplace(range, id);
            debug_assert!(inserted);
        } else {
            self.kernel = Some(id);
        }
        Ok(id)
    }

    /// Retrieve the main kernel mapping, creating one covering the
    /// entire address space if none was registered.
    pub fn get_or_create_kernel_memory_mapping_default(&mut self) -> MappingId {
        if let Some(kernel) = self.kernel {
            return kernel
        }

        let params = CreateMappingParams::new(AddressRange::max(), DEFAULT_KERNEL_MAPPING_NAME);
        let id = self.add_mapping(MappingKind::Kernel, params);
        self.kernel = Some(id);
        self.default_kernel = true;
        id
    }

    /// Register a mapping in the address space of process `upid`.
    ///
    /// Overlapping user space mappings are not supported. If a JIT range
    /// registered earlier covers the new mapping, its delegate is
    /// attached to the mapping right away.
    pub fn create_user_memory_mapping(
        &mut self,
        upid: Upid,
        params: CreateMappingParams,
    ) -> Result<MappingId> {
        let range = params.memory_range;
        let () = ensure_non_empty(range, &params.name)?;

        if let Some(memory) = self.user_memory.get(&upid) {
            if let Some((existing, id)) = memory.overlaps(range).next() {
                return Err(Error::with_corrupt_input(format!(
                    "mapping `{}` at {range} overlaps mapping {id} at {existing} of process {upid}",
                    params.name
                )))
            }
        }

        let mut delegate = None;
        if let Some(delegates) = self.jit_delegates.get(&upid) {
            for (jit_range, jit_delegate) in delegates.overlaps(range) {
                if !jit_range.contains_range(&range) {
                    return Err(Error::with_corrupt_input(format!(
                        "mapping `{}` at {range} is only partially covered by JIT range {jit_range} of process {upid}",
                        params.name
                    )))
                }
                delegate = Some(Rc::clone(jit_delegate));
            }
        }

        let id = self.add_mapping(MappingKind::User { upid }, params);
        let inserted = self.user_memory.entry(upid).or_default().emplace(range, id);
        debug_assert!(inserted);

        if let Some(delegate) = delegate {
            debug!("attaching JIT delegate to new mapping {id} of process {upid}");
            let () = self
                .mapping_mut(id)
                .ok_or_corrupt_input(|| format!("mapping {id} does not exist"))?
                .set_jit_delegate(delegate);
        }
        Ok(id)
    }

    /// Retrieve the mapping created for `params`, creating it if it does
    /// not exist yet.
    ///
    /// Such mappings are neither kernel nor user space mappings and are
    /// not addressable by address.
    pub fn intern_memory_mapping(&mut self, params: CreateMappingParams) -> MappingId {
        if let Some(id) = self.interned_mappings.get(&params) {
            return *id
        }

        let id = self.add_mapping(MappingKind::Other, params.clone());
        let _prev = self.interned_mappings.insert(params, id);
        id
    }

    /// Find the kernel mapping containing `addr`.
    ///
    /// Kernel modules take precedence over the main kernel mapping.
    pub fn find_kernel_mapping_for_address(&self, addr: Addr) -> Option<MappingId> {
        if let Some((_range, id)) = self.kernel_modules.find(addr) {
            return Some(*id)
        }

        let kernel = self.kernel?;
        // The half-open range of the default mapping cannot express the
        // last address, but it covers it all the same.
        if self.default_kernel {
            return Some(kernel)
        }

        self.mapping(kernel)?
            .memory_range()
            .contains(addr)
            .then_some(kernel)
    }

    /// Find the registered user space mapping of process `upid`
    /// containing `addr`.
    ///
    /// Contrary to
    /// [`find_user_mapping_for_address`](Self::find_user_mapping_for_address)
    /// no mapping gets materialized for JIT ranges.
    pub fn find_user_mapping(&self, upid: Upid, addr: Addr) -> Option<MappingId> {
        let (_range, id) = self.user_memory.get(&upid)?.find(addr)?;
        Some(*id)
    }

    /// Find the user space mapping of process `upid` containing `addr`.
    ///
    /// If no mapping is registered for the address but it falls into a
    /// JIT range, the range's delegate is asked to create one.
    pub fn find_user_mapping_for_address(&mut self, upid: Upid, addr: Addr) -> Result<Option<MappingId>> {
        if let Some(id) = self.find_user_mapping(upid, addr) {
            return Ok(Some(id))
        }

        let delegate = self
            .jit_delegates
            .get(&upid)
            .and_then(|delegates| delegates.find(addr))
            .map(|(range, delegate)| (*range, Rc::clone(delegate)));
        if let Some((range, delegate)) = delegate {
            let mut delegate = delegate
                .try_borrow_mut()
                .map_err(|_err| Error::with_invalid_input("JIT delegate is already in use"))?;
            let id = delegate.create_mapping(self, upid, range)?;
            return Ok(Some(id))
        }
        Ok(None)
    }

    /// Find all mappings with the given name and build id.
    pub fn find_mappings(&self, name: &str, build_id: Option<&BuildId>) -> &[MappingId] {
        self.mappings_by_name_and_build_id
            .get(&(name.to_string(), build_id.cloned()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Register `range` of process `upid` as containing JIT-compiled
    /// code, with frame creation handled by `delegate`.
    ///
    /// Previously registered JIT ranges overlapping `range` are
    /// replaced. Existing mappings of the process inside `range` get
    /// the delegate attached; a mapping only partially covered by
    /// `range` is an error.
    pub fn add_jit_range(
        &mut self,
        upid: Upid,
        range: AddressRange,
        delegate: JitDelegateRef,
    ) -> Result<()> {
        let () = ensure_non_empty(range, "<jit>")?;

        let covered = if let Some(memory) = self.user_memory.get(&upid) {
            memory
                .overlaps(range)
                .map(|(mapping_range, id)| {
                    if range.contains_range(mapping_range) {
                        Ok(*id)
                    } else {
                        Err(Error::with_corrupt_input(format!(
                            "JIT range {range} only partially covers mapping {id} at {mapping_range} of process {upid}"
                        )))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let replaced = self
            .jit_delegates
            .entry(upid)
            .or_default()
            .delete_overlaps_and_emplace(range, Rc::clone(&delegate));
        debug!(
            "registered JIT range {range} of process {upid}, replacing {} range(s)",
            replaced.len()
        );

        for id in covered {
            debug!("attaching JIT delegate to mapping {id} of process {upid}");
            let () = self
                .mapping_mut(id)
                .ok_or_corrupt_input(|| format!("mapping {id} does not exist"))?
                .set_jit_delegate(Rc::clone(&delegate));
        }
        Ok(())
    }

    /// Intern the frame for `function_name` at `rel_pc` in `mapping`.
    ///
    /// Mappings with a JIT delegate forward the request to it. Whenever
    /// a new frame row is created, the frame becomes discoverable via
    /// [`find_frame_ids`](Self::find_frame_ids) and the stack profile
    /// tracker gets notified.
    pub fn intern_frame(&mut self, mapping: MappingId, rel_pc: u64, function_name: &str) -> Result<FrameId> {
        let vmm = self
            .index(mapping)
            .and_then(|idx| self.mappings.get_mut(idx))
            .ok_or_invalid_input(|| format!("mapping {mapping} does not exist"))?;

        let (frame, inserted) = if let Some(delegate) = vmm.jit_delegate() {
            let mut delegate = delegate
                .try_borrow_mut()
                .map_err(|_err| Error::with_invalid_input("JIT delegate is already in use"))?;
            delegate.intern_frame(&mut self.storage, vmm, rel_pc, function_name)?
        } else {
            vmm.intern_frame_impl(&mut self.storage, rel_pc, function_name)
        };

        if inserted {
            let () = vmm.record_frame(rel_pc, frame);
            let () = self.stack_profile.on_frame_created(frame);
        }
        Ok(frame)
    }

    /// Retrieve all frames interned for `rel_pc` in `mapping`, in
    /// creation order.
    pub fn find_frame_ids(&self, mapping: MappingId, rel_pc: u64) -> &[FrameId] {
        self.mapping(mapping)
            .map(|vmm| vmm.find_frame_ids(rel_pc))
            .unwrap_or(&[])
    }

    /// Intern the callsite executing `frame` when called from `parent`.
    #[inline]
    pub fn intern_callsite(&mut self, parent: Option<CallsiteId>, frame: FrameId) -> Result<CallsiteId> {
        self.stack_profile
            .intern_callsite(&mut self.storage, parent, frame)
    }

    /// Intern a call stack given as frames from root to leaf, returning
    /// the leaf callsite.
    #[inline]
    pub fn intern_callstack(&mut self, frames: &[FrameId]) -> Result<Option<CallsiteId>> {
        self.stack_profile
            .intern_callstack(&mut self.storage, frames)
    }

    /// Retrieve the mapping with the given id.
    #[inline]
    pub fn mapping(&self, id: MappingId) -> Option<&VirtualMemoryMapping> {
        let idx = self.index(id)?;
        self.mappings.get(idx)
    }

    /// Retrieve all mappings, in creation order.
    #[inline]
    pub fn mappings(&self) -> &[VirtualMemoryMapping] {
        &self.mappings
    }

    /// Retrieve the main kernel mapping, if one was registered.
    #[inline]
    pub fn kernel_mapping(&self) -> Option<MappingId> {
        self.kernel
    }

    #[inline]
    pub fn stack_profile(&self) -> &StackProfileTracker {
        &self.stack_profile
    }

    /// Retrieve the output tables.
    #[inline]
    pub fn storage(&self) -> &TraceStorage {
        &self.storage
    }

    /// Destroy the tracker, returning its output tables.
    #[inline]
    pub fn into_storage(self) -> TraceStorage {
        self.storage
    }
}

impl Default for MappingTracker {
    fn default() -> Self {
        Self::new()
    }
}
