use std::cell::RefCell;
use std::rc::Rc;

use tracecore::mapping::BuildId;
use tracecore::mapping::CreateMappingParams;
use tracecore::mapping::JitCache;
use tracecore::mapping::JitDelegate;
use tracecore::mapping::JitDelegateRef;
use tracecore::mapping::MappingTracker;
use tracecore::mapping::VirtualMemoryMapping;
use tracecore::storage::FrameId;
use tracecore::storage::MappingId;
use tracecore::storage::TraceStorage;
use tracecore::AddressRange;
use tracecore::ErrorKind;
use tracecore::Result;
use tracecore::Upid;

use test_log::test;


/// A delegate recording the requests it receives.
#[derive(Debug, Default)]
struct RecordingDelegate {
    range: Option<AddressRange>,
    interned: Vec<(MappingId, u64, String)>,
    requests: Vec<(Upid, AddressRange)>,
    created: u32,
}

impl JitDelegate for RecordingDelegate {
    fn intern_frame(
        &mut self,
        storage: &mut TraceStorage,
        mapping: &VirtualMemoryMapping,
        rel_pc: u64,
        function_name: &str,
    ) -> Result<(FrameId, bool)> {
        let () = self
            .interned
            .push((mapping.mapping_id(), rel_pc, function_name.to_string()));
        let frame = storage.insert_frame(mapping.mapping_id(), rel_pc, function_name);
        Ok((frame, true))
    }

    fn create_mapping(
        &mut self,
        tracker: &mut MappingTracker,
        upid: Upid,
        range: AddressRange,
    ) -> Result<MappingId> {
        self.created += 1;
        let () = self.requests.push((upid, range));
        let range = self.range.unwrap_or(range);
        tracker.create_user_memory_mapping(upid, CreateMappingParams::new(range, "jit"))
    }
}


/// Run the canonical kernel frame interning scenario.
#[test]
fn kernel_frame_interning() {
    let mut tracker = MappingTracker::new();
    let params = CreateMappingParams::new(AddressRange::new(0x8000_0000, 0x8000_1000), "/kernel");
    let kernel = tracker.create_kernel_memory_mapping(params).unwrap();

    let f0 = tracker.intern_frame(kernel, 0x10, "foo").unwrap();
    let f1 = tracker.intern_frame(kernel, 0x10, "bar").unwrap();
    assert_ne!(f0, f1);
    assert_eq!(tracker.find_frame_ids(kernel, 0x10), &[f0, f1]);

    // Interning is idempotent and does not record frames twice.
    assert_eq!(tracker.intern_frame(kernel, 0x10, "foo").unwrap(), f0);
    assert_eq!(tracker.find_frame_ids(kernel, 0x10), &[f0, f1]);
    assert_eq!(tracker.storage().frames().len(), 2);

    assert_eq!(
        tracker.find_kernel_mapping_for_address(0x8000_0010),
        Some(kernel)
    );
    assert_eq!(tracker.find_kernel_mapping_for_address(0x8000_1000), None);
}

/// Check that a fresh tracker falls back to a kernel mapping covering
/// the entire address space.
#[test]
fn kernel_default_fallback() {
    let mut tracker = MappingTracker::new();
    let kernel = tracker.get_or_create_kernel_memory_mapping_default();
    assert_eq!(tracker.get_or_create_kernel_memory_mapping_default(), kernel);
    assert_eq!(tracker.mappings().len(), 1);

    let mapping = tracker.mapping(kernel).unwrap();
    assert_eq!(mapping.memory_range(), AddressRange::max());
    assert_eq!(mapping.name(), "/kernel");
    assert_eq!(tracker.find_kernel_mapping_for_address(0), Some(kernel));
}

/// Make sure that overlapping user mappings are rejected.
#[test]
fn user_mapping_overlap_rejection() {
    let mut tracker = MappingTracker::new();
    let params = CreateMappingParams::new(AddressRange::new(0x1000, 0x3000), "/bin/app");
    let app = tracker.create_user_memory_mapping(42, params).unwrap();

    for (start, end) in [(0x0, 0x1001), (0x2fff, 0x4000), (0x1800, 0x1900), (0x0, 0x10000)] {
        let params = CreateMappingParams::new(AddressRange::new(start, end), "/lib/libc.so");
        let err = tracker
            .create_user_memory_mapping(42, params)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptInput);
        assert!(err.is_corrupt_input());
    }

    // Adjacent mappings are fine.
    let params = CreateMappingParams::new(AddressRange::new(0x3000, 0x4000), "/lib/libc.so");
    let libc = tracker.create_user_memory_mapping(42, params).unwrap();
    assert_eq!(tracker.find_user_mapping(42, 0x2fff), Some(app));
    assert_eq!(tracker.find_user_mapping(42, 0x3000), Some(libc));
    assert_eq!(tracker.storage().mappings().len(), 2);
}

/// Check that frame interning on a mapping routes through a JIT delegate
/// registered after the mapping.
#[test]
fn jit_reattachment() {
    let mut tracker = MappingTracker::new();
    let range = AddressRange::new(0x1000, 0x2000);
    let mapping = tracker
        .create_user_memory_mapping(7, CreateMappingParams::new(range, "memfd:jit-cache"))
        .unwrap();
    let before = tracker.intern_frame(mapping, 0x10, "interpreted").unwrap();

    let delegate = Rc::new(RefCell::new(RecordingDelegate::default()));
    let () = tracker
        .add_jit_range(7, range, Rc::clone(&delegate) as JitDelegateRef)
        .unwrap();

    assert_eq!(tracker.find_user_mapping_for_address(7, 0x1800).unwrap(), Some(mapping));
    // The mapping exists, so the delegate is not asked to create one.
    assert_eq!(delegate.borrow().created, 0);

    let after = tracker.intern_frame(mapping, 0x10, "compiled").unwrap();
    assert_ne!(before, after);
    assert_eq!(
        delegate.borrow().interned,
        vec![(mapping, 0x10, "compiled".to_string())]
    );
    assert_eq!(tracker.find_frame_ids(mapping, 0x10), &[before, after]);
    assert_eq!(tracker.stack_profile().created_frames(), &[before, after]);
}

/// Check that JIT delegates materialize mappings lazily.
#[test]
fn jit_lazy_mapping() {
    let mut tracker = MappingTracker::new();
    let range = AddressRange::new(0x1000, 0x2000);
    let delegate = Rc::new(RefCell::new(RecordingDelegate {
        range: Some(range),
        ..Default::default()
    }));
    let () = tracker
        .add_jit_range(7, range, Rc::clone(&delegate) as JitDelegateRef)
        .unwrap();

    let mapping = tracker
        .find_user_mapping_for_address(7, 0x1100)
        .unwrap()
        .unwrap();
    assert_eq!(delegate.borrow().created, 1);
    assert_eq!(delegate.borrow().requests, vec![(7, range)]);
    assert!(tracker.mapping(mapping).unwrap().has_jit_delegate());

    // The mapping is registered now and found directly.
    assert_eq!(tracker.find_user_mapping_for_address(7, 0x1200).unwrap(), Some(mapping));
    assert_eq!(delegate.borrow().created, 1);
    assert_eq!(tracker.find_user_mapping_for_address(8, 0x1200).unwrap(), None);
}

/// Make sure that a JIT cache registered for the wrong process does not
/// create mappings in it.
#[test]
fn jit_cache_process_mismatch() {
    let mut tracker = MappingTracker::new();
    let range = AddressRange::new(0x1000, 0x2000);
    let cache = Rc::new(RefCell::new(JitCache::new("art", 2, range)));
    let () = tracker
        .add_jit_range(1, range, Rc::clone(&cache) as JitDelegateRef)
        .unwrap();

    let err = tracker.find_user_mapping_for_address(1, 0x1800).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(tracker.find_user_mapping(1, 0x1800), None);
    assert_eq!(tracker.find_user_mapping(2, 0x1800), None);
    assert_eq!(cache.borrow().mapping(), None);

    // Registered for its own process, the same kind of cache works.
    let cache = Rc::new(RefCell::new(JitCache::new("art", 2, range)));
    let () = tracker
        .add_jit_range(2, range, Rc::clone(&cache) as JitDelegateRef)
        .unwrap();
    let mapping = tracker.find_user_mapping_for_address(2, 0x1800).unwrap();
    assert_eq!(mapping, cache.borrow().mapping());
    assert_eq!(tracker.mapping(mapping.unwrap()).unwrap().upid(), Some(2));
}

/// Exercise a JIT cache whose code moves over time.
#[test]
fn jit_cache_code_moves() {
    let range = AddressRange::new(0x7000_0000, 0x7001_0000);
    let cache = Rc::new(RefCell::new(JitCache::new("dalvik", 9, range)));
    let mut tracker = MappingTracker::new();
    let () = tracker
        .add_jit_range(9, range, Rc::clone(&cache) as JitDelegateRef)
        .unwrap();

    let code = AddressRange::from_start_and_size(0x7000_0100, 0x80);
    let () = cache.borrow_mut().load_code(code, "Foo.run").unwrap();
    let mapping = tracker
        .find_user_mapping_for_address(9, 0x7000_0110)
        .unwrap()
        .unwrap();
    let rel_pc = tracker.mapping(mapping).unwrap().to_relative_pc(0x7000_0110);
    let foo = tracker.intern_frame(mapping, rel_pc, "").unwrap();

    let () = cache.borrow_mut().load_code(code, "Bar.run").unwrap();
    let bar = tracker.intern_frame(mapping, rel_pc, "").unwrap();
    assert_ne!(foo, bar);
    assert_eq!(tracker.find_frame_ids(mapping, rel_pc), &[foo, bar]);

    let names = tracker
        .find_frame_ids(mapping, rel_pc)
        .iter()
        .map(|frame| {
            let row = tracker.storage().frames().get(*frame).unwrap();
            tracker.storage().string(row.name).to_string()
        })
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Foo.run", "Bar.run"]);
}

/// Check that mappings can be correlated by name and build id.
#[test]
fn mapping_correlation() {
    let mut tracker = MappingTracker::new();
    let build_id = BuildId::from_hex("0011223344").unwrap();
    let params = CreateMappingParams::new(AddressRange::new(0x1000, 0x2000), "/lib/libc.so")
        .with_build_id(build_id.clone());
    let in_1 = tracker
        .create_user_memory_mapping(1, params.clone())
        .unwrap();
    let in_2 = tracker
        .create_user_memory_mapping(2, params.clone())
        .unwrap();
    let other = tracker.intern_memory_mapping(params.clone());
    assert_eq!(tracker.intern_memory_mapping(params), other);

    assert_eq!(
        tracker.find_mappings("/lib/libc.so", Some(&build_id)),
        &[in_1, in_2, other]
    );

    let row = tracker.storage().mappings().get(in_1).unwrap();
    assert_eq!(tracker.storage().string(row.build_id), "0011223344");
}
