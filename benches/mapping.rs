use std::hint::black_box;

use tracecore::mapping::CreateMappingParams;
use tracecore::mapping::MappingTracker;
use tracecore::AddressRange;
use tracecore::AddressRangeMap;

use criterion::measurement::Measurement;
use criterion::Bencher;
use criterion::BenchmarkGroup;

use rand::Rng as _;


const MAPPING_COUNT: u64 = 4096;
const MAPPING_SIZE: u64 = 0x10000;


/// Look up random addresses in a range map with many entries.
fn range_map_lookup<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let mut map = AddressRangeMap::new();
    for idx in 0..MAPPING_COUNT {
        // Leave holes between entries.
        let range = AddressRange::from_start_and_size(idx * 2 * MAPPING_SIZE, MAPPING_SIZE);
        assert!(map.emplace(range, idx));
    }

    let mut rng = rand::rng();
    let addrs = (0..1024)
        .map(|_| rng.random_range(0..MAPPING_COUNT * 2 * MAPPING_SIZE))
        .collect::<Vec<_>>();

    let () = b.iter(|| {
        for addr in &addrs {
            let _entry = black_box(map.find(black_box(*addr)));
        }
    });
}

/// Register user mappings and resolve addresses in them, end-to-end.
fn user_mapping_resolution() {
    let mut tracker = MappingTracker::new();
    for idx in 0..256 {
        let range = AddressRange::from_start_and_size(idx * MAPPING_SIZE, MAPPING_SIZE);
        let params = CreateMappingParams::new(range, format!("/lib/lib{idx}.so"));
        let _mapping = tracker.create_user_memory_mapping(1, params).unwrap();
    }

    for addr in (0..256 * MAPPING_SIZE).step_by(0x1000) {
        let mapping = tracker
            .find_user_mapping_for_address(1, black_box(addr))
            .unwrap();
        assert!(mapping.is_some());
    }
}

/// Intern frames for repeated samples in a single mapping.
fn frame_interning<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let names = (0..64).map(|idx| format!("fn{idx}")).collect::<Vec<_>>();

    let () = b.iter(|| {
        let mut tracker = MappingTracker::new();
        let kernel = tracker.get_or_create_kernel_memory_mapping_default();
        for round in 0..16u64 {
            for (idx, name) in names.iter().enumerate() {
                let rel_pc = (idx as u64) * 0x40 + round % 4;
                let _frame = tracker
                    .intern_frame(kernel, black_box(rel_pc), name)
                    .unwrap();
            }
        }
        assert_eq!(tracker.storage().frames().len(), 4 * names.len());
    });
}


pub fn benchmark<M>(group: &mut BenchmarkGroup<'_, M>)
where
    M: Measurement,
{
    bench_sub_fn!(group, range_map_lookup);
    bench_fn!(group, user_mapping_resolution);
    bench_sub_fn!(group, frame_interning);
}
