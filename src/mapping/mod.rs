//! The address-space model of the kernel and of profiled processes.
//!
//! Mappings are registered with a [`MappingTracker`], which resolves
//! addresses to mappings and interns frames within them. The results
//! land in the output tables of [`TraceStorage`][crate::storage::TraceStorage].

mod jit;
mod params;
mod stack_profile;
mod tracker;
mod vmm;

pub use jit::JitCache;
pub use jit::JitDelegate;
pub use jit::JitDelegateRef;
pub use params::make_mapping_name;
pub use params::BuildId;
pub use params::CreateMappingParams;
pub use stack_profile::AncestorCallsites;
pub use stack_profile::StackProfileTracker;
pub use tracker::MappingTracker;
pub use vmm::MappingKind;
pub use vmm::VirtualMemoryMapping;
