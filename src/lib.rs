//! **tracecore** is the structural core of a trace-analysis engine.
//!
//! It provides two largely independent pieces of functionality:
//! - an address-space model of profiled processes and the kernel
//!   ([`mapping::MappingTracker`]), which interns raw program counter
//!   samples into frames stored in [`storage::TraceStorage`]
//! - a cost-aware adapter exposing columnar tables to an embedded SQL
//!   engine ([`db::DbSqliteTable`]), pushing constraints and orderings
//!   down into the column store
//!
//! The two halves only meet through tables: the mapping half writes rows
//! into its output tables, which can be exported as
//! [`db::ColumnTable`] objects and queried through the adapter.
//!
//! ```
//! use tracecore::mapping::CreateMappingParams;
//! use tracecore::mapping::MappingTracker;
//! use tracecore::AddressRange;
//!
//! let mut tracker = MappingTracker::new();
//! let params = CreateMappingParams::new(AddressRange::new(0x8000_0000, 0x8000_1000), "/kernel");
//! let kernel = tracker.create_kernel_memory_mapping(params).unwrap();
//! let foo = tracker.intern_frame(kernel, 0x10, "foo").unwrap();
//! let bar = tracker.intern_frame(kernel, 0x10, "bar").unwrap();
//! assert_ne!(foo, bar);
//! assert_eq!(tracker.find_frame_ids(kernel, 0x10), &[foo, bar]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod db;
mod error;
pub mod mapping;
mod range;
pub mod storage;
mod util;

pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoError;
pub use crate::error::Result;
pub use crate::range::AddressRange;
pub use crate::range::AddressRangeMap;


/// A type representing addresses.
pub type Addr = u64;


/// Unique identity of a profiled process within one trace-processing
/// session.
///
/// Unlike a PID, a `Upid` is never reused over the lifetime of a
/// session.
pub type Upid = u32;


#[cfg(feature = "tracing")]
#[macro_use]
#[allow(unused_imports)]
mod log {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::error;
    pub(crate) use tracing::info;
    pub(crate) use tracing::instrument;
    pub(crate) use tracing::trace;
    pub(crate) use tracing::warn;
}

#[cfg(not(feature = "tracing"))]
#[macro_use]
#[allow(unused_imports)]
mod log {
    macro_rules! debug {
        ($($args:tt)*) => {{
          if false {
            // Make sure to use `args` to prevent any warnings about
            // unused variables.
            let _args = format_args!($($args)*);
          }
        }};
    }
    pub(crate) use debug;
    pub(crate) use debug as error;
    pub(crate) use debug as info;
    pub(crate) use debug as trace;
    pub(crate) use debug as warn;
}
