//! CGC is a lightweight conservative mark-and-sweep garbage collector for
//! single-threaded 64-bit processes.
//!
//! The collector reserves one enormous contiguous address range up front and
//! carves it into fixed-size-class regions, so an object's size, base
//! address and region are all recoverable from the raw bit pattern of a
//! pointer — including interior pointers — with a range check and a
//! multiply-high reciprocal, never a division. Physical memory is committed
//! on demand as regions grow and handed back to the OS as sweeps find dead
//! page runs.
//!
//! Logically, the crate has these parts:
//! * [Public contract](memory_manager/index.html): init, enable/disable,
//!   allocate, reallocate, explicit free, forced collection, root
//!   registration, and the pure pointer queries and tag helpers.
//! * [Heap](heap/layout/index.html): the compile-time layout, the region
//!   table and the three-tier allocation fast path (freelist pop, lazy
//!   refill from the last sweep, bump with commit-on-demand).
//! * Collector: conservative marking of the machine stack, the registered
//!   roots and everything transitively reachable, followed by a per-region
//!   reverse sweep that settles the bump frontier and returns dead pages.
//! * [VM substrate](util/memory/index.html): reserve / commit / release /
//!   advise wrappers and the stack-bounds query.
//!
//! The host program owns the contract: a single mutator thread, every
//! non-stack location holding heap pointers registered as a root, and no
//! hidden pointer storage the stack scan cannot see.

#[macro_use]
extern crate log;

pub mod heap;
pub mod memory_manager;
pub mod util;

pub(crate) mod collector;
pub(crate) mod gc;

mod error;

pub use crate::error::{GcError, ErrorHook};
pub use crate::util::address::Address;
