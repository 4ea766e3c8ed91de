//! The public contract of the collector.
//!
//! Hosts call [`init`] once from their main thread, allocate with [`alloc`]
//! / [`realloc`] / [`free`], and register every non-stack location that may
//! hold heap pointers with [`register_root`] or [`register_dynamic_root`].
//! Collection runs automatically inside `alloc` once enough has been
//! allocated, or on demand via [`collect`]; [`disable`] suppresses only the
//! automatic cycles.
//!
//! The whole crate assumes a single mutator thread. While a collection
//! runs, that thread belongs to the collector; there are no other
//! suspension points.

use crate::collector;
use crate::error::{self, GcError};
use crate::gc;
use crate::heap::layout::{self, ALIGNMENT};
use crate::util::Address;

pub use crate::error::{last_error, take_last_error, ErrorHook};

/// Set up the collector: reserve the pool, build the region table and
/// capture the calling thread's stack bottom. Idempotent; must precede any
/// other call. Reservation failures are fatal and abort after the error
/// hook runs.
pub fn init() -> Result<(), GcError> {
    gc::instance().initialize()
}

/// Allow automatic collection (the default).
pub fn enable() {
    gc::instance().enabled = true;
}

/// Suppress automatic collection. Explicit [`collect`] calls still run.
pub fn disable() {
    gc::instance().enabled = false;
}

/// Is automatic collection currently allowed?
pub fn is_enabled() -> bool {
    gc::instance().enabled
}

/// Force a full mark-and-sweep cycle. A no-op before [`init`].
pub fn collect() {
    let gc = gc::instance();
    if gc.initialized {
        collector::collect(gc);
    }
}

/// Allocate `size` bytes. The result is `ALIGNMENT`-aligned, uninitialized,
/// and reclaimed automatically once unreachable. Returns `Address::ZERO`
/// when the size class is exhausted or commit fails; see [`last_error`].
#[inline]
pub fn alloc(size: usize) -> Address {
    let gc = gc::instance();
    if !gc.initialized && gc.initialize().is_err() {
        return Address::ZERO;
    }
    match layout::size_class_index(size) {
        Some(index) => gc.alloc_index(index),
        None => {
            error::raise(GcError::SizeTooLarge);
            Address::ZERO
        }
    }
}

/// Resize an allocation. With a null `addr` this is [`alloc`]; when `size`
/// stays in the same size class the pointer is returned unchanged; otherwise
/// the contents move to a fresh chunk and the old one is freed. On failure
/// returns `Address::ZERO` and leaves the old allocation valid.
pub fn realloc(addr: Address, size: usize) -> Address {
    let gc = gc::instance();
    if !gc.initialized && gc.initialize().is_err() {
        return Address::ZERO;
    }
    gc.reallocate(addr, size)
}

/// Eagerly return an allocation to its region's freelist. Null-tolerant.
/// Freeing a pointer not obtained from [`alloc`], or freeing twice, is
/// undefined behavior.
pub fn free(addr: Address) {
    if !addr.is_zero() {
        gc::instance().free_nonnull(addr);
    }
}

/// Record `[start, start + bytes)` as a root. Rejects ranges larger than
/// `MAX_ROOT_SIZE`. Roots cannot be unregistered.
pub fn register_root(start: Address, bytes: usize) -> Result<(), GcError> {
    gc::instance().register_root(start, bytes)
}

/// Record an indirect root. `start_loc` holds the range's start address and
/// `count_loc` its current element count; the mutator may rewrite both at
/// any time between collections.
pub fn register_dynamic_root(
    start_loc: Address,
    count_loc: Address,
    elem_size: usize,
) -> Result<(), GcError> {
    gc::instance().register_dynamic_root(start_loc, count_loc, elem_size)
}

/// Install (or with `None`, remove) a hook invoked on every raised error.
/// If the hook returns from a fatal error the process aborts.
pub fn set_error_handler(hook: Option<ErrorHook>) {
    error::set_hook(hook);
}

/// Does `addr` point into the collected heap? True for any interior
/// pointer, tagged or not.
#[inline(always)]
pub fn is_gc_ptr(addr: Address) -> bool {
    layout::is_heap_address(addr)
}

/// The chunk size of the allocation containing `addr` — at least the
/// requested size, rounded up to the size class. Zero for foreign pointers.
#[inline(always)]
pub fn size_of(addr: Address) -> usize {
    if !layout::is_heap_address(addr) {
        return 0;
    }
    gc::instance().regions[layout::region_index(addr)].size
}

/// The base address of the allocation containing `addr`, for any interior
/// pointer. `Address::ZERO` for foreign pointers.
#[inline(always)]
pub fn base_of(addr: Address) -> Address {
    if !layout::is_heap_address(addr) {
        return Address::ZERO;
    }
    gc::instance().regions[layout::region_index(addr)].chunk_base(addr)
}

/// Stash `tag` (below `ALIGNMENT`) in the alignment bits of an object base.
#[inline(always)]
pub fn set_tag(addr: Address, tag: usize) -> Address {
    debug_assert!(tag < ALIGNMENT);
    unsafe { Address::from_usize(addr.as_usize() | tag) }
}

/// Extract the alignment-bit tag.
#[inline(always)]
pub fn get_tag(addr: Address) -> usize {
    addr.as_usize() & (ALIGNMENT - 1)
}

/// Remove the alignment-bit tag.
#[inline(always)]
pub fn strip_tag(addr: Address) -> Address {
    addr.align_down(ALIGNMENT)
}

/// Encode an arbitrary in-object offset (below the chunk size) into the
/// pointer itself. The marker accepts any interior pointer, so tagged
/// pointers keep their objects alive.
#[inline(always)]
pub fn set_ext_tag(addr: Address, tag: usize) -> Address {
    debug_assert!(tag < size_of(addr));
    base_of(addr) + tag
}

/// Recover the in-object offset of an interior pointer.
#[inline(always)]
pub fn get_ext_tag(addr: Address) -> usize {
    addr - base_of(addr)
}
