//! Process-global collector state.
//!
//! The region table must be resolvable from a raw address in O(1), so the
//! whole collector lives in one zero-initialized aggregate behind an
//! init-once guard. The single-threaded mutator contract is what makes the
//! unsynchronized interior mutability sound.

use std::cell::UnsafeCell;

use crate::collector::{self, mark::MarkStack, roots::RootNode};
use crate::error::{self, GcError};
use crate::heap::layout::{self, HEAP_BYTES, HEAP_START, MIN_TRIGGER, NUM_REGIONS, REGION_SIZE};
use crate::util::memory;
use crate::util::Address;

pub(crate) struct Gc {
    pub(crate) regions: [crate::heap::region::Region; NUM_REGIONS],
    pub(crate) roots: *mut RootNode,
    pub(crate) mark_stack: MarkStack,
    pub(crate) initialized: bool,
    pub(crate) enabled: bool,
    /// Bytes allocated (minus explicit frees) since the last collection.
    pub(crate) alloc_since_gc: isize,
    /// Allocation volume that triggers the next collection.
    pub(crate) trigger: usize,
    /// Live bytes measured by the last mark phase.
    pub(crate) live_bytes: usize,
    /// Root bytes scanned by the last mark phase.
    pub(crate) roots_bytes: usize,
    pub(crate) sweep_count: usize,
}

struct GcCell(UnsafeCell<Gc>);

// Safety: the public contract restricts the mutator, and with it every
// entry point of this crate, to a single thread.
unsafe impl Sync for GcCell {}

static GC: GcCell = GcCell(UnsafeCell::new(Gc::new()));

/// The collector singleton. The reference is held for at most one API call;
/// re-entry only happens through the allocation-triggered collection, which
/// threads the same borrow through.
#[allow(clippy::mut_from_ref)]
pub(crate) fn instance() -> &'static mut Gc {
    unsafe { &mut *GC.0.get() }
}

impl Gc {
    const fn new() -> Gc {
        Gc {
            regions: [const { crate::heap::region::Region::EMPTY }; NUM_REGIONS],
            roots: std::ptr::null_mut(),
            mark_stack: MarkStack::EMPTY,
            initialized: false,
            enabled: false,
            alloc_since_gc: 0,
            trigger: 0,
            live_bytes: 0,
            roots_bytes: 0,
            sweep_count: 0,
        }
    }

    /// Reserve the pool and the mark worklist, build the region table and
    /// capture this thread's stack bottom. Idempotent.
    pub(crate) fn initialize(&mut self) -> Result<(), GcError> {
        if self.initialized {
            return Ok(());
        }
        crate::util::logger::try_init();
        if cfg!(not(target_pointer_width = "64")) || std::mem::size_of::<f64>() != 8 {
            error::raise(GcError::UnsupportedPlatform);
            return Err(GcError::UnsupportedPlatform);
        }
        if let Err(e) = reserve_pool() {
            debug!("pool reservation failed: {}", e);
            error::raise(GcError::ReserveFailed);
            return Err(GcError::ReserveFailed);
        }
        if let Err(e) = self.mark_stack.reserve() {
            debug!("mark worklist reservation failed: {}", e);
            error::raise(GcError::ReserveFailed);
            return Err(GcError::ReserveFailed);
        }
        for index in 0..NUM_REGIONS {
            self.regions[index] = crate::heap::region::Region::new(index);
        }
        collector::thread_stack_bottom();
        self.trigger = MIN_TRIGGER;
        self.enabled = true;
        self.initialized = true;
        info!(
            "cgc: {} regions reserved at {} ({} GiB of address space)",
            NUM_REGIONS,
            HEAP_START,
            HEAP_BYTES >> 30
        );
        Ok(())
    }

    /// Allocate one chunk from region `index`, possibly collecting first.
    #[inline]
    pub(crate) fn alloc_index(&mut self, index: usize) -> Address {
        let size = self.regions[index].size;
        self.alloc_since_gc += size as isize;
        if self.enabled && self.alloc_since_gc > self.trigger as isize {
            collector::collect(self);
        }
        self.regions[index].allocate()
    }

    /// Resize `addr` in place when the new size stays in its size class,
    /// otherwise allocate-copy-free. On failure the old object is untouched.
    pub(crate) fn reallocate(&mut self, addr: Address, size: usize) -> Address {
        let Some(index) = layout::size_class_index(size) else {
            error::raise(GcError::SizeTooLarge);
            return Address::ZERO;
        };
        if addr.is_zero() {
            return self.alloc_index(index);
        }
        let old_index = layout::region_index(addr);
        if old_index == index {
            return addr;
        }
        let fresh = self.alloc_index(index);
        if fresh.is_zero() {
            return Address::ZERO;
        }
        let old_size = self.regions[old_index].size;
        unsafe {
            std::ptr::copy_nonoverlapping(
                addr.to_ptr::<u8>(),
                fresh.to_mut_ptr::<u8>(),
                old_size.min(size),
            );
        }
        self.free_nonnull(addr);
        fresh
    }

    /// Return a chunk to its region's freelist. No validation: freeing a
    /// foreign or already-freed pointer is undefined behavior.
    pub(crate) fn free_nonnull(&mut self, addr: Address) {
        let region = &mut self.regions[layout::region_index(addr)];
        region.push_free(addr);
        self.alloc_since_gc -= region.size as isize;
    }
}

/// Reserve the whole pool at its fixed base; kernels that refuse a single
/// multi-TiB mapping get it region by region.
fn reserve_pool() -> std::io::Result<()> {
    if memory::reserve_fixed(HEAP_START, HEAP_BYTES).is_ok() {
        return Ok(());
    }
    let mut cursor = HEAP_START;
    while cursor < layout::HEAP_END {
        memory::reserve_fixed(cursor, REGION_SIZE)?;
        cursor += REGION_SIZE;
    }
    Ok(())
}
