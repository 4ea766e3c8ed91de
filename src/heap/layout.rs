//! Compile-time heap layout.
//!
//! The collector owns one contiguous reservation of `NUM_REGIONS` regions of
//! `REGION_SIZE` bytes each, starting at `HEAP_START`. Every region holds
//! chunks of a single fixed size, so an object's size, base address and
//! region index can all be recovered from the raw bit pattern of a pointer.
//!
//! Regions are split into three bands of `BAND_REGIONS` each. Chunk sizes
//! step by `UNIT` in the small band, `BIG_UNIT` in the big band and
//! `HUGE_UNIT` in the huge band, so region `i` of a band serves chunks of
//! `(i + 1) * step` bytes.

use crate::util::constants::*;
use crate::util::Address;

/// log2 of the virtual-address span owned by one region.
pub const LOG_REGION_SIZE: usize = 32;
/// The virtual-address span owned by one region (4 GiB).
pub const REGION_SIZE: usize = 1 << LOG_REGION_SIZE;
/// Total number of regions, i.e. of distinct size classes.
pub const NUM_REGIONS: usize = 768;
/// Regions per band (small / big / huge).
pub const BAND_REGIONS: usize = NUM_REGIONS / 3;

/// Every returned pointer is aligned to this.
pub const ALIGNMENT: usize = 16;
/// Chunk-size step of the small band.
pub const UNIT: usize = ALIGNMENT;
/// Chunk-size step of the big band; also the small band's largest chunk.
pub const BIG_UNIT: usize = BAND_REGIONS * UNIT;
/// Chunk-size step of the huge band; also the big band's largest chunk.
pub const HUGE_UNIT: usize = BAND_REGIONS * BIG_UNIT;
/// The largest serviceable request.
pub const MAX_ALLOC_SIZE: usize = BAND_REGIONS * HUGE_UNIT;

/// Base of the reserved pool; region 0 starts here.
pub const HEAP_START: Address = unsafe { Address::from_usize(0x0000_0200_0000_0000) };
/// Total reserved virtual-address span.
pub const HEAP_BYTES: usize = REGION_SIZE * NUM_REGIONS;
/// One past the reserved pool.
pub const HEAP_END: Address = HEAP_START.add(HEAP_BYTES);

static_assertions::const_assert_eq!(NUM_REGIONS % 3, 0);
static_assertions::const_assert_eq!(HEAP_START.as_usize() % REGION_SIZE, 0);
// The whole pool must fit in the canonical low half of a 48-bit VA space,
// and the complement of any pool address must land outside the pool (the
// freelist links rely on it).
static_assertions::const_assert!(HEAP_END.as_usize() < 1 << 47);

// --- collector tuning ---

/// The collection trigger is the live-ish byte estimate divided by this.
pub const GROWTH_FACTOR: f64 = 1.75;
/// Floor for the collection trigger, in bytes.
pub const MIN_TRIGGER: usize = 100_000;
/// Unmarked chunks moved onto the freelist per lazy refill.
pub const FREELIST_REFILL: usize = 256;
/// Minimum commit growth, in pages.
pub const PROTECT_GRAIN: usize = 16;
/// Virtual address space reserved for the mark worklist.
pub const MARK_STACK_BYTES: usize = BYTES_IN_GBYTE;
/// Physical pages are returned to the OS every RETURN_PERIOD-th sweep
/// (always, for the big and huge bands).
pub const RETURN_PERIOD: usize = 8;
/// Largest acceptable root range, in bytes.
pub const MAX_ROOT_SIZE: usize = BYTES_IN_GBYTE;
/// Children pushed while scanning one interval before the marker swaps to
/// the deepest child to bound worklist depth.
pub const MAX_PUSH_PER_FRAME: usize = 1024;

/// Does `addr` point into the reserved pool? A single unsigned comparison
/// bounds the pool on both sides: for `addr` below the pool the subtraction
/// underflows far past `HEAP_BYTES`.
#[inline(always)]
pub fn is_heap_address(addr: Address) -> bool {
    addr.as_usize().wrapping_sub(HEAP_START.as_usize()) < HEAP_BYTES
}

/// Region index of an address. Only meaningful when [`is_heap_address`]
/// holds.
#[inline(always)]
pub fn region_index(addr: Address) -> usize {
    (addr.as_usize() >> LOG_REGION_SIZE) - (HEAP_START.as_usize() >> LOG_REGION_SIZE)
}

/// Chunk size served by region `index`.
pub const fn chunk_size(index: usize) -> usize {
    if index < BAND_REGIONS {
        UNIT * (index + 1)
    } else if index < 2 * BAND_REGIONS {
        BIG_UNIT * (index - BAND_REGIONS + 1)
    } else {
        HUGE_UNIT * (index - 2 * BAND_REGIONS + 1)
    }
}

/// Region index serving a request of `size` bytes, or `None` beyond the
/// largest class. For a constant `size` this folds to a constant index.
#[inline(always)]
pub fn size_class_index(size: usize) -> Option<usize> {
    if size <= BIG_UNIT {
        // A zero-size request shares the smallest class.
        Some(size.saturating_sub(1) / UNIT)
    } else if size <= HUGE_UNIT {
        Some(BAND_REGIONS + (size - 1) / BIG_UNIT)
    } else if size <= MAX_ALLOC_SIZE {
        Some(2 * BAND_REGIONS + (size - 1) / HUGE_UNIT)
    } else {
        None
    }
}
