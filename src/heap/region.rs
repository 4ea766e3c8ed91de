//! Per-size-class regions.
//!
//! A region owns a 4 GiB slice of the reserved pool and serves chunks of one
//! fixed size. The record tracks four frontiers: `free` (chunks ever handed
//! out), `protect` (bytes committed read/write), and the `mark_start` /
//! `mark_end` window of swept-but-not-yet-freelisted chunks. Address-to-chunk
//! arithmetic never divides: each region stores `⌊2^128 / size⌋ + 1` and
//! recovers `addr / size` as the high 64 bits of a widening product.

use std::io;

use crate::heap::layout::{self, LOG_REGION_SIZE, REGION_SIZE};
use crate::util::constants::*;
use crate::util::memory;
use crate::util::Address;

/// One size class: a fixed slice of the reserved pool plus its allocation
/// and mark state. Fields are crate-internal; the public API exposes only
/// derived queries.
pub(crate) struct Region {
    /// Chunk size in bytes.
    pub(crate) size: usize,
    /// `⌊2^128 / size⌋ + 1`, the multiply-high reciprocal of `size`.
    pub(crate) inv_size: u128,
    /// First chunk: the region base aligned up to `size`.
    pub(crate) start: Address,
    /// One past the region's address slice.
    pub(crate) end: Address,
    /// Bump frontier: one past the last chunk ever handed out.
    pub(crate) free: Address,
    /// Commit frontier: one past the last byte accessible without faulting.
    pub(crate) protect: Address,
    /// Freelist head; the link word inside each chunk is stored complemented
    /// so a conservative scan cannot follow the chain.
    pub(crate) freelist: Address,
    /// Lazy-refill window: swept chunks in `[mark_start, mark_end)` have not
    /// been pushed onto the freelist yet.
    pub(crate) mark_start: Address,
    pub(crate) mark_end: Address,
    /// Mark bitmap, one bit per chunk; `ZERO` until the first collection
    /// touches this region.
    pub(crate) mark_bits: Address,
    /// `chunk_index(start)`; subtracted to get 0-based in-region indices.
    pub(crate) start_index: usize,
}

impl Region {
    pub(crate) const EMPTY: Region = Region {
        size: 0,
        inv_size: 0,
        start: Address::ZERO,
        end: Address::ZERO,
        free: Address::ZERO,
        protect: Address::ZERO,
        freelist: Address::ZERO,
        mark_start: Address::ZERO,
        mark_end: Address::ZERO,
        mark_bits: Address::ZERO,
        start_index: 0,
    };

    pub(crate) fn new(index: usize) -> Region {
        let size = layout::chunk_size(index);
        let base = layout::HEAP_START.as_usize() + (index << LOG_REGION_SIZE);
        let start = unsafe { Address::from_usize(base.next_multiple_of(size)) };
        let end = unsafe { Address::from_usize(base + REGION_SIZE) };
        let inv_size = (u128::MAX / size as u128) + 1;
        let mut region = Region {
            size,
            inv_size,
            start,
            end,
            free: start,
            protect: start,
            freelist: Address::ZERO,
            mark_start: start,
            mark_end: start,
            mark_bits: Address::ZERO,
            start_index: 0,
        };
        region.start_index = region.chunk_index(start);
        debug_assert_eq!(region.start_index, start.as_usize() / size);
        region
    }

    /// `addr / size` without a division: the high 64 bits of the 192-bit
    /// product `addr * inv_size`.
    #[inline(always)]
    pub(crate) fn chunk_index(&self, addr: Address) -> usize {
        let p = addr.as_usize() as u128;
        let lo = self.inv_size as u64 as u128;
        let hi = (self.inv_size >> 64) as u64 as u128;
        let carry = (p * lo) >> 64;
        ((p * hi + carry) >> 64) as usize
    }

    /// 0-based chunk index of `addr` within this region.
    #[inline(always)]
    pub(crate) fn chunk_offset(&self, addr: Address) -> usize {
        self.chunk_index(addr) - self.start_index
    }

    /// Base address of the chunk containing `addr`, for any interior
    /// pointer.
    #[inline(always)]
    pub(crate) fn chunk_base(&self, addr: Address) -> Address {
        unsafe { Address::from_usize(self.chunk_index(addr) * self.size) }
    }

    /// Push a chunk onto the freelist, hiding the link from the marker.
    #[inline]
    pub(crate) fn push_free(&mut self, chunk: Address) {
        unsafe { chunk.store::<usize>(!self.freelist.as_usize()) };
        self.freelist = chunk;
    }

    /// Pop the freelist head, or `ZERO` when the list is empty.
    #[inline]
    pub(crate) fn pop_free(&mut self) -> Address {
        let head = self.freelist;
        if !head.is_zero() {
            self.freelist = unsafe { Address::from_usize(!head.load::<usize>()) };
        }
        head
    }

    /// Bitmap bytes covering every chunk this region could ever serve.
    fn mark_bits_bytes(&self) -> usize {
        REGION_SIZE / (self.size * BITS_IN_BYTE)
    }

    /// Make the mark bitmap ready for a collection: reserve it on first use,
    /// otherwise zero the prefix covering the chunks handed out so far by
    /// dropping those pages back to the OS.
    pub(crate) fn prepare_mark_bits(&mut self) -> io::Result<()> {
        if self.mark_bits.is_zero() {
            self.mark_bits = memory::reserve_anywhere(self.mark_bits_bytes() + BYTES_IN_PAGE)?;
            return Ok(());
        }
        let used_chunks = (self.free - self.start) / self.size;
        let prefix = crate::util::conversions::raw_align_up(
            used_chunks.div_ceil(BITS_IN_BYTE),
            BYTES_IN_PAGE,
        );
        if prefix > 0 {
            memory::advise_discardable(self.mark_bits, prefix)?;
        }
        Ok(())
    }

    /// Set the mark bit for in-region chunk index `chunk`; true if it was
    /// already set.
    #[inline(always)]
    pub(crate) fn test_and_set_mark(&mut self, chunk: usize) -> bool {
        let word = self.mark_bits + (chunk >> LOG_BITS_IN_WORD) * BYTES_IN_WORD;
        let mask = 1usize << (chunk & (BITS_IN_WORD - 1));
        let bits = unsafe { word.load::<usize>() };
        if bits & mask != 0 {
            return true;
        }
        unsafe { word.store(bits | mask) };
        false
    }

    /// Is the mark bit for in-region chunk index `chunk` set?
    #[inline(always)]
    pub(crate) fn is_marked(&self, chunk: usize) -> bool {
        let word = self.mark_bits + (chunk >> LOG_BITS_IN_WORD) * BYTES_IN_WORD;
        let mask = 1usize << (chunk & (BITS_IN_WORD - 1));
        unsafe { word.load::<usize>() & mask != 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::layout::{BAND_REGIONS, NUM_REGIONS};

    #[test]
    fn reciprocal_matches_division() {
        // One region per band plus the extremes and a few non-power-of-two
        // chunk sizes, probed across their whole address slice.
        for index in [0, 2, 255, 256, 300, 511, 512, 600, NUM_REGIONS - 1] {
            let region = Region::new(index);
            let probes = [
                region.start,
                region.start + region.size,
                region.start + 7 * region.size + 1,
                region.start + (region.size - 1),
                region.end.sub(1),
                region.end.sub(region.size),
            ];
            for addr in probes {
                assert_eq!(
                    region.chunk_index(addr),
                    addr.as_usize() / region.size,
                    "region {} size {} addr {}",
                    index,
                    region.size,
                    addr
                );
            }
        }
    }

    #[test]
    fn chunk_base_floors_interior_pointers() {
        let region = Region::new(2); // 48-byte chunks: start is not page aligned
        let base = region.start + 10 * region.size;
        for offset in [0, 1, 17, region.size - 1] {
            assert_eq!(region.chunk_base(base + offset), base);
        }
    }

    #[test]
    fn start_is_chunk_aligned() {
        for index in [0, 2, 17, 255, 256, 511, 512, NUM_REGIONS - 1] {
            let region = Region::new(index);
            assert_eq!(region.start.as_usize() % region.size, 0);
            assert!(region.start.as_usize() - (region.start.as_usize() & !(REGION_SIZE - 1)) < region.size);
        }
    }

    #[test]
    fn band_sizes() {
        assert_eq!(Region::new(0).size, 16);
        assert_eq!(Region::new(1).size, 32);
        assert_eq!(Region::new(BAND_REGIONS).size, layout::BIG_UNIT);
        assert_eq!(Region::new(2 * BAND_REGIONS).size, layout::HUGE_UNIT);
    }

    #[test]
    fn hidden_links_stay_out_of_the_heap() {
        // The complement of any pool address, and of null, must fail the
        // pointer test; otherwise the marker could chase freelist chains.
        let region = Region::new(0);
        for addr in [region.start, region.end.sub(16), Address::ZERO] {
            let hidden = !addr.as_usize();
            assert!(!layout::is_heap_address(unsafe { Address::from_usize(hidden) }));
        }
    }
}
