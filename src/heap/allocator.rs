//! Region allocation fast paths.
//!
//! Three tiers, cheapest first: pop the freelist, lazily refill the freelist
//! from the last sweep's mark bitmap, then bump-allocate from untouched
//! space, growing the committed range when the bump frontier crosses it.
//! Returned chunks are not zeroed; pages fresh from the OS (or discarded
//! back to it during sweep) read as zeros on first touch, recycled chunks
//! keep their old contents.

use crate::error::{self, GcError};
use crate::heap::layout::{FREELIST_REFILL, PROTECT_GRAIN};
use crate::heap::region::Region;
use crate::util::constants::*;
use crate::util::conversions;
use crate::util::memory;
use crate::util::Address;

impl Region {
    /// Hand out one chunk, or `ZERO` when the region cannot grow.
    pub(crate) fn allocate(&mut self) -> Address {
        let chunk = self.pop_free();
        if !chunk.is_zero() {
            return chunk;
        }
        if self.mark_start < self.mark_end {
            self.refill_freelist();
            let chunk = self.pop_free();
            if !chunk.is_zero() {
                return chunk;
            }
        }
        self.bump()
    }

    /// Walk the swept window for up to `FREELIST_REFILL` unmarked chunks and
    /// move them onto the freelist.
    fn refill_freelist(&mut self) {
        let mut cursor = self.mark_start;
        let mut found = 0;
        while cursor < self.mark_end && found < FREELIST_REFILL {
            if !self.is_marked(self.chunk_offset(cursor)) {
                self.push_free(cursor);
                found += 1;
            }
            cursor += self.size;
        }
        self.mark_start = cursor;
        trace!(
            "refill: {} chunks of {} bytes, window now [{}, {})",
            found,
            self.size,
            self.mark_start,
            self.mark_end
        );
    }

    /// Take the next never-used chunk, committing pages as needed.
    fn bump(&mut self) -> Address {
        let result = self.free;
        if result + self.size > self.end {
            error::raise(GcError::OutOfRegionSpace);
            return Address::ZERO;
        }
        if result + self.size > self.protect && !self.grow_protect(result + self.size) {
            return Address::ZERO;
        }
        self.free = result + self.size;
        result
    }

    /// Extend the committed range to cover at least `until`, growing by no
    /// less than `PROTECT_GRAIN` pages or one chunk.
    fn grow_protect(&mut self, until: Address) -> bool {
        let commit_start = conversions::page_align_down(self.protect);
        let grain = commit_start + PROTECT_GRAIN * BYTES_IN_PAGE;
        let mut commit_end = conversions::page_align_up(until).max(grain);
        if commit_end > self.end {
            commit_end = self.end;
        }
        if let Err(e) = memory::commit(commit_start, commit_end - commit_start) {
            debug!("commit of [{}, {}) failed: {}", commit_start, commit_end, e);
            error::raise(GcError::CommitFailed);
            return false;
        }
        trace!(
            "commit: region of {} byte chunks grew to {}",
            self.size,
            commit_end
        );
        self.protect = commit_end;
        true
    }
}
