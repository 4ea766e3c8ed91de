//! Sweep phase.
//!
//! Each region is swept independently, walking chunk indices downward from
//! the bump frontier. The walk settles the new frontier just past the
//! highest marked chunk, but never below the halfway watermark, so an
//! oscillating live set cannot thrash the frontier. Dead runs of three or
//! more pages have their page-aligned interior advised back to the OS —
//! on every sweep for the big and huge bands, every `RETURN_PERIOD`-th
//! sweep for the small band. Freelists are emptied; allocation rebuilds
//! them lazily from the mark bitmap.

use crate::gc::Gc;
use crate::heap::layout::{BAND_REGIONS, NUM_REGIONS, RETURN_PERIOD};
use crate::heap::region::Region;
use crate::util::constants::*;
use crate::util::memory;
use crate::util::Address;

impl Gc {
    pub(crate) fn sweep_phase(&mut self) {
        self.sweep_count += 1;
        let returning = self.sweep_count % RETURN_PERIOD == 0;
        for index in 0..NUM_REGIONS {
            let region = &mut self.regions[index];
            if region.free > region.start {
                region.sweep(returning || index >= BAND_REGIONS);
            }
        }
    }
}

impl Region {
    /// Reverse walk over the mark bitmap: settle the bump frontier, return
    /// dead page runs, and reset the lazy-refill window.
    pub(crate) fn sweep(&mut self, returning: bool) {
        let last = (self.free - self.start) / self.size - 1;
        let target = last / 2;
        let mut index = last;
        let mut run_lo = Address::ZERO;
        let mut run_bytes = 0usize;
        let mut new_free = Address::ZERO;
        loop {
            let chunk = self.start + index * self.size;
            if self.is_marked(index) {
                self.return_run(run_lo, run_bytes);
                run_bytes = 0;
                if new_free.is_zero() {
                    new_free = chunk + self.size;
                    if !returning {
                        break;
                    }
                }
            } else {
                run_lo = chunk;
                run_bytes += self.size;
            }
            if index <= target {
                // Watermark reached: flush the open run, and if nothing was
                // marked let the frontier shrink at most to here.
                self.return_run(run_lo, run_bytes);
                if new_free.is_zero() {
                    new_free = chunk + self.size;
                }
                break;
            }
            index -= 1;
        }
        self.free = new_free;
        self.mark_start = self.start;
        self.mark_end = self.free;
        self.freelist = Address::ZERO;
    }

    /// Advise the page-aligned interior of a dead run back to the OS.
    fn return_run(&self, run_lo: Address, run_bytes: usize) {
        if run_bytes < 3 * BYTES_IN_PAGE {
            return;
        }
        let lo = run_lo.align_up(BYTES_IN_PAGE);
        let hi = (run_lo + run_bytes).align_down(BYTES_IN_PAGE);
        if lo < hi && memory::advise_discardable(lo, hi - lo).is_ok() {
            trace!("returned [{}, {}) to the OS", lo, hi);
        }
    }
}
