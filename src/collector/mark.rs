//! Conservative mark phase.
//!
//! Every aligned word in the stack, the registered roots and each reached
//! object is treated as a potential pointer. A word survives three filters —
//! the pool range check, the region's `[start, free)` bounds, and a fresh
//! mark bit — before the chunk it lands in is pushed for scanning. The
//! worklist is a descending stack of `(cursor, end)` intervals in its own
//! address-space reservation; a depth throttle swaps the interval being
//! scanned with its deepest child so pointer-dense objects cannot pile up
//! unbounded entries.

use std::io;
use std::mem;

use crate::error::{self, GcError};
use crate::gc::Gc;
use crate::heap::layout::{self, MARK_STACK_BYTES, MAX_PUSH_PER_FRAME};
use crate::util::constants::*;
use crate::util::memory;
use crate::util::Address;

/// Half-open interval of words awaiting a conservative scan.
#[repr(C)]
#[derive(Clone, Copy)]
struct ScanRange {
    cursor: Address,
    end: Address,
}

/// The mark worklist: a stack growing downward through a dedicated
/// reservation, so its peak footprint costs address space, not memory.
pub(crate) struct MarkStack {
    lo: Address,
    hi: Address,
    top: Address,
}

impl MarkStack {
    pub(crate) const EMPTY: MarkStack = MarkStack {
        lo: Address::ZERO,
        hi: Address::ZERO,
        top: Address::ZERO,
    };

    pub(crate) fn reserve(&mut self) -> io::Result<()> {
        self.lo = memory::reserve_anywhere(MARK_STACK_BYTES)?;
        self.hi = self.lo + MARK_STACK_BYTES;
        self.top = self.hi;
        Ok(())
    }

    fn push(&mut self, range: ScanRange) -> bool {
        if self.top == self.lo {
            return false;
        }
        self.top -= mem::size_of::<ScanRange>();
        unsafe { self.top.store(range) };
        true
    }

    fn pop(&mut self) -> Option<ScanRange> {
        if self.top == self.hi {
            return None;
        }
        let range = unsafe { self.top.load::<ScanRange>() };
        self.top += mem::size_of::<ScanRange>();
        Some(range)
    }

    /// Replace the newest entry with `range`, returning the old entry.
    fn swap_top(&mut self, range: ScanRange) -> ScanRange {
        debug_assert!(self.top < self.hi);
        let deepest = unsafe { self.top.load::<ScanRange>() };
        unsafe { self.top.store(range) };
        deepest
    }
}

impl Gc {
    /// Mark everything reachable from `[stack_top, stack_bottom)` and the
    /// registered roots, accumulating `live_bytes` and `roots_bytes` for the
    /// trigger computation.
    pub(crate) fn mark_phase(&mut self, stack_top: Address, stack_bottom: Address) {
        for index in 0..layout::NUM_REGIONS {
            let region = &mut self.regions[index];
            if region.free > region.start {
                if let Err(e) = region.prepare_mark_bits() {
                    debug!("mark bitmap for {} byte chunks: {}", region.size, e);
                    error::raise(GcError::MarkBitmapFailed);
                }
            }
        }
        self.live_bytes = 0;
        self.roots_bytes = 0;

        // The machine stack is a synthetic root ahead of the registered
        // chain.
        debug_assert!(stack_top <= stack_bottom);
        self.scan(stack_top, stack_bottom);

        let mut node = self.roots;
        while !node.is_null() {
            let (start, bytes) = unsafe { (*node).range() };
            self.roots_bytes += bytes;
            self.scan(start, start + bytes);
            node = unsafe { (*node).next };
        }
    }

    /// Conservatively scan `[start, end)` and drain everything it
    /// transitively pushes onto the worklist.
    fn scan(&mut self, start: Address, end: Address) {
        let mut cursor = start.align_up(BYTES_IN_WORD);
        let mut limit = end;
        let mut pushes = 0usize;
        loop {
            while cursor + BYTES_IN_WORD <= limit {
                let word = unsafe { cursor.load::<usize>() };
                cursor += BYTES_IN_WORD;
                let addr = unsafe { Address::from_usize(word) };
                // One unsigned comparison rejects almost all integer noise.
                if !layout::is_heap_address(addr) {
                    continue;
                }
                let region = &mut self.regions[layout::region_index(addr)];
                if addr < region.start || addr >= region.free {
                    continue;
                }
                let chunk = region.chunk_offset(addr);
                if region.test_and_set_mark(chunk) {
                    continue;
                }
                let base = region.chunk_base(addr);
                let size = region.size;
                self.live_bytes += size;
                if !self.mark_stack.push(ScanRange {
                    cursor: base,
                    end: base + size,
                }) {
                    error::raise(GcError::MarkStackExhausted);
                }
                pushes += 1;
                if pushes > MAX_PUSH_PER_FRAME {
                    // Dive instead of broadening: shelve the rest of this
                    // interval and continue in the deepest child.
                    let child = self.mark_stack.swap_top(ScanRange { cursor, end: limit });
                    cursor = child.cursor;
                    limit = child.end;
                    pushes = 0;
                }
            }
            match self.mark_stack.pop() {
                Some(range) => {
                    cursor = range.cursor;
                    limit = range.end;
                    pushes = 0;
                }
                None => break,
            }
        }
    }
}
