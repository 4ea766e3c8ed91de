//! Registered root ranges.
//!
//! A root is a memory range outside the collected heap that may hold
//! pointers into it. Static roots capture a fixed `(start, bytes)` pair at
//! registration; dynamic roots point at mutator-owned storage holding the
//! range start and element count, which the mutator may rewrite at any time
//! between collections. Nodes come from the host allocator, never from the
//! pool, and registration is permanent.

use crate::error::{self, GcError};
use crate::gc::Gc;
use crate::heap::layout::MAX_ROOT_SIZE;
use crate::util::Address;

#[repr(C)]
pub(crate) struct RootNode {
    /// Backing storage for static roots; the indirections below point here.
    static_start: Address,
    static_count: usize,
    /// Location holding the current range start.
    start_loc: *const Address,
    /// Location holding the current element count.
    count_loc: *const usize,
    elem_size: usize,
    pub(crate) next: *mut RootNode,
}

impl RootNode {
    /// The byte range this root currently covers. Dynamic roots are clamped
    /// to `MAX_ROOT_SIZE` here because their count is only known at scan
    /// time.
    pub(crate) fn range(&self) -> (Address, usize) {
        let start = unsafe { *self.start_loc };
        let bytes = unsafe { *self.count_loc }
            .saturating_mul(self.elem_size)
            .min(MAX_ROOT_SIZE);
        (start, bytes)
    }
}

impl Gc {
    /// Record a fixed root range.
    pub(crate) fn register_root(&mut self, start: Address, bytes: usize) -> Result<(), GcError> {
        if bytes > MAX_ROOT_SIZE {
            error::raise(GcError::RootTooLarge);
            return Err(GcError::RootTooLarge);
        }
        let node = Box::into_raw(Box::new(RootNode {
            static_start: start,
            static_count: bytes,
            start_loc: std::ptr::null(),
            count_loc: std::ptr::null(),
            elem_size: 1,
            next: self.roots,
        }));
        // The indirections point back into the node itself, so static and
        // dynamic roots share one scan path.
        unsafe {
            (*node).start_loc = std::ptr::addr_of!((*node).static_start);
            (*node).count_loc = std::ptr::addr_of!((*node).static_count);
        }
        self.roots = node;
        Ok(())
    }

    /// Record an indirect root: `start_loc` holds the range start and
    /// `count_loc` the current element count, both owned by the mutator.
    pub(crate) fn register_dynamic_root(
        &mut self,
        start_loc: Address,
        count_loc: Address,
        elem_size: usize,
    ) -> Result<(), GcError> {
        let node = Box::into_raw(Box::new(RootNode {
            static_start: Address::ZERO,
            static_count: 0,
            start_loc: start_loc.to_ptr(),
            count_loc: count_loc.to_ptr(),
            elem_size,
            next: self.roots,
        }));
        self.roots = node;
        Ok(())
    }
}
