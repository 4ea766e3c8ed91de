//! Stop-the-world collection cycle.
//!
//! A cycle runs entirely on the mutator's thread: flush registers onto the
//! stack, capture the stack top in a non-inlined frame, mark from the stack
//! and the registered roots, then sweep every region and recompute the
//! allocation trigger.

pub(crate) mod mark;
pub(crate) mod roots;
pub(crate) mod sweep;

use std::cell::Cell;

use crate::error::{self, GcError};
use crate::gc::Gc;
use crate::heap::layout::{GROWTH_FACTOR, MIN_TRIGGER};
use crate::util::memory;
use crate::util::Address;

thread_local! {
    /// Highest address of this thread's stack, queried once per thread.
    static STACK_BOTTOM: Cell<Address> = const { Cell::new(Address::ZERO) };
}

/// The stack bottom of the current thread, cached on first use. Raises a
/// fatal error when the platform cannot report the stack bounds.
pub(crate) fn thread_stack_bottom() -> Address {
    STACK_BOTTOM.with(|slot| {
        let cached = slot.get();
        if !cached.is_zero() {
            return cached;
        }
        match memory::stack_bottom() {
            Ok(bottom) => {
                slot.set(bottom);
                bottom
            }
            Err(e) => {
                debug!("stack bounds query failed: {}", e);
                error::raise(GcError::StackBoundsFailed);
                unreachable!()
            }
        }
    })
}

/// Run one full collection cycle.
pub(crate) fn collect(gc: &mut Gc) {
    let stack_bottom = thread_stack_bottom();
    memory::with_registers_flushed(|| collect_from(gc, stack_bottom));
}

/// Non-inlined so the call spills caller-saved registers into the scanned
/// range and the local below is a true upper bound on the mutator's stack.
#[inline(never)]
fn collect_from(gc: &mut Gc, stack_bottom: Address) {
    let top_marker = 0usize;
    let stack_top = Address::from_ref(&top_marker);
    debug!(
        "collect: scanning stack [{}, {})",
        stack_top, stack_bottom
    );
    gc.mark_phase(stack_top, stack_bottom);
    gc.sweep_phase();
    gc.alloc_since_gc = 0;
    let stack_bytes = stack_bottom - stack_top;
    let estimate = 2 * gc.live_bytes + 2 * stack_bytes + gc.roots_bytes;
    gc.trigger = ((estimate as f64 / GROWTH_FACTOR) as usize).max(MIN_TRIGGER);
    debug!(
        "collect: {} bytes live, {} root bytes, next trigger {}",
        gc.live_bytes, gc.roots_bytes, gc.trigger
    );
}
