//! Central error path.
//!
//! Every failure the collector can observe is funneled through [`raise`]:
//! the error is recorded in a thread-local slot, logged, handed to the user
//! hook if one is registered, and — for the fatal kinds — the process is
//! aborted after the hook returns. Non-fatal kinds return to the caller,
//! which surfaces them as a null allocation result or an `Err`.

use std::cell::Cell;
use std::fmt;

/// Everything that can go wrong inside the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// The build does not target a 64-bit word / 64-bit float platform.
    UnsupportedPlatform,
    /// Reserving the main pool or the mark-worklist address range failed.
    ReserveFailed,
    /// Growing a region's committed range failed; the allocation that
    /// needed it returns null.
    CommitFailed,
    /// A region's bump pointer reached the end of its address slice; the
    /// allocation returns null.
    OutOfRegionSpace,
    /// The requested size exceeds the largest size class.
    SizeTooLarge,
    /// A mark bitmap could not be reserved or reset mid-collection.
    MarkBitmapFailed,
    /// The mark worklist reservation overflowed.
    MarkStackExhausted,
    /// The current thread's stack bounds could not be determined.
    StackBoundsFailed,
    /// A root range larger than `MAX_ROOT_SIZE` was rejected.
    RootTooLarge,
}

impl GcError {
    /// Fatal errors abort the process once the user hook returns; the
    /// collector cannot continue past them.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            GcError::CommitFailed | GcError::OutOfRegionSpace | GcError::RootTooLarge
        )
    }
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            GcError::UnsupportedPlatform => "not a 64-bit platform",
            GcError::ReserveFailed => "virtual address reservation failed",
            GcError::CommitFailed => "committing region pages failed",
            GcError::OutOfRegionSpace => "size class exhausted its region",
            GcError::SizeTooLarge => "request exceeds the largest size class",
            GcError::MarkBitmapFailed => "mark bitmap allocation failed",
            GcError::MarkStackExhausted => "mark worklist exhausted",
            GcError::StackBoundsFailed => "could not locate the stack segment",
            GcError::RootTooLarge => "root range too large",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for GcError {}

/// User hook invoked on every raised error, fatal or not.
pub type ErrorHook = fn(GcError);

struct HookCell(Cell<Option<ErrorHook>>);

// Safety: per the crate contract all collector entry points run on the one
// mutator thread.
unsafe impl Sync for HookCell {}

static HOOK: HookCell = HookCell(Cell::new(None));

thread_local! {
    static LAST_ERROR: Cell<Option<GcError>> = const { Cell::new(None) };
}

/// Install (or with `None`, remove) the hook invoked on every error.
pub(crate) fn set_hook(hook: Option<ErrorHook>) {
    HOOK.0.set(hook);
}

/// The most recent error observed on this thread, if any.
pub fn last_error() -> Option<GcError> {
    LAST_ERROR.with(|slot| slot.get())
}

/// Read and clear the most recent error observed on this thread.
pub fn take_last_error() -> Option<GcError> {
    LAST_ERROR.with(|slot| slot.take())
}

/// Report `err`: record it, log it, call the user hook, abort if fatal.
pub(crate) fn raise(err: GcError) {
    LAST_ERROR.with(|slot| slot.set(Some(err)));
    error!("cgc: {}", err);
    if let Some(hook) = HOOK.0.get() {
        hook(err);
    }
    if err.is_fatal() {
        eprintln!("cgc: fatal: {}", err);
        std::process::abort();
    }
}
