//! VM substrate: thin wrappers around the platform's virtual-memory calls.
//!
//! The collector reserves enormous address ranges with no physical backing
//! ([`reserve_fixed`], [`reserve_anywhere`]), makes sub-ranges accessible on
//! demand ([`commit`]), and hands physical pages back to the OS without
//! giving up the address space ([`advise_discardable`]). All functions
//! operate on page granularity; callers align as documented per function.

use std::io::{Error, Result};

use crate::util::Address;

/// Reserve `size` bytes of address space at exactly `start`, with no
/// physical backing and no access. Touching the range faults until a
/// [`commit`] call covers it. Fails if the range overlaps an existing
/// mapping.
pub fn reserve_fixed(start: Address, size: usize) -> Result<()> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | map_fixed_flag();
    let ptr = mmap(start, size, libc::PROT_NONE, flags)?;
    if ptr != start {
        // The kernel treated the address as a hint and placed the mapping
        // elsewhere. Undo and report the clash.
        let _ = release(ptr, size);
        return Err(Error::from_raw_os_error(libc::EEXIST));
    }
    Ok(())
}

/// Reserve `size` bytes anywhere, readable and writable, with physical pages
/// supplied lazily by the OS on first touch. Used for the mark worklist and
/// the per-region mark bitmaps, which live outside the main pool.
pub fn reserve_anywhere(size: usize) -> Result<Address> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    mmap(Address::ZERO, size, libc::PROT_READ | libc::PROT_WRITE, flags)
}

/// Make `[start, start + size)` readable and writable. `start` is aligned
/// down and the length up to page boundaries by the caller.
pub fn commit(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(
        &|| unsafe {
            libc::mprotect(
                start.to_mut_ptr(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        },
        0,
    )
}

/// Unmap a previously reserved range.
pub fn release(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

/// Tell the OS it may drop the physical pages backing `[start, start + size)`.
/// The mapping stays valid; the next read observes zeros. `start` and `size`
/// must be page aligned.
///
/// MADV_DONTNEED (not MADV_FREE) is required: the mark-bitmap reset depends
/// on the range reading back as zeros immediately.
pub fn advise_discardable(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(
        &|| unsafe { libc::madvise(start.to_mut_ptr(), size, libc::MADV_DONTNEED) },
        0,
    )
}

fn mmap(start: Address, size: usize, prot: i32, flags: i32) -> Result<Address> {
    let ret = unsafe { libc::mmap(start.to_mut_ptr(), size, prot, flags, -1, 0) };
    if ret == libc::MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ret))
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn map_fixed_flag() -> libc::c_int {
            // Refuses to clobber an existing mapping; the hint-then-verify
            // path in reserve_fixed covers kernels that predate it.
            libc::MAP_FIXED_NOREPLACE
        }
    } else {
        fn map_fixed_flag() -> libc::c_int {
            // No atomic fixed-no-replace on this platform; reserve_fixed
            // verifies the address the kernel actually chose.
            0
        }
    }
}

pub fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Highest address of the current thread's stack segment.
        pub fn stack_bottom() -> Result<Address> {
            unsafe {
                let mut attr: libc::pthread_attr_t = std::mem::zeroed();
                // pthread_getattr_np returns the error number directly, not
                // through errno.
                let ret = libc::pthread_getattr_np(libc::pthread_self(), &mut attr);
                if ret != 0 {
                    return Err(Error::from_raw_os_error(ret));
                }
                let mut stack_addr: *mut libc::c_void = std::ptr::null_mut();
                let mut stack_size: libc::size_t = 0;
                let ret = libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size);
                libc::pthread_attr_destroy(&mut attr);
                if ret != 0 {
                    return Err(Error::from_raw_os_error(ret));
                }
                // getstack reports the lowest address; the stack grows down
                // from the other end.
                Ok(Address::from_mut_ptr(stack_addr) + stack_size)
            }
        }
    } else if #[cfg(target_os = "macos")] {
        /// Highest address of the current thread's stack segment.
        pub fn stack_bottom() -> Result<Address> {
            let addr = unsafe { libc::pthread_get_stackaddr_np(libc::pthread_self()) };
            Ok(Address::from_mut_ptr(addr))
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_env = "gnu"))] {
        /// Run `f` with every register value also present on this stack
        /// frame. getcontext writes the full register file, callee-saved
        /// registers included, into a buffer that sits inside the range the
        /// collector is about to scan.
        pub fn with_registers_flushed<R>(f: impl FnOnce() -> R) -> R {
            let mut ctx = std::mem::MaybeUninit::<libc::ucontext_t>::uninit();
            unsafe {
                libc::getcontext(ctx.as_mut_ptr());
            }
            let result = f();
            std::hint::black_box(&ctx);
            result
        }
    } else {
        /// Run `f`. Without a register-save primitive we rely on the
        /// non-inlined call chain below this frame to spill caller-saved
        /// registers into the scanned range.
        pub fn with_registers_flushed<R>(f: impl FnOnce() -> R) -> R {
            f()
        }
    }
}
