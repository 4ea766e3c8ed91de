//! End-to-end collector tests.
//!
//! The collector is a process-global singleton with a single-thread
//! contract, so every test runs under one mutex and with automatic
//! collection disabled; cycles are forced explicitly.
//!
//! Reclamation tests need care: a conservative collector retains anything
//! whose address is still visible on the stack, including stale spill slots
//! from earlier calls. Objects that must die are therefore allocated inside
//! non-inlined helpers, remembered only in complemented form (the same
//! pointer-hiding trick the freelist uses), and the helper frames are
//! scrubbed before collecting.

use std::sync::Mutex;

use cgc::heap::layout::{ALIGNMENT, BIG_UNIT, HUGE_UNIT, MAX_ROOT_SIZE};
use cgc::memory_manager as mm;
use cgc::{Address, GcError};

static LOCK: Mutex<()> = Mutex::new(());

fn with_gc<F: FnOnce()>(f: F) {
    let _guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    mm::init().unwrap();
    mm::disable();
    f();
}

/// Overwrite the stack below this frame so stale spill slots cannot keep
/// dead objects alive through the conservative scan.
#[inline(never)]
fn scrub_stack() {
    let mut junk = [0usize; 4096];
    for slot in junk.iter_mut() {
        unsafe { std::ptr::write_volatile(slot, 0) };
    }
    std::hint::black_box(&junk);
}

/// Allocate until the hidden (complemented) address reappears, proving the
/// chunk was reclaimed. Runs with automatic collection off, so the loop
/// itself cannot trigger a cycle.
fn alloc_reuses(hidden: usize, size: usize, limit: usize) -> bool {
    for _ in 0..limit {
        let addr = mm::alloc(size);
        assert!(!addr.is_zero());
        if addr.as_usize() == !hidden {
            return true;
        }
    }
    false
}

#[test]
fn size_class_boundaries() {
    with_gc(|| {
        let expect = [
            (1, 16),
            (16, 16),
            (17, 32),
            (32, 32),
            (BIG_UNIT, BIG_UNIT),
            (BIG_UNIT + 1, 2 * BIG_UNIT),
            (HUGE_UNIT, HUGE_UNIT),
            (HUGE_UNIT + 1, 2 * HUGE_UNIT),
        ];
        for (request, class) in expect {
            let addr = mm::alloc(request);
            assert!(!addr.is_zero());
            assert_eq!(mm::size_of(addr), class, "request of {} bytes", request);
        }
    });
}

#[test]
fn interior_pointer_base() {
    with_gc(|| {
        let addr = mm::alloc(1024);
        assert!(!addr.is_zero());
        assert_eq!(mm::size_of(addr), 1024);
        for offset in [0usize, 1, 17, 512, 1023] {
            assert_eq!(mm::base_of(addr + offset), addr, "offset {}", offset);
        }
        std::hint::black_box(&addr);
    });
}

#[test]
fn pointer_test_bounds() {
    with_gc(|| {
        use cgc::heap::layout::{HEAP_END, HEAP_START};
        assert!(mm::is_gc_ptr(HEAP_START));
        assert!(!mm::is_gc_ptr(HEAP_END));
        assert!(!mm::is_gc_ptr(Address::ZERO));
        let addr = mm::alloc(64);
        assert!(mm::is_gc_ptr(addr));
        let local = 0usize;
        let stack_addr = Address::from_ref(&local);
        assert!(!mm::is_gc_ptr(stack_addr));
        assert_eq!(mm::size_of(stack_addr), 0);
        assert_eq!(mm::base_of(stack_addr), Address::ZERO);
        std::hint::black_box(&addr);
    });
}

#[test]
fn tag_round_trip() {
    with_gc(|| {
        let addr = mm::alloc(64);
        assert!(!addr.is_zero());
        for tag in 0..ALIGNMENT {
            let tagged = mm::set_tag(addr, tag);
            assert_eq!(mm::get_tag(tagged), tag);
            assert_eq!(mm::strip_tag(tagged), addr);
        }
        std::hint::black_box(&addr);
    });
}

#[test]
fn ext_tag_round_trip() {
    with_gc(|| {
        let addr = mm::alloc(1000);
        let size = mm::size_of(addr);
        assert_eq!(size, 1008);
        for offset in [0usize, 1, 500, size - 1] {
            let tagged = mm::set_ext_tag(addr, offset);
            assert_eq!(mm::get_ext_tag(tagged), offset);
            assert_eq!(mm::base_of(tagged), addr);
        }
        std::hint::black_box(&addr);
    });
}

#[test]
fn reachable_via_stack() {
    with_gc(|| {
        let addr = mm::alloc(64);
        assert!(!addr.is_zero());
        // Force the pointer into a stack slot before the first cycle.
        std::hint::black_box(&addr);
        mm::collect();
        unsafe { addr.store::<u64>(0x5ca1_ab1e_ca11_ab1e) };
        mm::collect();
        assert_eq!(unsafe { addr.load::<u64>() }, 0x5ca1_ab1e_ca11_ab1e);
        std::hint::black_box(&addr);
    });
}

#[inline(never)]
fn stash_at(slot: Address, size: usize, sentinel: u64) -> usize {
    let addr = mm::alloc(size);
    assert!(!addr.is_zero());
    unsafe { addr.store::<u64>(sentinel) };
    unsafe { slot.store::<Address>(addr) };
    !addr.as_usize()
}

#[inline(never)]
fn check_sentinel_via(slot: Address, want: u64) {
    let addr: Address = unsafe { slot.load() };
    assert_eq!(unsafe { addr.load::<u64>() }, want);
}

#[test]
fn reclaimed_after_root_cleared() {
    with_gc(|| {
        // A registered global keeps the object alive; zeroing the global
        // (while staying registered) lets the next cycles reclaim it.
        let slot = Address::from_ref(Box::leak(Box::new(Address::ZERO)));
        mm::register_root(slot, std::mem::size_of::<Address>()).unwrap();
        let hidden = stash_at(slot, 96, 0xfeed_face_feed_face);
        scrub_stack();
        mm::collect();
        check_sentinel_via(slot, 0xfeed_face_feed_face);
        unsafe { slot.store(Address::ZERO) };
        scrub_stack();
        mm::collect();
        mm::collect();
        assert!(alloc_reuses(hidden, 96, 10_000));
    });
}

#[test]
fn dynamic_root_follows_mutation() {
    with_gc(|| {
        let buf: &'static mut [Address; 4] = Box::leak(Box::new([Address::ZERO; 4]));
        let start_loc = Address::from_ref(Box::leak(Box::new(Address::from_ref(&buf[0]))));
        let count_loc = Address::from_ref(Box::leak(Box::new(4usize)));
        mm::register_dynamic_root(start_loc, count_loc, std::mem::size_of::<Address>()).unwrap();

        let hidden = stash_at(Address::from_ref(&buf[2]), 208, 0xd0_0d_d0_0d);
        scrub_stack();
        mm::collect();
        check_sentinel_via(Address::from_ref(&buf[2]), 0xd0_0d_d0_0d);

        // Shrink the root to zero elements; the stored pointer is now
        // invisible to the collector even though the slot still holds it.
        unsafe { count_loc.store(0usize) };
        scrub_stack();
        mm::collect();
        mm::collect();
        assert!(alloc_reuses(hidden, 208, 10_000));
    });
}

#[inline(never)]
fn alloc_and_free(size: usize) -> usize {
    let addr = mm::alloc(size);
    assert!(!addr.is_zero());
    mm::free(addr);
    // Freelist hygiene: the link word stored in the dead chunk must not
    // look like a heap pointer, or the marker would resurrect the chain.
    let link = unsafe { addr.load::<usize>() };
    assert!(!mm::is_gc_ptr(unsafe { Address::from_usize(link) }));
    !addr.as_usize()
}

#[test]
fn freelist_does_not_keep_memory_alive() {
    with_gc(|| {
        let hidden = alloc_and_free(112);
        scrub_stack();
        mm::collect();
        assert!(alloc_reuses(hidden, 112, 10_000));
    });
}

#[inline(never)]
fn plant_integer_alias(size: usize, decoy_size: usize) -> usize {
    let target = mm::alloc(size);
    assert!(!target.is_zero());
    let decoy = mm::alloc(decoy_size);
    assert!(!decoy.is_zero());
    // The target's address, as an integer, inside a heap object that is
    // itself about to become garbage.
    unsafe { decoy.store::<usize>(target.as_usize() + 8) };
    !target.as_usize()
}

#[test]
fn dead_heap_integers_do_not_retain() {
    with_gc(|| {
        let hidden = plant_integer_alias(144, 272);
        scrub_stack();
        mm::collect();
        mm::collect();
        assert!(alloc_reuses(hidden, 144, 10_000));
    });
}

#[inline(never)]
fn alloc_dead(size: usize) -> usize {
    let addr = mm::alloc(size);
    assert!(!addr.is_zero());
    !addr.as_usize()
}

#[test]
fn consecutive_collections_agree() {
    with_gc(|| {
        let live = mm::alloc(176);
        assert!(!live.is_zero());
        std::hint::black_box(&live);
        unsafe { live.store::<u64>(0xab5e_11ed_ab5e_11ed) };
        let hidden = alloc_dead(176);
        scrub_stack();
        mm::collect();
        mm::collect();
        // The survivor survives both cycles intact; the dead chunk is
        // reclaimable exactly once.
        assert_eq!(unsafe { live.load::<u64>() }, 0xab5e_11ed_ab5e_11ed);
        assert!(alloc_reuses(hidden, 176, 10_000));
        std::hint::black_box(&live);
    });
}

#[test]
fn realloc_behavior() {
    with_gc(|| {
        let addr = mm::realloc(Address::ZERO, 40);
        assert!(!addr.is_zero());
        assert_eq!(mm::size_of(addr), 48);
        for i in 0..40u8 {
            unsafe { (addr + i as usize).store(i) };
        }

        // Same size class: the pointer must not move.
        assert_eq!(mm::realloc(addr, 33), addr);

        // Cross-class: contents move, old chunk is freed for reuse.
        let bigger = mm::realloc(addr, BIG_UNIT + 1);
        assert!(!bigger.is_zero());
        assert_ne!(bigger, addr);
        assert_eq!(mm::size_of(bigger), 2 * BIG_UNIT);
        for i in 0..40u8 {
            assert_eq!(unsafe { (bigger + i as usize).load::<u8>() }, i);
        }
        assert_eq!(mm::alloc(48), addr);
        std::hint::black_box(&bigger);
    });
}

#[test]
fn oversized_root_rejected() {
    with_gc(|| {
        let local = 0usize;
        let err = mm::register_root(Address::from_ref(&local), MAX_ROOT_SIZE + 1);
        assert_eq!(err, Err(GcError::RootTooLarge));
        assert_eq!(mm::last_error(), Some(GcError::RootTooLarge));
        assert_eq!(mm::take_last_error(), Some(GcError::RootTooLarge));
        assert_eq!(mm::last_error(), None);
    });
}

#[test]
fn random_allocations_hold_invariants() {
    use rand::Rng;
    with_gc(|| {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let size = rng.random_range(1..=100_000usize);
            let addr = mm::alloc(size);
            assert!(!addr.is_zero());
            assert!(addr.is_aligned_to(ALIGNMENT));
            assert!(mm::is_gc_ptr(addr));
            let class = mm::size_of(addr);
            assert!(class >= size);
            let offset = rng.random_range(0..class);
            assert_eq!(mm::base_of(addr + offset), addr);
        }
    });
}
