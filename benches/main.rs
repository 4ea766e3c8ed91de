use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use cgc::memory_manager;

pub fn bench_main(c: &mut Criterion) {
    memory_manager::init().unwrap();
    // Disable automatic cycles so the benchmarks measure the paths they
    // name. Each allocation is freed at once, so the iteration count is
    // decoupled from the region capacity: the freelist recycles one chunk.
    memory_manager::disable();

    c.bench_function("alloc_free_16", |b| {
        b.iter(|| {
            let addr = memory_manager::alloc(16);
            memory_manager::free(addr);
        });
    });

    c.bench_function("alloc_free_1024", |b| {
        b.iter(|| {
            let addr = memory_manager::alloc(1024);
            memory_manager::free(addr);
        });
    });

    let addr = memory_manager::alloc(1024);
    c.bench_function("base_of_interior", |b| {
        b.iter(|| memory_manager::base_of(addr + 513usize));
    });

    c.bench_function("collect_small_heap", |b| {
        b.iter(|| memory_manager::collect());
    });
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
