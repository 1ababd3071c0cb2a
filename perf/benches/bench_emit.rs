//! Criterion benchmarks for the producer hot path: `emit`, `emit_no_args`,
//! and the thread-id cache it depends on. `perf_report` reads the resulting
//! criterion JSON for its display.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nanolog_perf::temp_buffer_path;

const RING_CAPACITY: usize = 1 << 15;

fn bench_emit_group(c: &mut Criterion) {
    let path = temp_buffer_path("criterion_emit");
    nanolog::init(Some(std::path::Path::new(&path)), RING_CAPACITY).expect("init buffer");

    let mut group = c.benchmark_group("emit");

    group.bench_function("emit_no_args", |b| {
        b.iter(|| {
            nanolog::emit_no_args("hit");
        });
    });

    group.bench_function("emit_with_args", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = i.wrapping_add(1);
            nanolog::emit("memwrite(addr=%x,size=%d)", black_box(i), black_box(1024));
        });
    });

    group.bench_function("cached_tid", |b| {
        b.iter(|| black_box(nanolog_tid::cached_tid()));
    });

    group.finish();

    nanolog::deinit();
    let _ = std::fs::remove_file(&path);
}

criterion_group!(benches, bench_emit_group);
criterion_main!(benches);
