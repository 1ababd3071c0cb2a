//! Criterion benchmarks for `Decoder::decode_records` throughput at a few
//! ring capacities. Each benchmark fills its own buffer with this bench
//! binary as the producer, then decodes it back from the binary's own
//! on-disk bytes, the same same-process round-trip pattern the decoder's
//! own unit tests use.

use criterion::{Criterion, criterion_group, criterion_main};
use nanolog_decoder::Decoder;

const CAPACITIES: &[usize] = &[256, 4096, 32768];

fn bench_decode_group(c: &mut Criterion) {
    let producer = std::env::current_exe().expect("current_exe");
    let mut group = c.benchmark_group("decode");

    for &capacity in CAPACITIES {
        let path = nanolog_perf::temp_buffer_path(&format!("decode_{capacity}"));
        nanolog::init(Some(std::path::Path::new(&path)), capacity).expect("init buffer");
        for i in 0..capacity as u64 {
            nanolog::emit("bench-msg(arg=%d)", i, 0);
        }
        nanolog::deinit();

        group.bench_function(format!("capacity_{capacity}"), |b| {
            b.iter(|| {
                let decoder = Decoder::open(
                    std::path::Path::new(&path),
                    &producer,
                    None,
                )
                .expect("open decoder");
                decoder.decode_records()
            });
        });

        let _ = std::fs::remove_file(&path);
    }

    group.finish();
}

criterion_group!(benches, bench_decode_group);
criterion_main!(benches);
