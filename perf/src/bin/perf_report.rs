//! Human-readable performance report for the nanolog hot path: hardware
//! context, record/header memory layout, clock-read floor, criterion
//! micro-results (if `bench_emit` has been run), a multi-thread soak test
//! that exercises the slot-reservation counter under contention, and
//! resource usage over the run. Mirrors the shape of a vendor `perf_report`
//! binary built on top of a shared stats/harness library.

use std::collections::BTreeMap;
use std::hint::black_box;
use std::mem::{align_of, size_of};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};

use nanolog_perf::*;
use nanolog_record::{BufferHeader, Record};

const NUM_THREADS: usize = 4;
const PER_THREAD_EMITS: usize = 200_000;
const RING_CAPACITY: usize = 1 << 15;

fn main() {
    let rusage_start = capture_rusage();
    let cache = get_cache_info();

    let mut results: Vec<BenchResult> = Vec::new();

    print_banner(&cache);
    section_memory_layout(&cache);
    section_clock(&mut results);

    let criterion_dir = criterion_target_dir();
    let estimates = read_criterion_estimates(&criterion_dir);
    section_criterion_emit(&estimates);

    let decode_estimates = read_criterion_group(&criterion_dir, "decode");
    section_criterion_decode(&decode_estimates);

    let (soak_stats, idx_reserved) = section_soak(&mut results);

    let rusage_end = capture_rusage();
    section_resources(&rusage_start, &rusage_end);

    save_results(
        &results,
        &cache,
        &estimates,
        &decode_estimates,
        &soak_stats,
        idx_reserved,
        &rusage_start,
        &rusage_end,
    );
}

fn criterion_target_dir() -> PathBuf {
    let manifest = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest).parent().unwrap().join("target").join("criterion")
}

fn print_banner(cache: &CacheInfo) {
    let bar = "=".repeat(90);
    println!("\n{bar}");
    println!("  NANOLOG PERFORMANCE REPORT");
    println!("  criterion micro + multi-thread soak");
    println!("{bar}\n");

    println!("  CPU:     {}  ({} cores)", cache.cpu_brand, cache.ncpu);
    println!("  RAM:     {}", format_bytes(cache.ram_bytes));

    println!("\n  Cache Hierarchy:");
    if cache.l1d_bytes > 0 {
        println!("    L1 Data: {} / core", format_bytes(cache.l1d_bytes));
    }
    if cache.l2_bytes > 0 {
        println!("    L2:      {}", format_bytes(cache.l2_bytes));
    }
    println!("    Cache Line: {} B", cache.line_size);
}

fn section_memory_layout(cache: &CacheInfo) {
    section_header("MEMORY LAYOUT & CACHE ANALYSIS");

    let line = cache.line_size.max(1);
    let record_size = size_of::<Record>() as u64;
    let header_size = size_of::<BufferHeader>() as u64;

    println!(
        "  {:<22} {:>8} {:>8} {:>12}",
        "Type", "Size", "Align", "Cache Lines"
    );
    println!("  {}", "-".repeat(56));

    let types: &[(&str, u64, u64)] = &[
        ("Record", record_size, align_of::<Record>() as u64),
        ("BufferHeader", header_size, align_of::<BufferHeader>() as u64),
    ];
    for &(name, size, align) in types {
        let lines = size.div_ceil(line);
        println!("  {name:<22} {size:>6} B {align:>6} B {lines:>12}");
    }

    println!("\n  Notes:");
    println!(
        "    * Record ({record_size}B) and BufferHeader ({header_size}B) are each exactly one \
         slot's stride; the decoder hard-codes both sizes."
    );
    println!(
        "    * {} records fit per {}B cache line.",
        line / record_size.max(1),
        line
    );
}

fn section_clock(results: &mut Vec<BenchResult>) {
    section_header("CLOCK / TID CACHE FLOOR");
    print_table_header();

    let r_instant = measure_batched("Instant::now()", 1000, 10_000, 100, || {
        black_box(std::time::Instant::now());
    });
    print_result_row(&r_instant);
    results.push(r_instant.clone());

    let r_tid = measure_batched("cached_tid()", 1000, 10_000, 100, || {
        black_box(nanolog_tid::cached_tid());
    });
    print_result_row(&r_tid);
    results.push(r_tid);

    println!("\n  * Measurement floor: ~{} ns", r_instant.stats.p50);
    println!("  * All timings below use batched amortisation (10k ops/batch) for ~1ns accuracy");
}

fn section_criterion_emit(estimates: &BTreeMap<String, CriterionEstimate>) {
    section_header("CRITERION EMIT RESULTS");
    if estimates.is_empty() {
        println!("  No criterion data found. Run: cargo bench -p nanolog-perf --bench bench_emit");
        return;
    }

    println!(
        "  {:<24} {:>10} {:>10} {:>10}",
        "Benchmark", "median", "mean", "stddev"
    );
    println!("  {}", "-".repeat(60));
    for key in ["emit/emit_no_args", "emit/emit_with_args", "emit/cached_tid"] {
        if let Some(est) = estimates.get(key) {
            println!(
                "  {:<24} {:>10} {:>10} {:>10}",
                key.trim_start_matches("emit/"),
                format_ns(est.median_ns),
                format_ns(est.mean_ns),
                format_ns(est.stddev_ns),
            );
        }
    }
}

fn section_criterion_decode(estimates: &BTreeMap<String, CriterionEstimate>) {
    section_header("CRITERION DECODE THROUGHPUT");
    if estimates.is_empty() {
        println!("  No criterion data found. Run: cargo bench -p nanolog-perf --bench bench_decode");
        return;
    }

    println!(
        "  {:<24} {:>10} {:>10} {:>10}",
        "Capacity", "median", "mean", "stddev"
    );
    println!("  {}", "-".repeat(60));
    for (key, est) in estimates {
        println!(
            "  {:<24} {:>10} {:>10} {:>10}",
            key.trim_start_matches("decode/"),
            format_ns(est.median_ns),
            format_ns(est.mean_ns),
            format_ns(est.stddev_ns),
        );
    }
}

/// Spins up `NUM_THREADS` producers emitting concurrently into one buffer,
/// the concurrency scenario the slot-reservation counter exists for
/// (spec §8, property 2 and scenario S4).
fn section_soak(results: &mut Vec<BenchResult>) -> (Stats, u64) {
    section_header(&format!(
        "MULTI-THREAD SOAK  ({NUM_THREADS} threads x {PER_THREAD_EMITS} emits, capacity={RING_CAPACITY})"
    ));

    let path = temp_buffer_path("soak");
    nanolog::init(Some(std::path::Path::new(&path)), RING_CAPACITY).expect("init buffer");

    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let start = std::time::Instant::now();

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let mut local_samples = Vec::with_capacity(PER_THREAD_EMITS / 100);
                for i in 0..PER_THREAD_EMITS as u64 {
                    if i.is_multiple_of(100) {
                        let s = std::time::Instant::now();
                        nanolog::emit("hit", t as u64, i);
                        local_samples.push(s.elapsed().as_nanos().max(1) as u64);
                    } else {
                        nanolog::emit("hit", t as u64, i);
                    }
                }
                local_samples
            })
        })
        .collect();

    let mut all_samples: Vec<u64> = Vec::new();
    for h in handles {
        all_samples.extend(h.join().expect("producer thread panicked"));
    }
    let elapsed = start.elapsed();

    let decoder_buffer = nanolog_mmap_read_idx(&path);
    nanolog::deinit();
    let _ = std::fs::remove_file(&path);

    let total_emits = (NUM_THREADS * PER_THREAD_EMITS) as u64;
    let throughput = total_emits as f64 / elapsed.as_secs_f64();

    println!(
        "  {total_emits} emits in {:.3}s  ({:.2} M emits/s)",
        elapsed.as_secs_f64(),
        throughput / 1e6
    );
    println!("  header idx after run: {decoder_buffer} (expected {total_emits})");

    let stats = compute_stats(&mut all_samples);
    println!(
        "\n  Sampled per-emit latency: p50={} ns  p90={} ns  p99={} ns  max={} ns",
        stats.p50, stats.p90, stats.p99, stats.max
    );

    results.push(BenchResult {
        name: "soak per_emit_latency".into(),
        unit: "ns".into(),
        stats: stats.clone(),
    });

    (stats, decoder_buffer)
}

/// Re-opens the just-written buffer file read-only to read back `idx`,
/// exercising the same header layout the decoder uses, without pulling
/// `nanolog-decoder`'s binary-resolution machinery into the soak path.
fn nanolog_mmap_read_idx(path: &str) -> u64 {
    use std::sync::atomic::Ordering;
    let mm = nanolog_mmap::MmapFile::open_ro(path).expect("reopen soak buffer");
    let header = unsafe { &*(mm.as_ptr() as *const BufferHeader) };
    header.idx.load(Ordering::Relaxed)
}

fn section_resources(start: &ResourceSnapshot, end: &ResourceSnapshot) {
    section_header("RESOURCE USAGE");
    println!("  Max RSS:            {}", format_bytes(end.max_rss_bytes.max(0) as u64));
    println!("  Minor faults:       {}", end.minor_faults - start.minor_faults);
    println!("  Major faults:       {}", end.major_faults - start.major_faults);
    println!(
        "  Voluntary ctx sw:   {}",
        end.vol_ctx_switches - start.vol_ctx_switches
    );
    println!(
        "  Involuntary ctx sw: {}",
        end.invol_ctx_switches - start.invol_ctx_switches
    );
}

fn save_results(
    results: &[BenchResult],
    cache: &CacheInfo,
    estimates: &BTreeMap<String, CriterionEstimate>,
    decode_estimates: &BTreeMap<String, CriterionEstimate>,
    soak_stats: &Stats,
    idx_reserved: u64,
    rusage_start: &ResourceSnapshot,
    rusage_end: &ResourceSnapshot,
) {
    let report = serde_json::json!({
        "cache_info": cache,
        "results": results,
        "criterion_estimates": estimates,
        "criterion_decode_estimates": decode_estimates,
        "soak": {
            "stats": soak_stats,
            "idx_reserved": idx_reserved,
        },
        "rusage_start": rusage_start,
        "rusage_end": rusage_end,
    });

    let out_path = std::env::temp_dir().join("nanolog_perf_report.json");
    if let Ok(json) = serde_json::to_string_pretty(&report) {
        let _ = std::fs::write(&out_path, json);
        println!("\n  Full report written to {}", out_path.display());
    }
}
