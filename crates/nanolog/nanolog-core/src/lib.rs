//! Producer-side API: `init`/`emit`/`emit_no_args`/`deinit`, plus the
//! `emit_loc!` macro behind the `loc-section` feature.
//!
//! The hot path (`emit`/`emit_no_args`/`emit_loc!`) touches only atomics and
//! raw pointers: one slot reservation, one thread-local read, one write of
//! 32 bytes. Nothing on that path allocates, locks, or logs.

mod error;
mod load_base;

use nanolog_record::{BufferHeader, HEADER_SIZE, LocType, Platform, RECORD_SIZE, Record};
use std::path::Path;
use std::ptr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

pub use error::InitError;
pub use load_base::LoadBaseUnknown;

#[cfg(feature = "loc-section")]
pub use nanolog_loc::{LocEntry, LocOracle, RawLocRecord, loc_hash};

/// Base address of the mapped buffer, or null if `init` has not (yet) been
/// called. Readers only ever load this; `init`/`deinit` are the sole
/// writers and are not expected to race with each other (the caller is
/// responsible for not calling them concurrently from multiple threads).
static BASE_PTR: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());
/// Cached `mask_for(capacity)` for the current buffer.
static RING_MASK: AtomicU64 = AtomicU64::new(0);
/// Toggles the single-writer fast path for slot reservation.
static SINGLE_THREADED: AtomicBool = AtomicBool::new(false);

/// Keeps every mapped region alive for the life of the process. Only
/// touched on `init`/`deinit` (cold paths), never on `emit`. A re-`init`
/// pushes rather than replaces: an in-flight `emit` may still hold the
/// previous `BASE_PTR` when `init` runs, so the old mapping must outlive
/// it rather than being dropped out from under it (see DESIGN.md, OQ-3).
static STORAGE: Mutex<Vec<nanolog_mmap::MmapFileMut>> = Mutex::new(Vec::new());

/// Disables the slot-reservation fast path that assumes a single emitting
/// thread. When `true`, `emit*` reserves slots with a relaxed load+store
/// pair instead of `fetch_add`, matching the spec's "MAY be incremented
/// non-atomically" allowance for genuinely single-threaded producers.
pub fn set_single_threaded(single_threaded: bool) {
    SINGLE_THREADED.store(single_threaded, Ordering::Relaxed);
}

/// Maps a fresh ring buffer of `capacity` records (must be a non-zero power
/// of two) and installs it as the process-global target for `emit*`.
///
/// `path`: `Some` maps a file that outlives the process and can be handed
/// to the decoder; `None` maps an anonymous region, useful for tests and
/// in-process-only use.
///
/// Calling `init` again before `deinit` supersedes the previous buffer for
/// new emits; the old mapping is kept alive (not dropped) for the rest of
/// the process's life, since an emit already in flight may still hold its
/// address (see DESIGN.md, OQ-3, for why this is the chosen semantics
/// rather than an error).
pub fn init(path: Option<&Path>, capacity: usize) -> Result<(), InitError> {
    // `BufferHeader::capacity` is a 16-bit field (spec §3); the largest
    // power of two that fits is 2^15, not 2^16 (`65536 as u16 == 0`).
    if capacity == 0 || !capacity.is_power_of_two() || capacity > (1 << 15) {
        return Err(InitError::InvalidCapacity(capacity));
    }

    let bytes = HEADER_SIZE + capacity * RECORD_SIZE;
    let mut mapping = match path {
        Some(p) => nanolog_mmap::MmapFileMut::create_rw(p, bytes as u64)?,
        None => nanolog_mmap::MmapFileMut::create_anon(bytes)?,
    };

    let fbase = load_base::capture()?;
    let base = mapping.as_mut_ptr();

    // SAFETY: `mapping` is freshly allocated and at least `bytes` long;
    // writing the header at offset 0 does not alias any live reference.
    unsafe {
        ptr::write(
            base as *mut BufferHeader,
            BufferHeader::new(fbase, capacity as u16, Platform::current(), current_loc_type()),
        );
    }

    RING_MASK.store(nanolog_record::mask_for(capacity as u64), Ordering::Relaxed);
    BASE_PTR.store(base, Ordering::Release);

    // Append, don't replace: any emit still in flight against the
    // previous buffer keeps a valid mapping to write into.
    STORAGE.lock().unwrap().push(mapping);
    tracing::debug!(capacity, path = ?path, "nanolog buffer initialized");
    Ok(())
}

/// Unmaps every buffer mapped by `init` since process start, and resets
/// `emit*` to a no-op. Unlike a re-`init`, this is an explicit request
/// that no further emit can observe the current buffer, so it is the
/// caller's responsibility to ensure no emit is in flight.
pub fn deinit() {
    BASE_PTR.store(ptr::null_mut(), Ordering::Release);
    RING_MASK.store(0, Ordering::Relaxed);
    STORAGE.lock().unwrap().clear();
    tracing::debug!("nanolog buffer deinitialized");
}

fn current_loc_type() -> LocType {
    match std::env::var("NANOLOG_LOC").ok().as_deref() {
        Some("1") => LocType::Table,
        Some("2") => LocType::NamedSection,
        _ => LocType::None,
    }
}

/// Reserves the next slot's logical index, honoring the single-threaded
/// fast path.
#[inline(always)]
fn reserve_slot(header: &BufferHeader) -> u64 {
    if SINGLE_THREADED.load(Ordering::Relaxed) {
        let seq = header.idx.load(Ordering::Relaxed);
        header.idx.store(seq.wrapping_add(1), Ordering::Relaxed);
        seq
    } else {
        header.idx.fetch_add(1, Ordering::Relaxed)
    }
}

/// Writes one record at `idx`'s ring position. `base` must point at a live
/// mapping of at least `HEADER_SIZE + (mask + 1) * RECORD_SIZE` bytes.
#[inline(always)]
unsafe fn write_record(base: *mut u8, idx: u64, record: Record) {
    let offset = HEADER_SIZE + idx as usize * RECORD_SIZE;
    unsafe {
        ptr::write_unaligned(base.add(offset) as *mut Record, record);
    }
}

/// Appends one record with no code-location id (`loc = 0`). No-op if
/// `init` has not been called.
#[inline(always)]
pub fn emit(msg: &'static str, arg1: u64, arg2: u64) {
    emit_with_loc(msg, 0, arg1, arg2);
}

/// Appends one record with no arguments and no code-location id.
#[inline(always)]
pub fn emit_no_args(msg: &'static str) {
    emit_with_loc(msg, 0, 0, 0);
}

/// Appends one record tagging it with `loc` (a code-location id, see
/// [`emit_loc!`]). Exposed for the macro; prefer [`emit`]/[`emit_no_args`]
/// or `emit_loc!` directly.
#[inline(always)]
pub fn emit_with_loc(msg: &'static str, loc: u32, arg1: u64, arg2: u64) {
    let base = BASE_PTR.load(Ordering::Acquire);
    if base.is_null() {
        return;
    }
    // SAFETY: `base` was published by `init` only after the header and
    // record region were mapped and the header written. Callers must not
    // call `deinit` concurrently with an in-flight `emit`.
    let header = unsafe { &*(base as *const BufferHeader) };
    let seq = reserve_slot(header);
    let mask = RING_MASK.load(Ordering::Relaxed);
    let idx = nanolog_record::seq_to_index(seq, mask);

    let record = Record {
        tid: nanolog_tid::cached_tid(),
        loc,
        msg: msg.as_ptr() as u64,
        arg1,
        arg2,
    };
    unsafe {
        write_record(base, idx, record);
    }
}

/// Tags an emit with a compile-time-stable code-location id and registers
/// the `(file, line, function)` triple the offline decoder needs to
/// resolve it, without any external build step.
///
/// Requires the `loc-section` feature. Each call site gets its own
/// `#[used]` static placed in a dedicated linked section
/// (`.nanolog_loc` on ELF, `__DATA,__nanolog_loc` on Mach-O); the decoder
/// parses that section directly out of the binary on disk.
#[cfg(feature = "loc-section")]
#[macro_export]
macro_rules! emit_loc {
    ($msg:expr, $arg1:expr, $arg2:expr) => {{
        const __NANOLOG_LOC_ID: u32 = $crate::loc_hash(file!(), line!());

        #[cfg(target_os = "macos")]
        #[used]
        #[link_section = "__DATA,__nanolog_loc"]
        static __NANOLOG_LOC_ENTRY: $crate::RawLocRecord =
            $crate::RawLocRecord::new(__NANOLOG_LOC_ID, file!(), line!(), module_path!());

        #[cfg(not(target_os = "macos"))]
        #[used]
        #[link_section = ".nanolog_loc"]
        static __NANOLOG_LOC_ENTRY: $crate::RawLocRecord =
            $crate::RawLocRecord::new(__NANOLOG_LOC_ID, file!(), line!(), module_path!());

        // Prevents the optimizer from concluding the static is unobserved
        // and dropping it despite `#[used]` on some linker/LTO combinations.
        let _ = &__NANOLOG_LOC_ENTRY;

        $crate::emit_with_loc($msg, __NANOLOG_LOC_ID, $arg1, $arg2)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // `init`/`deinit` touch process-global state; serialize the tests that
    // exercise them so they don't stomp on each other.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn emit_without_init_is_a_silent_no_op() {
        let _guard = TEST_LOCK.lock().unwrap();
        deinit();
        emit("no buffer yet", 1, 2);
    }

    #[test]
    fn init_emit_deinit_roundtrip() {
        let _guard = TEST_LOCK.lock().unwrap();
        init(None, 8).unwrap();
        emit_no_args("hello");
        emit("with args", 10, 20);
        deinit();
    }

    #[test]
    fn rejects_non_power_of_two_capacity() {
        let _guard = TEST_LOCK.lock().unwrap();
        let err = init(None, 3).unwrap_err();
        assert!(matches!(err, InitError::InvalidCapacity(3)));
    }

    #[test]
    fn rejects_capacity_that_overflows_the_header_field() {
        // 65536 is a power of two but doesn't fit `BufferHeader::capacity`
        // (a u16): `65536 as u16 == 0`, which would otherwise produce a
        // header that fails validation instead of a clear `init` error.
        let _guard = TEST_LOCK.lock().unwrap();
        let err = init(None, 1 << 16).unwrap_err();
        assert!(matches!(err, InitError::InvalidCapacity(65536)));
    }

    #[test]
    fn accepts_largest_capacity_that_fits_the_header_field() {
        let _guard = TEST_LOCK.lock().unwrap();
        init(None, 1 << 15).unwrap();
        deinit();
    }

    #[test]
    fn single_threaded_fast_path_still_advances_idx() {
        let _guard = TEST_LOCK.lock().unwrap();
        init(None, 4).unwrap();
        set_single_threaded(true);
        for i in 0..4u64 {
            emit("single-threaded", i, 0);
        }
        set_single_threaded(false);
        deinit();
    }

    #[test]
    fn concurrent_emits_reserve_distinct_slots() {
        let _guard = TEST_LOCK.lock().unwrap();
        init(None, 1024).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|t| std::thread::spawn(move || {
                for i in 0..64u64 {
                    emit("thread emit", t, i);
                }
            }))
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        deinit();
    }
}
