//! On-disk layout of the nanolog ring buffer: the 32-byte record, the
//! 32-byte header that precedes it, and the index arithmetic that maps a
//! monotonic slot counter onto a position in the ring.
//!
//! Both sizes are load-bearing for the offline decoder, which hard-codes
//! them; they are asserted at compile time below, not checked at runtime.

use std::mem::size_of;
use std::sync::atomic::AtomicU64;

/// Platform tag stored in the header, steering the decoder's string-
/// resolution strategy. Encoded at compile time via `cfg(target_os)`; never
/// branched on inside the producer hot path.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// ELF-like (Linux and other ELF targets).
    Elf = 1,
    /// Mach-O (macOS).
    MachO = 2,
}

impl Platform {
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::MachO
        }
        #[cfg(not(target_os = "macos"))]
        {
            Platform::Elf
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Platform::Elf),
            2 => Some(Platform::MachO),
            _ => None,
        }
    }
}

/// LOC encoding mode, echoed from the `NANOLOG_LOC` environment variable
/// into the header's `loc_type` field at `init` time.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocType {
    /// No location ids; `loc` is always 0.
    None = 0,
    /// A sibling decoder binary resolves `loc_id -> (file, line, function)`.
    Table = 1,
    /// The producer binary carries a dedicated section the decoder parses.
    NamedSection = 2,
}

impl LocType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LocType::None),
            1 => Some(LocType::Table),
            2 => Some(LocType::NamedSection),
            _ => None,
        }
    }
}

/// One logged event: thread id, code-location id, message pointer, two
/// opaque integer arguments. Exactly 32 bytes; `repr(C)` keeps the field
/// order and padding predictable across the process boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Record {
    /// OS thread identifier of the producer thread.
    pub tid: u32,
    /// Code-location identifier; 0 means "unused".
    pub loc: u32,
    /// Address of a constant string in the producer's read-only data.
    pub msg: u64,
    /// First caller-supplied integer argument.
    pub arg1: u64,
    /// Second caller-supplied integer argument.
    pub arg2: u64,
}

impl Record {
    pub const EMPTY: Record = Record {
        tid: 0,
        loc: 0,
        msg: 0,
        arg1: 0,
        arg2: 0,
    };
}

/// Header at the start of every buffer, followed immediately by `capacity`
/// records. Exactly 32 bytes so the record array begins at a fixed offset.
#[repr(C)]
pub struct BufferHeader {
    /// Monotonically increasing count of slots reserved since `init`. Never
    /// reset, never wraps (64-bit). Writers claim a slot with
    /// `fetch_add(1)`; the live window is `idx mod capacity` once
    /// `idx >= capacity`.
    pub idx: AtomicU64,
    /// Load base of the producer's string-literal region, captured at
    /// `init` (see `nanolog-core`'s load-base capture).
    pub fbase: u64,
    _pad0: u32,
    /// Number of slots in the ring. Must be a power of two.
    pub capacity: u16,
    /// `Platform` tag, as `u8`.
    pub platform: u8,
    /// `LocType` tag, as `u8`.
    pub loc_type: u8,
    _pad1: u64,
}

pub const HEADER_SIZE: usize = size_of::<BufferHeader>();
pub const RECORD_SIZE: usize = size_of::<Record>();

const _: () = assert!(RECORD_SIZE == 32, "Record must be exactly 32 bytes");
const _: () = assert!(HEADER_SIZE == 32, "BufferHeader must be exactly 32 bytes");

impl BufferHeader {
    /// Construct header contents for a fresh buffer. Callers write this at
    /// offset 0 of a freshly mapped region; `idx` starts at 0.
    pub fn new(fbase: u64, capacity: u16, platform: Platform, loc_type: LocType) -> Self {
        Self {
            idx: AtomicU64::new(0),
            fbase,
            _pad0: 0,
            capacity,
            platform: platform as u8,
            loc_type: loc_type as u8,
            _pad1: 0,
        }
    }

    /// Validate header invariants a decoder (or a re-`init`ing producer)
    /// must check before trusting the rest of the file.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.capacity == 0 {
            return Err("capacity must be non-zero");
        }
        if !(self.capacity as usize).is_power_of_two() {
            return Err("capacity must be a power of two");
        }
        if Platform::from_u8(self.platform).is_none() {
            return Err("unknown platform tag");
        }
        if LocType::from_u8(self.loc_type).is_none() {
            return Err("unknown loc_type tag");
        }
        Ok(())
    }
}

/// Bitmask for `capacity` (must be a power of two): `index = seq & mask`.
#[inline(always)]
pub fn mask_for(capacity: u64) -> u64 {
    debug_assert!(capacity.is_power_of_two());
    capacity - 1
}

/// Maps a monotonically increasing slot counter to a ring position.
#[inline(always)]
pub fn seq_to_index(seq: u64, mask: u64) -> u64 {
    seq & mask
}

/// Total bytes needed for a buffer region: header plus `capacity` records.
pub fn bytes_for_buffer(capacity: usize) -> usize {
    HEADER_SIZE + capacity * RECORD_SIZE
}

/// Given `idx` and `capacity`, returns the logical slot indices to read, in
/// oldest-first order: `0..idx` if the ring hasn't wrapped, else exactly
/// `capacity` entries starting at `idx mod capacity`.
pub fn live_window(idx: u64, capacity: u64) -> Vec<u64> {
    if idx < capacity {
        (0..idx).collect()
    } else {
        let mask = mask_for(capacity);
        let start = idx & mask;
        (0..capacity).map(|i| (start + i) & mask).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_stable() {
        assert_eq!(RECORD_SIZE, 32);
        assert_eq!(HEADER_SIZE, 32);
    }

    #[test]
    fn mask_and_index_wrap() {
        let mask = mask_for(8);
        assert_eq!(mask, 7);
        assert_eq!(seq_to_index(0, mask), 0);
        assert_eq!(seq_to_index(5, mask), 5);
        assert_eq!(seq_to_index(8, mask), 0);
        assert_eq!(seq_to_index(15, mask), 7);
    }

    #[test]
    fn live_window_before_wrap() {
        let w = live_window(5, 16);
        assert_eq!(w, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn live_window_after_wrap() {
        // capacity=16, idx=16389 -> oldest starts at 16389 % 16 = 5
        let w = live_window(16389, 16);
        assert_eq!(w.len(), 16);
        assert_eq!(w[0], 5);
        assert_eq!(w[15], 4);
    }

    #[test]
    fn header_validate_rejects_bad_capacity() {
        let mut h = BufferHeader::new(0, 3, Platform::Elf, LocType::None);
        h.capacity = 3;
        assert!(h.validate().is_err());
    }

    #[test]
    fn header_validate_accepts_good_header() {
        let h = BufferHeader::new(0x1000, 1024, Platform::current(), LocType::None);
        assert!(h.validate().is_ok());
    }
}
