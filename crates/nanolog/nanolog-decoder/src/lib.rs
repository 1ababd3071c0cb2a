//! Offline reconstruction of a human-readable trace from a nanolog buffer
//! file and the producer binary that wrote it.

mod error;
mod resolver;

use nanolog_loc::{LocEntry, LocOracle, SiblingLocDecoder};
use nanolog_record::{BufferHeader, HEADER_SIZE, LocType, Platform, RECORD_SIZE, Record};
use resolver::StringResolver;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::Ordering;

pub use error::{DecodeError, StringError};

/// One fully decoded record, ready to print.
pub struct DecodedRecord {
    pub tid: u32,
    pub raw_loc: u32,
    pub loc: Option<LocEntry>,
    pub msg_ptr: u64,
    pub message: Result<String, StringError>,
    pub arg1: u64,
    pub arg2: u64,
}

impl std::fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tid={} ", self.tid)?;
        match &self.loc {
            Some(entry) => write!(f, "[{}:{}] ", entry.file, entry.line)?,
            None if self.raw_loc != 0 => write!(f, "[loc={}] ", self.raw_loc)?,
            None => {}
        }
        match &self.message {
            Ok(msg) => write!(f, "'{msg}' ")?,
            Err(_) => write!(f, "'<unresolved 0x{:x}>' ", self.msg_ptr)?,
        }
        write!(f, "arg1={} arg2={}", self.arg1, self.arg2)
    }
}

/// Opens a buffer file plus the producer binary that wrote it, and decodes
/// records from the pair. See spec §4.7 for the algorithm this follows.
pub struct Decoder {
    buffer: nanolog_mmap::MmapFile,
    idx: u64,
    capacity: u64,
    live_count: u64,
    truncated: bool,
    fbase: u64,
    resolver: StringResolver,
    oracle: Option<Box<dyn LocOracle>>,
    producer_bytes: Vec<u8>,
}

impl Decoder {
    /// `loc_decoder_path` is required only when the buffer's `loc_type` is
    /// table-based; it is ignored otherwise. Equivalent to
    /// `open_with_options(..., true)`.
    pub fn open(
        buffer_path: &Path,
        producer_path: &Path,
        loc_decoder_path: Option<&Path>,
    ) -> Result<Self, DecodeError> {
        Self::open_with_options(buffer_path, producer_path, loc_decoder_path, true)
    }

    /// `decode_locations` mirrors the decoder CLI's optional mode flag
    /// (spec §6): when `false`, location ids are left raw and no LOC
    /// oracle is built, even if the header's `loc_type` calls for one.
    pub fn open_with_options(
        buffer_path: &Path,
        producer_path: &Path,
        loc_decoder_path: Option<&Path>,
        decode_locations: bool,
    ) -> Result<Self, DecodeError> {
        let buffer = nanolog_mmap::MmapFile::open_ro(buffer_path)
            .map_err(|_| DecodeError::MissingBuffer(buffer_path.to_path_buf()))?;

        if buffer.len() < HEADER_SIZE {
            return Err(DecodeError::HeaderInvalid(
                "file too small to contain a header",
            ));
        }

        // SAFETY: just checked the mapping is at least `HEADER_SIZE` bytes.
        let header = unsafe { &*(buffer.as_ptr() as *const BufferHeader) };
        header.validate().map_err(DecodeError::HeaderInvalid)?;

        let capacity = header.capacity as u64;
        let fbase = header.fbase;
        let platform = Platform::from_u8(header.platform).expect("validated above");
        let loc_type = LocType::from_u8(header.loc_type).expect("validated above");
        let idx = header.idx.load(Ordering::Relaxed);

        let available_records = (buffer.len() - HEADER_SIZE) / RECORD_SIZE;
        let truncated = (available_records as u64) < capacity;
        let live_count = capacity.min(available_records as u64);
        if truncated {
            tracing::warn!(
                expected = capacity,
                available = available_records,
                "buffer file is smaller than header + capacity records; decoding available records only"
            );
        }

        let producer_bytes = std::fs::read(producer_path)
            .map_err(|_| DecodeError::MissingProducerBinary(producer_path.to_path_buf()))?;

        let (resolver, named_oracle) = match platform {
            Platform::Elf => resolver::build_elf_resolver(&producer_bytes)?,
            Platform::MachO => resolver::build_macho_resolver(&producer_bytes)?,
        };

        let oracle: Option<Box<dyn LocOracle>> = if !decode_locations {
            None
        } else {
            match loc_type {
                LocType::None => None,
                LocType::NamedSection => named_oracle.map(|o| Box::new(o) as Box<dyn LocOracle>),
                LocType::Table => {
                    let sibling_path: PathBuf = loc_decoder_path
                        .ok_or(DecodeError::MissingLocDecoder(None))?
                        .to_path_buf();
                    let sibling = SiblingLocDecoder::new(sibling_path.clone());
                    if !sibling.is_present() {
                        return Err(DecodeError::MissingLocDecoder(Some(sibling_path)));
                    }
                    Some(Box::new(sibling))
                }
            }
        };

        Ok(Self {
            buffer,
            idx,
            capacity,
            live_count,
            truncated,
            fbase,
            resolver,
            oracle,
            producer_bytes,
        })
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn record_count(&self) -> u64 {
        self.idx
    }

    /// Decodes the live window in oldest-first logical order (or, if the
    /// file is truncated, every full record physically present).
    pub fn decode_records(&self) -> Vec<DecodedRecord> {
        let slots: Vec<u64> = if self.truncated {
            (0..self.live_count).collect()
        } else {
            nanolog_record::live_window(self.idx, self.capacity)
        };
        slots.into_iter().map(|slot| self.decode_slot(slot)).collect()
    }

    fn decode_slot(&self, slot: u64) -> DecodedRecord {
        let offset = HEADER_SIZE + slot as usize * RECORD_SIZE;
        // SAFETY: `slot` is bounded by `live_count`/`capacity`, both checked
        // against the mapping's actual length in `open`.
        let record = unsafe { ptr::read_unaligned(self.buffer.as_ptr().add(offset) as *const Record) };

        let message = resolver::resolve_string(&self.resolver, self.fbase, record.msg, &self.producer_bytes);
        let loc = if record.loc != 0 {
            self.oracle.as_ref().and_then(|o| o.lookup(record.loc))
        } else {
            None
        };

        DecodedRecord {
            tid: record.tid,
            raw_loc: record.loc,
            loc,
            msg_ptr: record.msg,
            message,
            arg1: record.arg1,
            arg2: record.arg2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn temp_path(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("nanolog_decoder_test_{name}_{ts}"))
    }

    #[test]
    fn s1_trivial_three_record_trace() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("s1");
        nanolog::init(Some(&buf_path), 8).unwrap();
        nanolog::emit("hello", 0, 0);
        nanolog::emit("hello", 0, 0);
        nanolog::emit("hello", 0, 0);
        nanolog::deinit();

        let producer = std::env::current_exe().unwrap();
        let decoder = Decoder::open(&buf_path, &producer, None).unwrap();
        let records = decoder.decode_records();

        assert_eq!(records.len(), 3);
        for r in &records {
            assert_eq!(r.message.as_deref(), Ok("hello"));
            assert_eq!(r.arg1, 0);
            assert_eq!(r.arg2, 0);
        }

        let _ = std::fs::remove_file(&buf_path);
    }

    #[test]
    fn s2_argument_fidelity() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("s2");
        nanolog::init(Some(&buf_path), 8).unwrap();
        nanolog::emit("memwrite(addr=%x,size=%d)", 0xDEAD_BABE, 1024);
        nanolog::deinit();

        let producer = std::env::current_exe().unwrap();
        let decoder = Decoder::open(&buf_path, &producer, None).unwrap();
        let records = decoder.decode_records();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].message.as_deref(),
            Ok("memwrite(addr=%x,size=%d)")
        );
        assert_eq!(records[0].arg1, 0xDEAD_BABE);
        assert_eq!(records[0].arg2, 1024);

        let _ = std::fs::remove_file(&buf_path);
    }

    #[test]
    fn s3_wrap_correctness() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("s3");
        let capacity = 16u64;
        nanolog::init(Some(&buf_path), capacity as usize).unwrap();
        for i in 0..(capacity + 5) {
            nanolog::emit("m", i, 0);
        }
        nanolog::deinit();

        let producer = std::env::current_exe().unwrap();
        let decoder = Decoder::open(&buf_path, &producer, None).unwrap();
        let records = decoder.decode_records();

        assert_eq!(records.len(), capacity as usize);
        assert_eq!(records.first().unwrap().arg1, 5);
        assert_eq!(records.last().unwrap().arg1, capacity + 4);

        let _ = std::fs::remove_file(&buf_path);
    }

    #[test]
    fn wrong_producer_binary_yields_unresolved_strings() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("wrong_binary");
        nanolog::init(Some(&buf_path), 4).unwrap();
        nanolog::emit("hello", 0, 0);
        nanolog::deinit();

        // `/bin/true` (or equivalent) almost certainly doesn't contain
        // this test binary's "hello" literal at the recorded offset.
        let bogus_producer = PathBuf::from(if cfg!(target_os = "macos") {
            "/usr/bin/true"
        } else {
            "/bin/true"
        });
        if !bogus_producer.is_file() {
            let _ = std::fs::remove_file(&buf_path);
            return;
        }
        let decoder = Decoder::open(&buf_path, &bogus_producer, None).unwrap();
        let records = decoder.decode_records();
        assert_eq!(records.len(), 1);
        assert!(records[0].message.is_err());

        let _ = std::fs::remove_file(&buf_path);
    }

    #[test]
    fn s6_missing_loc_decoder_is_fatal() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("s6");
        // SAFETY: test is serialized by TEST_LOCK; no concurrent env reads.
        unsafe { std::env::set_var("NANOLOG_LOC", "1") };
        nanolog::init(Some(&buf_path), 4).unwrap();
        nanolog::emit("x", 1, 2);
        nanolog::deinit();
        unsafe { std::env::remove_var("NANOLOG_LOC") };

        let producer = std::env::current_exe().unwrap();
        let err = Decoder::open(&buf_path, &producer, None).unwrap_err();
        assert!(matches!(err, DecodeError::MissingLocDecoder(None)));

        let _ = std::fs::remove_file(&buf_path);
    }

    #[test]
    fn no_loc_buffer_decodes_without_a_loc_decoder() {
        let _guard = TEST_LOCK.lock().unwrap();
        let buf_path = temp_path("no_loc");
        nanolog::init(Some(&buf_path), 4).unwrap();
        nanolog::emit("x", 1, 2);
        nanolog::deinit();

        let producer = std::env::current_exe().unwrap();
        let decoder = Decoder::open(&buf_path, &producer, None).unwrap();
        assert_eq!(decoder.decode_records().len(), 1);

        let _ = std::fs::remove_file(&buf_path);
    }
}
