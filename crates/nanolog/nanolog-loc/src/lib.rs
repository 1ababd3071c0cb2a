//! The LOC oracle: `loc_id -> (file, line, optional function)`.
//!
//! The core only consumes this mapping; it never assigns the ids itself
//! beyond the const-evaluated convenience in [`loc_hash`] (see DESIGN.md,
//! OQ-1, for why that stands in for the external compile-time pass the
//! specification treats as an outside collaborator). Two concrete
//! realizations are supported, selected by the buffer header's `loc_type`:
//!
//! - [`NamedSectionOracle`]: the producer binary carries a dedicated
//!   section of fixed-size `(id, file, line, function)` records, written by
//!   one `static` per call site via [`RawLocRecord::new`] placed in
//!   [`LINUX_SECTION_NAME`] / [`MACOS_SECTION_SPEC`]. The decoder parses
//!   that section directly out of the binary on disk.
//! - [`SiblingLocDecoder`]: an external binary (conventionally
//!   `<producer_name>_loc`) is invoked with the `loc_id` as an argument and
//!   prints one `file:line[:function]` line to stdout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Linux/ELF link-section name carrying the named-section LOC table.
pub const LINUX_SECTION_NAME: &str = ".nanolog_loc";
/// Mach-O `link_section` spec (`segment,section`) for the same table.
pub const MACOS_SECTION_SPEC: &str = "__DATA,__nanolog_loc";
/// Bare Mach-O section name (without the segment), as goblin reports it.
pub const MACOS_SECTION_NAME: &str = "__nanolog_loc";

const MAX_FILE_LEN: usize = 96;
const MAX_FUNC_LEN: usize = 48;

/// A decoded location: source file, line, and optionally the enclosing
/// function/module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocEntry {
    pub file: String,
    pub line: u32,
    pub function: Option<String>,
}

/// A mapping from `loc_id` to source location. The core depends only on
/// this trait; `nanolog-decoder` picks an implementation based on the
/// buffer header's `loc_type`.
pub trait LocOracle {
    fn lookup(&self, loc_id: u32) -> Option<LocEntry>;
}

/// Fixed-size, pointer-free record written into the named LOC section.
///
/// Pointer-free is not an optimization here: the decoder reads this struct
/// back out of the *file on disk*, where any pointer captured at producer
/// runtime would be meaningless. `file`/`function` are therefore inline byte
/// arrays, truncated at `MAX_FILE_LEN`/`MAX_FUNC_LEN`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawLocRecord {
    pub id: u32,
    pub line: u32,
    file_len: u8,
    func_len: u8,
    _pad: u16,
    file: [u8; MAX_FILE_LEN],
    func: [u8; MAX_FUNC_LEN],
}

pub const RAW_RECORD_SIZE: usize = std::mem::size_of::<RawLocRecord>();

impl RawLocRecord {
    /// Builds a record at compile time from `file!()`/`line!()`/
    /// `module_path!()` supplied by the call site's macro expansion.
    pub const fn new(id: u32, file: &'static str, line: u32, func: &'static str) -> Self {
        let file_bytes = file.as_bytes();
        let func_bytes = func.as_bytes();
        let file_len = if file_bytes.len() > MAX_FILE_LEN {
            MAX_FILE_LEN
        } else {
            file_bytes.len()
        };
        let func_len = if func_bytes.len() > MAX_FUNC_LEN {
            MAX_FUNC_LEN
        } else {
            func_bytes.len()
        };

        let mut file_arr = [0u8; MAX_FILE_LEN];
        let mut i = 0;
        while i < file_len {
            file_arr[i] = file_bytes[i];
            i += 1;
        }
        let mut func_arr = [0u8; MAX_FUNC_LEN];
        let mut j = 0;
        while j < func_len {
            func_arr[j] = func_bytes[j];
            j += 1;
        }

        RawLocRecord {
            id,
            line,
            file_len: file_len as u8,
            func_len: func_len as u8,
            _pad: 0,
            file: file_arr,
            func: func_arr,
        }
    }

    pub fn file(&self) -> &str {
        std::str::from_utf8(&self.file[..self.file_len as usize]).unwrap_or("<invalid-utf8>")
    }

    pub fn function(&self) -> Option<&str> {
        if self.func_len == 0 {
            None
        } else {
            std::str::from_utf8(&self.func[..self.func_len as usize]).ok()
        }
    }

    fn to_entry(self) -> LocEntry {
        LocEntry {
            file: self.file().to_string(),
            line: self.line,
            function: self.function().map(str::to_string),
        }
    }
}

/// A stable 32-bit id for a `(file, line)` pair, computed with FNV-1a so it
/// can be evaluated in a `const` context at the call site and does not
/// require any build-time tooling.
pub const fn loc_hash(file: &str, line: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    let bytes = file.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        i += 1;
    }
    let line_bytes = line.to_le_bytes();
    let mut j = 0;
    while j < line_bytes.len() {
        hash ^= line_bytes[j] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        j += 1;
    }
    // 0 is reserved to mean "no location" (see Record::loc).
    if hash == 0 { 1 } else { hash }
}

/// Parses raw section bytes (as read from the producer binary by the
/// decoder) into individual records. Ignores a trailing partial record, same
/// tolerance the decoder applies to a truncated buffer file.
pub fn parse_section(bytes: &[u8]) -> Vec<RawLocRecord> {
    bytes
        .chunks_exact(RAW_RECORD_SIZE)
        .map(|chunk| {
            let mut buf = [0u8; RAW_RECORD_SIZE];
            buf.copy_from_slice(chunk);
            // SAFETY: RawLocRecord is a `repr(C)` struct of plain integers
            // and byte arrays; any bit pattern of the right size is valid.
            unsafe { std::mem::transmute::<[u8; RAW_RECORD_SIZE], RawLocRecord>(buf) }
        })
        .collect()
}

/// Named-section LOC oracle: builds an in-memory index from the raw section
/// bytes once, then answers lookups from it.
pub struct NamedSectionOracle {
    table: HashMap<u32, LocEntry>,
}

impl NamedSectionOracle {
    pub fn from_section_bytes(bytes: &[u8]) -> Self {
        let table = parse_section(bytes)
            .into_iter()
            .map(|r| (r.id, r.to_entry()))
            .collect();
        Self { table }
    }
}

impl LocOracle for NamedSectionOracle {
    fn lookup(&self, loc_id: u32) -> Option<LocEntry> {
        self.table.get(&loc_id).cloned()
    }
}

/// Table-based LOC oracle: shells out to a sibling decoder binary per
/// lookup. `demos/loc-decoder-stub` is a reference implementation of the
/// expected protocol (`<binary> <loc_id>` on stdout: `file:line[:function]`).
pub struct SiblingLocDecoder {
    binary_path: PathBuf,
}

impl SiblingLocDecoder {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn is_present(&self) -> bool {
        self.binary_path.is_file()
    }
}

impl LocOracle for SiblingLocDecoder {
    fn lookup(&self, loc_id: u32) -> Option<LocEntry> {
        let output = Command::new(&self.binary_path)
            .arg(loc_id.to_string())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let line = String::from_utf8(output.stdout).ok()?;
        parse_sibling_line(line.trim())
    }
}

fn parse_sibling_line(line: &str) -> Option<LocEntry> {
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(3, ':');
    let file = parts.next()?.to_string();
    let line_no: u32 = parts.next()?.parse().ok()?;
    let function = parts.next().map(str::to_string);
    Some(LocEntry {
        file,
        line: line_no,
        function,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_nonzero() {
        let a = loc_hash("producer.src", 42);
        let b = loc_hash("producer.src", 42);
        assert_eq!(a, b);
        assert_ne!(a, 0);
    }

    #[test]
    fn hash_differs_by_line() {
        assert_ne!(loc_hash("producer.src", 1), loc_hash("producer.src", 2));
    }

    #[test]
    fn raw_record_roundtrips_short_strings() {
        let r = RawLocRecord::new(7, "producer.src", 42, "my_fn");
        assert_eq!(r.id, 7);
        assert_eq!(r.line, 42);
        assert_eq!(r.file(), "producer.src");
        assert_eq!(r.function(), Some("my_fn"));
    }

    #[test]
    fn raw_record_truncates_overlong_strings() {
        let long_file = "x".repeat(MAX_FILE_LEN + 20);
        let r = RawLocRecord::new(1, Box::leak(long_file.clone().into_boxed_str()), 1, "");
        assert_eq!(r.file().len(), MAX_FILE_LEN);
        assert_eq!(r.function(), None);
    }

    #[test]
    fn section_parses_back_to_entries() {
        let records = [
            RawLocRecord::new(1, "a.rs", 10, "f"),
            RawLocRecord::new(2, "b.rs", 20, "g"),
        ];
        let mut bytes = Vec::new();
        for r in &records {
            let raw: [u8; RAW_RECORD_SIZE] =
                unsafe { std::mem::transmute_copy::<RawLocRecord, _>(r) };
            bytes.extend_from_slice(&raw);
        }
        let oracle = NamedSectionOracle::from_section_bytes(&bytes);
        let e1 = oracle.lookup(1).unwrap();
        assert_eq!(e1.file, "a.rs");
        assert_eq!(e1.line, 10);
        let e2 = oracle.lookup(2).unwrap();
        assert_eq!(e2.file, "b.rs");
        assert_eq!(e2.line, 20);
        assert!(oracle.lookup(3).is_none());
    }

    #[test]
    fn sibling_line_parses_with_and_without_function() {
        let e = parse_sibling_line("producer.src:42:my_fn").unwrap();
        assert_eq!(e.file, "producer.src");
        assert_eq!(e.line, 42);
        assert_eq!(e.function.as_deref(), Some("my_fn"));

        let e2 = parse_sibling_line("producer.src:42").unwrap();
        assert_eq!(e2.function, None);
    }

    #[test]
    fn missing_sibling_binary_reports_absent() {
        let dec = SiblingLocDecoder::new("/definitely/not/a/real/path/loc_decoder");
        assert!(!dec.is_present());
    }
}
