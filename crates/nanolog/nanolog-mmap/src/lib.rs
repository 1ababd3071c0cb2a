//! File-backed and anonymous memory-mapped regions for the nanolog ring buffer.
//!
//! A producer process either points `init` at a path (the buffer survives
//! process death and can be decoded afterwards) or passes no path (an
//! anonymous region, useful for tests and in-process-only use).

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// User+group read/write, no access for others (spec §4.1).
#[cfg(unix)]
const BUFFER_FILE_MODE: u32 = 0o660;

/// Errors from creating or mapping a buffer region.
#[derive(Debug, thiserror::Error)]
pub enum MmapError {
    #[error("failed to open or size buffer file")]
    Io(#[from] io::Error),

    #[error("failed to map buffer region")]
    Map(#[source] io::Error),
}

pub struct MmapFileMut {
    /// File handle kept alive to maintain the memory map validity. `None` for
    /// an anonymous mapping.
    _file: Option<File>,
    /// Memory-mapped region providing mutable access to the buffer contents.
    mmap: MmapMut,
}

pub struct MmapFile {
    /// File handle kept alive to maintain the memory map validity.
    _file: File,
    /// Memory-mapped region providing read-only access to file contents.
    mmap: Mmap,
}

impl MmapFileMut {
    /// Create a new file sized to `size_bytes` and map it read-write.
    ///
    /// Requests the OS pre-populate pages so the first write on the hot path
    /// does not fault; this is best-effort and silently ignored where
    /// unsupported.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> Result<Self, MmapError> {
        let mut options = OpenOptions::new();
        options.create(true).read(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(BUFFER_FILE_MODE);
        let file = options.open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe {
            MmapOptions::new()
                .populate()
                .map_mut(&file)
                .map_err(MmapError::Map)?
        };
        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Open an existing file and map it read-write.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self, MmapError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(MmapError::Map)? };
        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Create an anonymous mapping of `size_bytes`, not backed by any file.
    /// Used when `init` is called without a path.
    pub fn create_anon(size_bytes: usize) -> Result<Self, MmapError> {
        let mmap = MmapOptions::new()
            .len(size_bytes)
            .map_anon()
            .map_err(MmapError::Map)?;
        Ok(Self {
            _file: None,
            mmap,
        })
    }

    /// Return raw pointer to start of memory mapped data.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl MmapFile {
    /// Open an existing file and map it read-only.
    pub fn open_ro<P: AsRef<Path>>(path: P) -> Result<Self, MmapError> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mmap = unsafe { Mmap::map(&file).map_err(MmapError::Map)? };
        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn mmap_roundtrip_bytes() {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = format!("/tmp/nanolog_mmap_test_{ts}");
        let size = 4096;

        {
            let mut mm = MmapFileMut::create_rw(&path, size).unwrap();
            unsafe {
                let p = mm.as_mut_ptr();
                *p.add(0) = 0xAB;
                *p.add(1) = 0xCD;
            }
        }
        {
            let mm = MmapFile::open_ro(&path).unwrap();
            unsafe {
                let p = mm.as_ptr();
                assert_eq!(*p.add(0), 0xAB);
                assert_eq!(*p.add(1), 0xCD);
            }
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn anon_mapping_is_writable() {
        let mut mm = MmapFileMut::create_anon(4096).unwrap();
        unsafe {
            let p = mm.as_mut_ptr();
            *p.add(10) = 0x42;
            assert_eq!(*p.add(10), 0x42);
        }
    }

    #[test]
    #[cfg(unix)]
    fn create_rw_sets_user_group_read_write_permission() {
        use std::os::unix::fs::PermissionsExt;

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = format!("/tmp/nanolog_mmap_perm_test_{ts}");

        // Clear the process umask for the duration of this check so the
        // assertion reflects the mode `create_rw` actually requested,
        // rather than whatever umask happens to be active in CI.
        let old_umask = unsafe { libc::umask(0) };
        let result = MmapFileMut::create_rw(&path, 4096);
        unsafe { libc::umask(old_umask) };
        let _mm = result.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        let _ = fs::remove_file(&path);
    }
}
