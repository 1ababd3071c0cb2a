//! Captures the producer binary's own load base, so the decoder can turn a
//! `msg` pointer recorded at runtime back into a file offset.

/// A byte living in this crate's own rodata; `dladdr` resolves the shared
/// object (or main executable) containing any address we pass it, so any
/// local symbol works as the marker. A `static`, not a stack address, keeps
/// the lookup valid regardless of where `capture` is called from.
static MARKER: u8 = 0;

#[derive(Debug, thiserror::Error)]
#[error("could not determine producer load base")]
pub struct LoadBaseUnknown;

/// Returns the load base of the binary or shared object this code is linked
/// into, via `dladdr` on `MARKER`'s address.
#[cfg(unix)]
pub fn capture() -> Result<u64, LoadBaseUnknown> {
    let addr = &MARKER as *const u8 as *mut libc::c_void;
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::dladdr(addr, &mut info) };
    if rc == 0 || info.dli_fbase.is_null() {
        return Err(LoadBaseUnknown);
    }
    Ok(info.dli_fbase as u64)
}

#[cfg(not(unix))]
pub fn capture() -> Result<u64, LoadBaseUnknown> {
    Err(LoadBaseUnknown)
}
