use crate::load_base::LoadBaseUnknown;

/// Failures from [`crate::init`].
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("capacity must be a non-zero power of two no greater than 32768 (got {0})")]
    InvalidCapacity(usize),

    #[error(transparent)]
    Mmap(#[from] nanolog_mmap::MmapError),

    #[error(transparent)]
    LoadBase(#[from] LoadBaseUnknown),
}
