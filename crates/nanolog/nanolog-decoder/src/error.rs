use std::path::PathBuf;

/// Fatal decoder errors. Each one maps to a non-zero exit from
/// `nanolog-decode`; per-record problems (`StringError`, an unresolved LOC
/// id) never appear here.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer file not found or unreadable: {0}")]
    MissingBuffer(PathBuf),

    #[error("producer binary not found or unreadable: {0}")]
    MissingProducerBinary(PathBuf),

    #[error("buffer requires a sibling location decoder, but none was usable: {0:?}")]
    MissingLocDecoder(Option<PathBuf>),

    #[error("buffer header failed validation: {0}")]
    HeaderInvalid(&'static str),

    #[error("failed to parse producer binary")]
    BinaryParse(#[source] goblin::error::Error),
}

/// Per-record string resolution failure. Not fatal: the decoder prints a
/// placeholder and continues (spec's `UnresolvedString`, §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StringError {
    #[error("message pointer 0x{0:x} falls outside the producer binary's string region")]
    Unresolved(u64),
}
