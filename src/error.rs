use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MapBufferError>;

/// Errors surfaced while building, reading, or validating a map buffer.
///
/// Structural problems are reported eagerly; a reader never hands back
/// partially decoded data. Lookup misses are a distinct kind so callers can
/// treat them as a value rather than a failure.
#[derive(Error, Debug)]
pub enum MapBufferError {
    #[error("magic number mismatch, expected \"mapbufr\"")]
    BadMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported compression type: {0:?}")]
    UnsupportedCompression(String),

    #[error("buffer truncated: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("key {0} was not found")]
    KeyNotFound(u64),

    #[error("lookup against an empty map buffer")]
    EmptyBuffer,

    #[error("duplicate key: {0}")]
    DuplicateKey(u64),

    #[error("too many entries: {0} exceeds the u32 index size")]
    TooManyEntries(u64),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
