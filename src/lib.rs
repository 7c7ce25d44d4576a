//! Serializable map of `u64` keys to binary values with near zero parsing.
//!
//! The `mapbuffer` crate stores dictionaries mapping unsigned 64-bit integers
//! to byte strings in a compact serialized format that can be queried without
//! parsing the container first. Lookups run a cache-aware binary search
//! directly against the serialized bytes, so a buffer holding thousands of
//! entries can serve a handful of point reads at almost no cost. Values may be
//! individually compressed, buffers may carry a CRC32C trailer, and the same
//! bytes can be shared read-only between threads or processes (for example
//! through a memory map).
//!
//! Typical usage builds a buffer with [`MapBufferBuilder`] and attaches a
//! [`MapBuffer`] reader to the resulting bytes:
//!
//! ```
//! use mapbuffer::{MapBuffer, MapBufferBuilder};
//!
//! # fn main() -> mapbuffer::Result<()> {
//! let entries = [(2848u64, b"abc".to_vec()), (12939u64, b"123".to_vec())];
//! let bytes = MapBufferBuilder::new().build(entries)?;
//!
//! let map = MapBuffer::from_bytes(bytes)?;
//! assert_eq!(map.get(2848)?.as_deref(), Some(&b"abc"[..]));
//! assert!(!map.contains(99));
//! # Ok(())
//! # }
//! ```

/// Magic prefix identifying a serialized map buffer.
pub const MAGIC_NUMBERS: [u8; 7] = *b"mapbufr";

/// Size in bytes of the fixed frame header.
pub const HEADER_LENGTH: usize = 16;

/// Size in bytes of one `(label, offset)` index pair.
pub const INDEX_PAIR_LENGTH: usize = 16;

/// Size in bytes of the CRC32C trailer carried by version 1 buffers.
pub const CHECKSUM_LENGTH: usize = 4;

/// Format versions a reader accepts. Version 1 appends a CRC32C trailer.
pub const FORMAT_VERSIONS: [u8; 2] = [0, 1];

/// Format version the builder emits unless told otherwise.
pub const CURRENT_FORMAT_VERSION: u8 = 1;

mod error;
pub use error::{MapBufferError, Result};

mod compression;
pub use compression::Compression;

mod eytzinger;

mod header;
pub use header::{MapBufferHeader, MapBufferInfo};

mod builder;
pub use builder::MapBufferBuilder;

mod mapbuffer;
pub use mapbuffer::{MapBuffer, MapBufferItems, MapBufferKeys, MapBufferValues, ValueDecoder};

mod validate;
pub use validate::validate;
