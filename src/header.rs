use std::io::{Cursor, Read, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::{
    CHECKSUM_LENGTH, Compression, FORMAT_VERSIONS, HEADER_LENGTH, INDEX_PAIR_LENGTH,
    MAGIC_NUMBERS, MapBufferError, Result,
};

/// The fixed 16-byte frame header at the start of every serialized buffer.
///
/// Layout (little-endian): 7 bytes of magic, one version byte, the 4-byte
/// compression tag, and the entry count as a u32. The header fully determines
/// the geometry of the index region; the data region runs from the end of the
/// index to the end of the buffer, minus the CRC32C trailer on version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapBufferHeader {
    /// Format version, 0 or 1.
    pub format_version: u8,
    /// Per-value compression scheme.
    pub compression: Compression,
    /// Number of `(label, offset)` pairs in the index.
    pub entry_count: u32,
}

impl MapBufferHeader {
    /// Encodes the header into its fixed wire representation.
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut buffer = [0u8; HEADER_LENGTH];
        let mut cursor = Cursor::new(&mut buffer[..]);
        cursor.write_all(&MAGIC_NUMBERS).unwrap();
        cursor.write_u8(self.format_version).unwrap();
        cursor.write_all(&self.compression.tag()).unwrap();
        cursor.write_u32::<LittleEndian>(self.entry_count).unwrap();
        buffer
    }

    /// Decodes and checks the header at the front of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::Truncated`] when fewer than 16 bytes are
    /// available, [`MapBufferError::BadMagic`], [`MapBufferError::UnsupportedVersion`],
    /// or [`MapBufferError::UnsupportedCompression`] when the respective field
    /// is not recognized.
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_LENGTH {
            return Err(MapBufferError::Truncated {
                expected: HEADER_LENGTH,
                actual: buffer.len(),
            });
        }
        if buffer[..MAGIC_NUMBERS.len()] != MAGIC_NUMBERS {
            return Err(MapBufferError::BadMagic);
        }

        let mut cursor = Cursor::new(&buffer[MAGIC_NUMBERS.len()..HEADER_LENGTH]);
        let format_version = cursor.read_u8().unwrap();
        if !FORMAT_VERSIONS.contains(&format_version) {
            return Err(MapBufferError::UnsupportedVersion(format_version));
        }

        let mut tag = [0u8; 4];
        cursor.read_exact(&mut tag).unwrap();
        let compression = Compression::from_tag(tag)?;

        let entry_count = cursor.read_u32::<LittleEndian>().unwrap();
        Ok(MapBufferHeader {
            format_version,
            compression,
            entry_count,
        })
    }

    /// Length in bytes of the CRC32C trailer, 0 for version 0 buffers.
    pub fn checksum_length(&self) -> usize {
        if self.format_version >= 1 { CHECKSUM_LENGTH } else { 0 }
    }

    /// Length in bytes of the index region.
    pub fn index_length(&self) -> usize {
        self.entry_count as usize * INDEX_PAIR_LENGTH
    }

    /// Byte range of the index region within the buffer.
    pub fn index_range(&self) -> Range<usize> {
        HEADER_LENGTH..HEADER_LENGTH + self.index_length()
    }

    /// Offset of the first data byte, which is also the smallest valid
    /// entry offset.
    pub fn data_start(&self) -> usize {
        HEADER_LENGTH + self.index_length()
    }

    /// Smallest buffer that can carry this header's regions.
    pub fn minimum_buffer_length(&self) -> usize {
        self.data_start() + self.checksum_length()
    }
}

/// Serializable summary of a buffer, as reported by
/// [`MapBuffer::info`](crate::MapBuffer::info).
#[derive(Debug, Clone, Serialize)]
pub struct MapBufferInfo {
    /// Number of keys stored.
    pub entry_count: usize,
    /// Format version byte.
    pub format_version: u8,
    /// Compression scheme name.
    pub compression: &'static str,
    /// Total serialized length in bytes.
    pub buffer_length: usize,
    /// Length in bytes of the index region.
    pub index_length: usize,
    /// Length in bytes of the data region.
    pub data_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let header = MapBufferHeader {
            format_version: 1,
            compression: Compression::Zstd,
            entry_count: 77,
        };
        assert_eq!(MapBufferHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_known_encoding() {
        // Version 0, gzip, N = 1024.
        let header = MapBufferHeader {
            format_version: 0,
            compression: Compression::Gzip,
            entry_count: 1024,
        };
        assert_eq!(
            header.encode(),
            *b"\x6d\x61\x70\x62\x75\x66\x72\x00\x67\x7a\x69\x70\x00\x04\x00\x00"
        );
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        let header = MapBufferHeader {
            format_version: 0,
            compression: Compression::None,
            entry_count: 2,
        };

        assert!(matches!(
            MapBufferHeader::decode(&header.encode()[..10]),
            Err(MapBufferError::Truncated { .. })
        ));

        let mut bad_magic = header.encode();
        bad_magic[0] = b'X';
        assert!(matches!(
            MapBufferHeader::decode(&bad_magic),
            Err(MapBufferError::BadMagic)
        ));

        let mut bad_version = header.encode();
        bad_version[7] = 9;
        assert!(matches!(
            MapBufferHeader::decode(&bad_version),
            Err(MapBufferError::UnsupportedVersion(9))
        ));

        let mut bad_tag = header.encode();
        bad_tag[8..12].copy_from_slice(b"lz77");
        assert!(matches!(
            MapBufferHeader::decode(&bad_tag),
            Err(MapBufferError::UnsupportedCompression(_))
        ));
    }

    #[test]
    fn test_geometry() {
        let header = MapBufferHeader {
            format_version: 1,
            compression: Compression::None,
            entry_count: 3,
        };
        assert_eq!(header.index_range(), 16..64);
        assert_eq!(header.data_start(), 64);
        assert_eq!(header.checksum_length(), 4);
        assert_eq!(header.minimum_buffer_length(), 68);

        let bare = MapBufferHeader {
            format_version: 0,
            ..header
        };
        assert_eq!(bare.checksum_length(), 0);
        assert_eq!(bare.minimum_buffer_length(), 64);
    }
}
