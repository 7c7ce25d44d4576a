use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::eytzinger::eytzinger_layout;
use crate::{
    CURRENT_FORMAT_VERSION, Compression, FORMAT_VERSIONS, HEADER_LENGTH, INDEX_PAIR_LENGTH,
    MapBufferError, MapBufferHeader, Result,
};

/// Builder type for serializing a key-value mapping into a map buffer.
///
/// The builder owns the format configuration: the per-value compression
/// scheme and the format version to emit. [`build`](Self::build) consumes any
/// iterable of `(u64, bytes)` pairs; [`build_with`](Self::build_with)
/// additionally threads every value through a user-supplied encode function
/// before compression.
///
/// The full key set must be known up front; there is no streaming
/// construction. The output is a single contiguous byte vector sized to the
/// exact final length.
#[derive(Debug, Clone)]
pub struct MapBufferBuilder {
    compression: Compression,
    format_version: u8,
}

impl Default for MapBufferBuilder {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            format_version: CURRENT_FORMAT_VERSION,
        }
    }
}

impl MapBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the per-value compression scheme. Defaults to no compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Overrides the format version to emit.
    ///
    /// Version 1 (the default) appends a CRC32C trailer over the whole
    /// buffer; version 0 has no trailer.
    pub fn with_format_version(mut self, version: u8) -> Self {
        self.format_version = version;
        self
    }

    /// Serializes `entries` into a map buffer.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::DuplicateKey`] when a key appears twice,
    /// [`MapBufferError::TooManyEntries`] when the entry count does not fit
    /// the u32 index size, and compression or codec errors from the
    /// configured scheme.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapbuffer::{Compression, MapBuffer, MapBufferBuilder};
    ///
    /// # fn main() -> mapbuffer::Result<()> {
    /// let bytes = MapBufferBuilder::new()
    ///     .with_compression(Compression::Gzip)
    ///     .build([(7u64, b"seven".to_vec()), (11u64, b"eleven".to_vec())])?;
    /// let map = MapBuffer::from_bytes(bytes)?;
    /// assert_eq!(map.get_strict(11)?, b"eleven");
    /// # Ok(())
    /// # }
    /// ```
    pub fn build<I, V>(&self, entries: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (u64, V)>,
        V: AsRef<[u8]>,
    {
        self.build_with(entries, |value| Ok(value.as_ref().to_vec()))
    }

    /// Serializes `entries`, applying `encode` to each value before
    /// compression.
    ///
    /// `encode` maps the caller's value domain to bytes; pair it with a
    /// decode function on the reader side
    /// ([`MapBuffer::with_decode_fn`](crate::MapBuffer::with_decode_fn)) to
    /// round-trip values that are not already byte strings.
    pub fn build_with<I, V, F>(&self, entries: I, mut encode: F) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (u64, V)>,
        F: FnMut(&V) -> Result<Vec<u8>>,
    {
        if !FORMAT_VERSIONS.contains(&self.format_version) {
            return Err(MapBufferError::UnsupportedVersion(self.format_version));
        }

        let mut entries: Vec<(u64, V)> = entries.into_iter().collect();
        entries.sort_by_key(|(key, _)| *key);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(MapBufferError::DuplicateKey(pair[0].0));
        }
        if entries.len() > u32::MAX as usize {
            return Err(MapBufferError::TooManyEntries(entries.len() as u64));
        }
        let n = entries.len();

        // Encode and compress in sorted order; the data region and the
        // offsets both follow this order, while the index pairs themselves
        // are emitted in Eytzinger order below.
        let mut payloads = Vec::with_capacity(n);
        let mut data_length = 0u64;
        for (_, value) in &entries {
            let encoded = encode(value)?;
            let payload = match self.compression {
                Compression::None => encoded,
                scheme => scheme.compress(&encoded)?,
            };
            data_length += payload.len() as u64;
            payloads.push(payload);
        }

        let header = MapBufferHeader {
            format_version: self.format_version,
            compression: self.compression,
            entry_count: n as u32,
        };
        let data_start = header.data_start() as u64;
        let mut offsets = Vec::with_capacity(n);
        let mut offset = data_start;
        for payload in &payloads {
            offsets.push(offset);
            offset += payload.len() as u64;
        }

        let layout = eytzinger_layout(n);
        let total_length =
            HEADER_LENGTH + n * INDEX_PAIR_LENGTH + data_length as usize + header.checksum_length();

        let mut buffer = Vec::with_capacity(total_length);
        buffer.extend_from_slice(&header.encode());
        for &rank in &layout {
            buffer.write_u64::<LittleEndian>(entries[rank].0).unwrap();
            buffer.write_u64::<LittleEndian>(offsets[rank]).unwrap();
        }
        for payload in &payloads {
            buffer.extend_from_slice(payload);
        }
        if header.checksum_length() > 0 {
            let checksum = crc32c::crc32c(&buffer);
            buffer.write_u32::<LittleEndian>(checksum).unwrap();
        }

        debug!(
            entries = n,
            bytes = buffer.len(),
            compression = self.compression.name(),
            version = self.format_version,
            "serialized map buffer"
        );
        Ok(buffer)
    }
}
