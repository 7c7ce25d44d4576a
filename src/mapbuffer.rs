use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian};

use crate::eytzinger::{eytzinger_search, first_in_order, label_at, next_in_order, offset_at};
use crate::{
    CHECKSUM_LENGTH, Compression, MapBufferError, MapBufferHeader, MapBufferInfo, Result, validate,
};

/// Type-erased decode function applied to every value a reader returns.
pub type ValueDecoder = Box<dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync>;

/// Immutable reader over a serialized map buffer.
///
/// A `MapBuffer` is a cheap, non-owning view: it borrows (or owns, for
/// `Vec<u8>` and memory maps) the serialized bytes and answers point lookups
/// by binary-searching the index region in place. Nothing is deserialized up
/// front beyond the 16-byte header, which is parsed and cached on open; that
/// caching matters when the backing bytes are expensive to touch, such as a
/// range-fetched object from remote storage.
///
/// Multiple readers may view the same underlying bytes concurrently without
/// coordination; no operation mutates the buffer.
///
/// # Type Parameters
/// - `B`: any byte container, e.g. `Vec<u8>`, `&[u8]`, or `memmap2::Mmap`.
pub struct MapBuffer<B: AsRef<[u8]>> {
    buffer: B,
    header: MapBufferHeader,
    decoder: Option<ValueDecoder>,
    // None = trailer verified, Some((stored, computed)) = mismatch.
    checksum_state: OnceLock<Option<(u32, u32)>>,
}

impl<B: AsRef<[u8]>> MapBuffer<B> {
    /// Attaches a reader to serialized bytes.
    ///
    /// Parses and caches the header and checks that the declared index fits
    /// the buffer. The data region and checksum are not inspected; use
    /// [`from_bytes_strict`](Self::from_bytes_strict) or
    /// [`validate`](Self::validate) for full verification.
    ///
    /// # Errors
    ///
    /// Returns an error when the magic prefix, format version, or
    /// compression tag is not recognized, or when the buffer is shorter than
    /// its declared regions.
    pub fn from_bytes(buffer: B) -> Result<Self> {
        let bytes = buffer.as_ref();
        let header = MapBufferHeader::decode(bytes)?;
        if bytes.len() < header.minimum_buffer_length() {
            return Err(MapBufferError::Truncated {
                expected: header.minimum_buffer_length(),
                actual: bytes.len(),
            });
        }
        Ok(MapBuffer {
            buffer,
            header,
            decoder: None,
            checksum_state: OnceLock::new(),
        })
    }

    /// Attaches a reader and runs the full validator first, including the
    /// CRC32C trailer for version 1 buffers.
    pub fn from_bytes_strict(buffer: B) -> Result<Self> {
        let map = Self::from_bytes(buffer)?;
        map.validate()?;
        Ok(map)
    }

    /// Installs a decode function applied to every returned value after
    /// decompression, converting serialized bytes back into the caller's
    /// representation. The default is identity.
    pub fn with_decode_fn<F>(mut self, decode: F) -> Self
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.decoder = Some(Box::new(decode));
        self
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.header.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// Format version byte of the underlying buffer.
    pub fn format_version(&self) -> u8 {
        self.header.format_version
    }

    /// Per-value compression scheme of the underlying buffer.
    pub fn compression(&self) -> Compression {
        self.header.compression
    }

    /// Size of the data region in bytes.
    pub fn data_size(&self) -> usize {
        self.data_end() - self.header.data_start()
    }

    /// Tests whether `key` is present. Runs in O(log N) without touching the
    /// data region.
    pub fn contains(&self, key: u64) -> bool {
        self.index_lookup(key).is_some()
    }

    /// Returns the position of `key` within the Eytzinger-ordered index, or
    /// `None` when absent.
    pub fn index_lookup(&self, key: u64) -> Option<usize> {
        eytzinger_search(self.index(), self.len(), key)
    }

    /// Looks up `key` and returns its decompressed, decoded value.
    ///
    /// Absence is a value, not an error: `Ok(None)` is returned and callers
    /// supply their own default via `unwrap_or`. Structural errors in the
    /// buffer and codec failures are reported as errors.
    pub fn get(&self, key: u64) -> Result<Option<Vec<u8>>> {
        match self.index_lookup(key) {
            Some(slot) => self.read_entry(slot).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up `key`, treating absence as an error.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::EmptyBuffer`] when the buffer holds no
    /// entries at all and [`MapBufferError::KeyNotFound`] when the key is
    /// missing.
    pub fn get_strict(&self, key: u64) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Err(MapBufferError::EmptyBuffer);
        }
        match self.index_lookup(key) {
            Some(slot) => self.read_entry(slot),
            None => Err(MapBufferError::KeyNotFound(key)),
        }
    }

    /// Iterates over keys in ascending order.
    pub fn keys(&self) -> MapBufferKeys<'_> {
        MapBufferKeys {
            index: self.index(),
            n: self.len(),
            cursor: first_in_order(self.len()),
        }
    }

    /// Iterates over values in ascending key order.
    ///
    /// Values are decompressed and decoded lazily, one step at a time.
    pub fn values(&self) -> MapBufferValues<'_, B> {
        MapBufferValues { items: self.items() }
    }

    /// Iterates over `(key, value)` pairs in ascending key order.
    pub fn items(&self) -> MapBufferItems<'_, B> {
        MapBufferItems {
            map: self,
            cursor: first_in_order(self.len()),
        }
    }

    /// Materializes the whole mapping by draining [`items`](Self::items).
    ///
    /// This defeats the point of the format on the hot path; it exists as an
    /// escape hatch for interop and debugging.
    pub fn to_map(&self) -> Result<BTreeMap<u64, Vec<u8>>> {
        self.items().collect()
    }

    /// Runs the full validator over the underlying bytes.
    ///
    /// The CRC32C verdict for version 1 buffers is computed once per reader
    /// and cached; repeated calls do not rescan the buffer.
    pub fn validate(&self) -> Result<()> {
        validate::validate_structure(self.as_bytes())?;
        self.verify_checksum()
    }

    /// Summarizes the buffer for display or serialization.
    pub fn info(&self) -> MapBufferInfo {
        MapBufferInfo {
            entry_count: self.len(),
            format_version: self.header.format_version,
            compression: self.header.compression.name(),
            buffer_length: self.as_bytes().len(),
            index_length: self.header.index_length(),
            data_length: self.data_size(),
        }
    }

    /// The raw serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    /// Releases the underlying byte container.
    pub fn into_inner(self) -> B {
        self.buffer
    }

    fn index(&self) -> &[u8] {
        &self.as_bytes()[self.header.index_range()]
    }

    fn data_end(&self) -> usize {
        self.as_bytes().len() - self.header.checksum_length()
    }

    /// Byte range of the entry at `slot`. The end is the offset of the
    /// in-order successor; the last entry in sorted order runs to the end of
    /// the data region.
    fn entry_bounds(&self, slot: usize) -> Result<(usize, usize)> {
        let index = self.index();
        let start = offset_at(index, slot) as usize;
        let end = match next_in_order(slot, self.len()) {
            Some(next) => offset_at(index, next) as usize,
            None => self.data_end(),
        };
        if start < self.header.data_start() || end < start || end > self.data_end() {
            return Err(MapBufferError::CorruptIndex(format!(
                "value range {start}..{end} escapes the data region"
            )));
        }
        Ok((start, end))
    }

    fn read_entry(&self, slot: usize) -> Result<Vec<u8>> {
        let (start, end) = self.entry_bounds(slot)?;
        let value = self
            .header
            .compression
            .decompress(&self.as_bytes()[start..end])?;
        match &self.decoder {
            Some(decode) => decode(value),
            None => Ok(value),
        }
    }

    fn verify_checksum(&self) -> Result<()> {
        if self.header.checksum_length() == 0 {
            return Ok(());
        }
        let state = self.checksum_state.get_or_init(|| {
            let bytes = self.as_bytes();
            let split = bytes.len() - CHECKSUM_LENGTH;
            let stored = LittleEndian::read_u32(&bytes[split..]);
            let computed = crc32c::crc32c(&bytes[..split]);
            if stored == computed {
                None
            } else {
                Some((stored, computed))
            }
        });
        match *state {
            None => Ok(()),
            Some((stored, computed)) => Err(MapBufferError::ChecksumMismatch { stored, computed }),
        }
    }
}

impl MapBuffer<memmap2::Mmap> {
    /// Opens a map buffer file through a read-only memory mapping.
    ///
    /// Several processes may map the same file simultaneously; nothing is
    /// locked or written back.
    ///
    /// # Errors
    ///
    /// Forwards IO errors from opening or mapping the file plus the header
    /// checks of [`from_bytes`](Self::from_bytes).
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and the format is defined over
        // plain bytes; callers must not truncate the file while mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_bytes(mmap)
    }
}

impl<B: AsRef<[u8]>> fmt::Debug for MapBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBuffer")
            .field("entry_count", &self.header.entry_count)
            .field("format_version", &self.header.format_version)
            .field("compression", &self.header.compression)
            .field("buffer_length", &self.as_bytes().len())
            .finish()
    }
}

/// Iterator over keys in ascending order. Walks the implicit search tree
/// in-order, so each step costs O(log N) and no allocation.
pub struct MapBufferKeys<'a> {
    index: &'a [u8],
    n: usize,
    cursor: Option<usize>,
}

impl Iterator for MapBufferKeys<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        self.cursor = next_in_order(slot, self.n);
        Some(label_at(self.index, slot))
    }
}

/// Iterator over `(key, value)` pairs in ascending key order.
pub struct MapBufferItems<'a, B: AsRef<[u8]>> {
    map: &'a MapBuffer<B>,
    cursor: Option<usize>,
}

impl<B: AsRef<[u8]>> Iterator for MapBufferItems<'_, B> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        self.cursor = next_in_order(slot, self.map.len());
        let label = label_at(self.map.index(), slot);
        Some(self.map.read_entry(slot).map(|value| (label, value)))
    }
}

/// Iterator over values in ascending key order.
pub struct MapBufferValues<'a, B: AsRef<[u8]>> {
    items: MapBufferItems<'a, B>,
}

impl<B: AsRef<[u8]>> Iterator for MapBufferValues<'_, B> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.items.next()?.map(|(_, value)| value))
    }
}
