use std::fmt;

use crate::{MapBufferError, Result};

/// Per-value compression scheme stored in the frame header.
///
/// Each scheme is identified by a 4-byte ASCII tag. Values are compressed
/// individually, never across entries, so a point read only ever decompresses
/// the payload it returns. Codecs are compiled in through cargo features
/// (all on by default); a tag that is recognized but not compiled in fails
/// with [`MapBufferError::UnsupportedCompression`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Identity, tag `none`.
    #[default]
    None,
    /// RFC 1952 gzip frames, tag `gzip`.
    Gzip,
    /// Brotli, tag `00br`.
    Brotli,
    /// Zstandard, tag `zstd`.
    Zstd,
    /// LZMA, tag `lzma`.
    Lzma,
}

impl Compression {
    /// The 4-byte ASCII tag written into the header.
    ///
    /// Brotli's short name `br` is left-padded with ASCII zeros.
    pub const fn tag(&self) -> [u8; 4] {
        match self {
            Compression::None => *b"none",
            Compression::Gzip => *b"gzip",
            Compression::Brotli => *b"00br",
            Compression::Zstd => *b"zstd",
            Compression::Lzma => *b"lzma",
        }
    }

    /// Parses a header tag.
    ///
    /// A tag whose scheme was not compiled in is rejected here, so readers
    /// and the validator fail on open rather than on the first value read.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::UnsupportedCompression`] for unrecognized
    /// tags and for schemes behind a disabled cargo feature.
    pub fn from_tag(tag: [u8; 4]) -> Result<Self> {
        match &tag {
            b"none" => Ok(Compression::None),
            #[cfg(feature = "gzip")]
            b"gzip" => Ok(Compression::Gzip),
            #[cfg(feature = "br")]
            b"00br" => Ok(Compression::Brotli),
            #[cfg(feature = "zstd")]
            b"zstd" => Ok(Compression::Zstd),
            #[cfg(feature = "lzma")]
            b"lzma" => Ok(Compression::Lzma),
            _ => Err(MapBufferError::UnsupportedCompression(
                String::from_utf8_lossy(&tag).into_owned(),
            )),
        }
    }

    /// Parses a human-readable scheme name, e.g. from a command line.
    ///
    /// Schemes behind a disabled cargo feature are rejected, like
    /// [`from_tag`](Self::from_tag).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "none" | "" => Ok(Compression::None),
            #[cfg(feature = "gzip")]
            "gzip" => Ok(Compression::Gzip),
            #[cfg(feature = "br")]
            "br" | "brotli" => Ok(Compression::Brotli),
            #[cfg(feature = "zstd")]
            "zstd" => Ok(Compression::Zstd),
            #[cfg(feature = "lzma")]
            "lzma" => Ok(Compression::Lzma),
            other => Err(MapBufferError::UnsupportedCompression(other.to_string())),
        }
    }

    /// Canonical scheme name.
    pub const fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Brotli => "br",
            Compression::Zstd => "zstd",
            Compression::Lzma => "lzma",
        }
    }

    /// Compresses a single value payload.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::Compression`] when the codec rejects its
    /// input and [`MapBufferError::UnsupportedCompression`] when the scheme
    /// was not compiled in.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),

            #[cfg(feature = "gzip")]
            Compression::Gzip => {
                use std::io::Write;
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(data)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| MapBufferError::Compression(format!("gzip: {e}")))
            }

            #[cfg(feature = "br")]
            Compression::Brotli => {
                let params = brotli::enc::BrotliEncoderParams::default();
                let mut output = Vec::new();
                brotli::BrotliCompress(&mut &data[..], &mut output, &params)
                    .map_err(|e| MapBufferError::Compression(format!("brotli: {e}")))?;
                Ok(output)
            }

            #[cfg(feature = "zstd")]
            Compression::Zstd => zstd::encode_all(data, zstd::DEFAULT_COMPRESSION_LEVEL)
                .map_err(|e| MapBufferError::Compression(format!("zstd: {e}"))),

            #[cfg(feature = "lzma")]
            Compression::Lzma => {
                let mut output = Vec::new();
                lzma_rs::lzma_compress(&mut &data[..], &mut output)
                    .map_err(|e| MapBufferError::Compression(format!("lzma: {e}")))?;
                Ok(output)
            }

            #[allow(unreachable_patterns)]
            _ => Err(self.unsupported()),
        }
    }

    /// Decompresses a single value payload.
    ///
    /// # Errors
    ///
    /// Returns [`MapBufferError::Decompression`] when the payload is not a
    /// valid frame for this scheme and [`MapBufferError::UnsupportedCompression`]
    /// when the scheme was not compiled in.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),

            #[cfg(feature = "gzip")]
            Compression::Gzip => {
                use std::io::Read;
                let mut output = Vec::new();
                flate2::read::GzDecoder::new(data)
                    .read_to_end(&mut output)
                    .map_err(|e| MapBufferError::Decompression(format!("gzip: {e}")))?;
                Ok(output)
            }

            #[cfg(feature = "br")]
            Compression::Brotli => {
                let mut output = Vec::new();
                brotli::BrotliDecompress(&mut &data[..], &mut output)
                    .map_err(|e| MapBufferError::Decompression(format!("brotli: {e}")))?;
                Ok(output)
            }

            #[cfg(feature = "zstd")]
            Compression::Zstd => zstd::decode_all(data)
                .map_err(|e| MapBufferError::Decompression(format!("zstd: {e}"))),

            #[cfg(feature = "lzma")]
            Compression::Lzma => {
                let mut output = Vec::new();
                lzma_rs::lzma_decompress(&mut &data[..], &mut output)
                    .map_err(|e| MapBufferError::Decompression(format!("lzma: {e}")))?;
                Ok(output)
            }

            #[allow(unreachable_patterns)]
            _ => Err(self.unsupported()),
        }
    }

    fn unsupported(&self) -> MapBufferError {
        MapBufferError::UnsupportedCompression(format!("{} (not compiled in)", self.name()))
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: [Compression; 5] = [
        Compression::None,
        Compression::Gzip,
        Compression::Brotli,
        Compression::Zstd,
        Compression::Lzma,
    ];

    #[test]
    fn test_tag_roundtrip() {
        for scheme in SCHEMES {
            assert_eq!(Compression::from_tag(scheme.tag()).unwrap(), scheme);
            assert_eq!(Compression::from_name(scheme.name()).unwrap(), scheme);
        }
        Compression::from_tag(*b"lz4\0").unwrap_err();
        Compression::from_name("snappy").unwrap_err();
    }

    #[test]
    fn test_compress_roundtrip() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        for scheme in SCHEMES {
            let compressed = scheme.compress(&payload).unwrap();
            if scheme != Compression::None {
                assert!(compressed.len() < payload.len(), "{scheme} did not shrink");
            }
            assert_eq!(scheme.decompress(&compressed).unwrap(), payload);
        }
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        for scheme in SCHEMES {
            let compressed = scheme.compress(&[]).unwrap();
            assert_eq!(scheme.decompress(&compressed).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn test_decompress_garbage() {
        let garbage = b"\xde\xad\xbe\xef this is not a compressed frame";
        for scheme in [Compression::Gzip, Compression::Zstd] {
            scheme.decompress(garbage).unwrap_err();
        }
    }
}
