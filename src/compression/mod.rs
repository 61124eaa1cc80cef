// src/compression/mod.rs
//! Unified decompression utilities
//!
//! Provides a consistent interface for the single-stream compression formats
//! found in source packages and RPM payloads (gzip, bzip2, xz, legacy lzma).

use std::io::{self, Read};
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// XZ container (.xz)
    Xz,
    /// Legacy LZMA-alone stream (.lzma)
    Lzma,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - Bzip2: `42 5a 68` ("BZh")
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - LZMA-alone: properties byte `5d` followed by a little-endian
    ///   dictionary size; recognised only with the common `5d 00 00` prefix
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x5d, 0x00, 0x00]) {
            Self::Lzma
        } else {
            Self::None
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Lzma => "lzma",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// Returns a boxed `Read` implementation that decompresses data on the fly.
/// For `CompressionFormat::None`, returns the reader unchanged.
///
/// # Example
/// ```no_run
/// use crypto_detector::compression::{CompressionFormat, create_decoder};
/// use std::io::Read;
///
/// let compressed_data: &[u8] = &[/* gzip data */];
/// let mut decoder = create_decoder(compressed_data, CompressionFormat::Gzip)?;
/// let mut output = Vec::new();
/// decoder.read_to_end(&mut output)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(|e| {
                CompressionError::DecoderCreation {
                    format: "lzma",
                    source: io::Error::other(e),
                }
            })?;
            Ok(Box::new(xz2::read::XzDecoder::new_stream(reader, stream)))
        }
    }
}

/// Create a reader that accepts either an xz container or a legacy lzma stream
///
/// The LZMA family decoder sniffs the container itself, which is what RPM
/// payloads need: old packages ship bare lzma streams without a magic number.
pub fn create_lzma_family_decoder<'a, R: Read + 'a>(
    reader: R,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    let stream = xz2::stream::Stream::new_auto_decoder(u64::MAX, 0).map_err(|e| {
        CompressionError::DecoderCreation {
            format: "xz",
            source: io::Error::other(e),
        }
    })?;
    Ok(Box::new(xz2::read::XzDecoder::new_stream(reader, stream)))
}

/// Drain a decoder, tagging failures with the format name
pub fn read_all<R: Read>(mut decoder: R, format: &'static str) -> Result<Vec<u8>, CompressionError> {
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::Decompression { format, source: e })?;
    Ok(output)
}

/// True if `reader` decodes as `format` and yields more than five bytes
///
/// Used to tell a real compressed stream from a file that merely shares a
/// magic prefix.
pub fn probe<R: Read>(reader: R, format: CompressionFormat) -> bool {
    let Ok(decoder) = create_decoder(reader, format) else {
        return false;
    };
    let mut head = Vec::with_capacity(6);
    match decoder.take(6).read_to_end(&mut head) {
        Ok(n) => n > 5,
        Err(_) => false,
    }
}
