// src/packages/rpm.rs

//! RPM container decoding
//!
//! An RPM file is a 96-byte lead, a signature header, the main header and a
//! compressed CPIO payload. Only the structure needed to find the payload is
//! parsed: each header section starts with a 16-byte descriptor
//! (magic, reserved, index entry count, data size) and is followed by
//! `16 * entries + size` bytes. The signature header is padded with NUL bytes
//! to an 8-byte boundary.

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::packages::cpio::CpioReader;
use crate::packages::unpack::ExtractSummary;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use tracing::{debug, info};

/// Size of the fixed lead
pub const LEAD_SIZE: usize = 96;
/// Magic number at the start of the lead
pub const LEAD_MAGIC: u32 = 0xedab_eedb;
/// Magic number, reserved byte and version of a header section descriptor
pub const HEADER_MAGIC: u32 = 0x8ead_e801;
/// Size of a header section descriptor and of one index entry
const DESCRIPTOR_SIZE: usize = 16;

/// A decoded RPM payload
///
/// Exists only while a package is being extracted.
#[derive(Debug)]
pub struct RpmPackage {
    pub format_version_major: u8,
    pub payload_compression: CompressionFormat,
    pub raw_cpio_stream: Vec<u8>,
}

/// Walks an RPM container up to its payload
pub struct RpmDecoder<R: Read> {
    reader: R,
}

impl RpmDecoder<BufReader<File>> {
    /// Decode the RPM at `path` into its raw CPIO stream
    pub fn open(path: impl AsRef<Path>) -> Result<RpmPackage> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::extract(path, e))?;
        RpmDecoder::new(BufReader::new(file)).decode()
    }
}

impl<R: Read> RpmDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the lead and return the major format version
    fn read_lead(&mut self) -> Result<u8> {
        let mut lead = [0u8; LEAD_SIZE];
        self.reader
            .read_exact(&mut lead)
            .map_err(|_| Error::InvalidRpm("file too short for an RPM lead".to_string()))?;

        let magic = u32::from_be_bytes([lead[0], lead[1], lead[2], lead[3]]);
        if magic != LEAD_MAGIC {
            return Err(Error::InvalidRpm(format!("bad lead magic 0x{:08x}", magic)));
        }

        let major = lead[4];
        if major != 3 && major != 4 {
            return Err(Error::InvalidRpm(format!(
                "unsupported format version {}.{}",
                major, lead[5]
            )));
        }
        Ok(major)
    }

    /// Skip header sections and sniff the payload compression
    ///
    /// Returns the compression and the first 16 payload bytes, which have
    /// already been consumed from the reader.
    fn locate_payload(&mut self) -> Result<(CompressionFormat, [u8; DESCRIPTOR_SIZE])> {
        let mut block = [0u8; DESCRIPTOR_SIZE];
        self.read_block(&mut block)?;

        loop {
            let magic = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
            let smagic = u16::from_be_bytes([block[0], block[1]]);
            let smagic2 = u32::from_be_bytes([block[2], block[3], block[4], block[5]]);

            if smagic == 0x1f8b {
                return Ok((CompressionFormat::Gzip, block));
            }
            if smagic == 0x425a && smagic2 & 0xff00_0000 == 0x6800_0000 {
                return Ok((CompressionFormat::Bzip2, block));
            }
            if smagic == 0xfd37 && smagic2 == 0x7a58_5a00 {
                return Ok((CompressionFormat::Xz, block));
            }
            if magic != HEADER_MAGIC {
                // Old packages ship bare lzma streams, which have no magic
                return Ok((CompressionFormat::Lzma, block));
            }

            let entries = u32::from_be_bytes([block[8], block[9], block[10], block[11]]);
            let data_size = u32::from_be_bytes([block[12], block[13], block[14], block[15]]);
            let section_size = DESCRIPTOR_SIZE as u64 * u64::from(entries) + u64::from(data_size);
            debug!(
                "Skipping RPM header section: {} entries, {} data bytes",
                entries, data_size
            );

            let skipped = io::copy(&mut (&mut self.reader).take(section_size), &mut io::sink())
                .map_err(|e| Error::InvalidRpm(format!("failed to read header section: {}", e)))?;
            if skipped != section_size {
                return Err(Error::InvalidRpm(format!(
                    "truncated header section: expected {} bytes, got {}",
                    section_size, skipped
                )));
            }

            block[0] = self.skip_padding()?;
            self.read_block(&mut block[1..])?;
        }
    }

    /// Skip NUL alignment bytes and return the first non-NUL byte
    fn skip_padding(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            self.read_block(&mut byte)?;
            if byte[0] != 0 {
                return Ok(byte[0]);
            }
        }
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader
            .read_exact(buf)
            .map_err(|_| Error::InvalidRpm("unexpected end of file in header".to_string()))
    }

    /// Check the container structure without touching the payload
    pub fn probe(mut self) -> Result<CompressionFormat> {
        self.read_lead()?;
        let (format, _) = self.locate_payload()?;
        Ok(format)
    }

    /// Decompress the payload into memory
    pub fn decode(mut self) -> Result<RpmPackage> {
        let format_version_major = self.read_lead()?;
        let (payload_compression, head) = self.locate_payload()?;
        debug!(
            "RPM v{} payload compressed with {}",
            format_version_major, payload_compression
        );

        let payload = Cursor::new(head).chain(self.reader);
        let decoder = match payload_compression {
            CompressionFormat::Xz | CompressionFormat::Lzma => {
                compression::create_lzma_family_decoder(payload)?
            }
            format => compression::create_decoder(payload, format)?,
        };
        let raw_cpio_stream = compression::read_all(decoder, payload_compression.name())?;

        Ok(RpmPackage {
            format_version_major,
            payload_compression,
            raw_cpio_stream,
        })
    }
}

/// True if `path` has a valid lead, readable headers and a payload
pub fn is_rpm(path: impl AsRef<Path>) -> bool {
    File::open(path.as_ref())
        .map(|file| RpmDecoder::new(BufReader::new(file)).probe().is_ok())
        .unwrap_or(false)
}

/// Extract the files of an RPM package into `target`
///
/// Every failure is reported as an extraction error for `path`.
pub fn extract_rpm(path: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<ExtractSummary> {
    let path = path.as_ref();
    let target = target.as_ref();

    let extract = || -> Result<ExtractSummary> {
        let package = RpmDecoder::open(path)?;
        let mut reader = CpioReader::new(Cursor::new(package.raw_cpio_stream))?;
        reader.extract_all(target)
    };

    let summary = extract().map_err(|e| match e {
        Error::Extract { .. } => e,
        other => Error::extract(path, other),
    })?;

    info!(
        "Extracted {} ({} files, {} directories, {} links)",
        path.display(),
        summary.files,
        summary.directories,
        summary.symlinks + summary.hard_links
    );
    Ok(summary)
}
