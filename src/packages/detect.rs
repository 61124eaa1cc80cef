// src/packages/detect.rs

//! Archive format detection
//!
//! Formats are probed in a fixed order (zip, tar, rpm, gzip, bzip2, lzma)
//! and the first probe that succeeds wins. Probes look at structure, not at
//! file names: a `.tar.gz` that is really a zip is treated as a zip, and a
//! gzip file that does not contain a tar stream is a plain gzip file.

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::packages::rpm::RpmDecoder;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;

/// Archive kinds the scanner can unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    /// Tar stream, possibly wrapped in a compression layer
    Tar(CompressionFormat),
    Rpm,
    Gzip,
    Bzip2,
    /// Xz container or legacy lzma stream
    Lzma,
    /// Not an archive
    None,
}

impl ArchiveFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar(_) => "tar",
            Self::Rpm => "rpm",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bz2",
            Self::Lzma => "lzma",
            Self::None => "none",
        }
    }

    pub fn is_archive(&self) -> bool {
        *self != Self::None
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tar(CompressionFormat::None) | Self::Tar(CompressionFormat::Lzma) => {
                write!(f, "tar")
            }
            Self::Tar(compression) => write!(f, "tar+{}", compression),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Compression layers tried when looking for a tar stream
const TAR_LAYERS: [CompressionFormat; 4] = [
    CompressionFormat::None,
    CompressionFormat::Gzip,
    CompressionFormat::Bzip2,
    CompressionFormat::Xz,
];

/// Classify the file at `path`
///
/// Fails with [`Error::Extract`] only if the file cannot be opened or
/// repositioned; a file no probe accepts is `ArchiveFormat::None`.
pub fn classify(path: &Path) -> Result<ArchiveFormat> {
    let mut file = File::open(path).map_err(|e| Error::extract(path, e))?;

    let rewind = |file: &mut File| file.rewind().map_err(|e| Error::extract(path, e));

    match zip::ZipArchive::new(&mut file) {
        Ok(_) => return Ok(ArchiveFormat::Zip),
        Err(e) => debug!("{} is not a zip archive: {}", path.display(), e),
    }

    for layer in TAR_LAYERS {
        rewind(&mut file)?;
        if is_tar(&mut file, layer) {
            return Ok(ArchiveFormat::Tar(layer));
        }
    }

    rewind(&mut file)?;
    if RpmDecoder::new(BufReader::new(&mut file)).probe().is_ok() {
        return Ok(ArchiveFormat::Rpm);
    }

    rewind(&mut file)?;
    if compression::probe(&mut file, CompressionFormat::Gzip) {
        return Ok(ArchiveFormat::Gzip);
    }

    rewind(&mut file)?;
    if compression::probe(&mut file, CompressionFormat::Bzip2) {
        return Ok(ArchiveFormat::Bzip2);
    }

    rewind(&mut file)?;
    let mut magic = [0u8; 6];
    let n = read_prefix(&mut file, &mut magic).map_err(|e| Error::extract(path, e))?;
    let sniffed = CompressionFormat::from_magic_bytes(&magic[..n]);
    if matches!(sniffed, CompressionFormat::Xz | CompressionFormat::Lzma) {
        rewind(&mut file)?;
        if compression::probe(&mut file, sniffed) {
            return Ok(ArchiveFormat::Lzma);
        }
    }

    debug!("{} is not an archive", path.display());
    Ok(ArchiveFormat::None)
}

/// True if the first tar header decodes through `layer`
fn is_tar<R: Read>(reader: R, layer: CompressionFormat) -> bool {
    let Ok(decoder) = tar_decoder(reader, layer) else {
        return false;
    };
    let mut archive = tar::Archive::new(decoder);
    let Ok(mut entries) = archive.entries() else {
        return false;
    };
    matches!(entries.next(), Some(Ok(_)))
}

/// Decoder for the compression layer around a tar stream
///
/// The xz layer also accepts legacy lzma streams (`.tar.lzma`).
pub(crate) fn tar_decoder<'a, R: Read + 'a>(
    reader: R,
    layer: CompressionFormat,
) -> Result<Box<dyn Read + 'a>> {
    let decoder = match layer {
        CompressionFormat::Xz | CompressionFormat::Lzma => {
            compression::create_lzma_family_decoder(reader)?
        }
        other => compression::create_decoder(reader, other)?,
    };
    Ok(decoder)
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
