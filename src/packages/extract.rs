// src/packages/extract.rs

//! Unpacking a classified archive into a scratch directory

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::filesystem::path::{safe_join, strip_compression_extension};
use crate::packages::detect::{ArchiveFormat, tar_decoder};
use crate::packages::rpm::extract_rpm;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Extract `path` (already classified as `format`) into `target`
///
/// `display_path` is what errors and logs refer to, so a nested archive is
/// reported by its position in the package rather than its scratch location.
/// Every failure is an [`Error::Extract`].
pub fn extract_archive(
    format: ArchiveFormat,
    path: &Path,
    display_path: &str,
    target: &Path,
) -> Result<()> {
    debug!("Extracting {} archive {}", format, display_path);

    let result = match format {
        ArchiveFormat::Zip => extract_zip(path, target),
        ArchiveFormat::Tar(layer) => extract_tar(path, layer, target),
        ArchiveFormat::Rpm => extract_rpm(path, target).map(|_| ()),
        ArchiveFormat::Gzip => extract_single(path, CompressionFormat::Gzip, target),
        ArchiveFormat::Bzip2 => extract_single(path, CompressionFormat::Bzip2, target),
        ArchiveFormat::Lzma => extract_single(path, CompressionFormat::Lzma, target),
        ArchiveFormat::None => Err(Error::extract(display_path, "not an archive")),
    };

    result.map_err(|e| match e {
        Error::Extract { reason, .. } => Error::extract(display_path, reason),
        other => Error::extract(display_path, other),
    })
}

fn extract_zip(path: &Path, target: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| Error::extract(path, e))?;
    // Entry names are checked by the zip crate; unsafe ones are rejected
    archive.extract(target).map_err(|e| Error::extract(path, e))?;
    Ok(())
}

fn extract_tar(path: &Path, layer: CompressionFormat, target: &Path) -> Result<()> {
    let file = File::open(path)?;
    let decoder = tar_decoder(BufReader::new(file), layer)?;
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);
    archive.unpack(target).map_err(|e| Error::extract(path, e))?;
    Ok(())
}

/// Decompress a single-stream file next to where its archive name points
fn extract_single(path: &Path, format: CompressionFormat, target: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::extract(path, "path has no file name"))?;
    let output = safe_join(target, &strip_compression_extension(&file_name))?;

    let reader = BufReader::new(File::open(path)?);
    let mut decoder = match format {
        CompressionFormat::Lzma | CompressionFormat::Xz => {
            compression::create_lzma_family_decoder(reader)?
        }
        other => compression::create_decoder(reader, other)?,
    };

    let mut writer = BufWriter::new(File::create(&output)?);
    io::copy(&mut decoder, &mut writer).map_err(|e| compression::CompressionError::Decompression {
        format: format.name(),
        source: e,
    })?;
    writer.flush()?;
    Ok(())
}
