// src/filesystem/path.rs

//! Path handling for archive members
//!
//! Entry names inside archives are untrusted. Before anything is written they
//! are reduced to a relative path without `.` or `..` components, and the
//! destination is checked so that no already-extracted symlink redirects the
//! write outside the extraction root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Reduce an archive member name to a safe relative path
///
/// Leading slashes and `.` components are dropped; `..` anywhere is rejected
/// with [`Error::PathTraversal`]; a name with nothing left is
/// [`Error::InvalidPath`].
///
/// # Examples
///
/// ```
/// use crypto_detector::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("./usr/src/aes.c").unwrap(), PathBuf::from("usr/src/aes.c"));
/// assert_eq!(sanitize_path("/etc/ssl/openssl.cnf").unwrap(), PathBuf::from("etc/ssl/openssl.cnf"));
/// assert!(sanitize_path("usr/../../etc/shadow").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                return Err(Error::PathTraversal(path.display().to_string()));
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}' is empty after sanitization",
            path.display()
        )));
    }

    Ok(normalized)
}

/// True if any existing ancestor of `relative` below `root` is a symlink
///
/// The final component itself is not checked; replacing a symlink entry with
/// a new one is fine, following it is not.
pub fn crosses_symlink(root: &Path, relative: &Path) -> bool {
    let mut current = root.to_path_buf();
    let Some(parent) = relative.parent() else {
        return false;
    };

    for component in parent.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

/// Join an archive member name onto the extraction root
///
/// Fails if the name is unsafe or the destination would be reached through
/// a symlink.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = sanitize_path(name)?;
    if crosses_symlink(root, &relative) {
        return Err(Error::PathTraversal(format!(
            "{} would be written through a symbolic link",
            name
        )));
    }
    Ok(root.join(relative))
}

/// File name for the decompressed content of a single-stream archive
///
/// `notes.txt.gz` becomes `notes.txt`; a name without an extension gets
/// `.out` appended so it cannot collide with the archive itself.
pub fn strip_compression_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => format!("{}.out", file_name),
    }
}

/// Path shown to the user for a file inside an extracted archive
///
/// `/pkg/src.tar.gz` and `lib/aes.c` give `/pkg/src.tar.gz/lib/aes.c`.
pub fn display_join(archive_display: &str, relative: &Path) -> String {
    let relative = relative.to_string_lossy();
    format!(
        "{}/{}",
        archive_display.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}
