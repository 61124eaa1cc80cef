// src/packages/unpack.rs

//! Writing a CPIO archive to disk
//!
//! Extraction runs in two passes. The first creates regular files, hard
//! links, symlinks and special files; directories are only created as
//! parents. The second walks the directory entries in reverse name order so
//! children get their metadata before their parents, which keeps read-only
//! directories from blocking writes below them.

use crate::error::Result;
use crate::filesystem::path::{crosses_symlink, sanitize_path};
use crate::packages::cpio::{CpioEntry, CpioReader, EntryKind};
use filetime::FileTime;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Counts of what an extraction produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub hard_links: usize,
    /// Device nodes and fifos
    pub special: usize,
    /// Entries refused or failed without aborting the extraction
    pub skipped: usize,
}

type InodeKey = (u32, u32, u32);

struct Unpacker<'a, R: Read + Seek> {
    reader: &'a mut CpioReader<R>,
    target: PathBuf,
    restore_owner: bool,
    /// Index of the entry holding the data of each multiply linked inode
    data_entries: HashMap<InodeKey, usize>,
    /// First path written for each multiply linked inode
    link_sources: HashMap<InodeKey, PathBuf>,
    summary: ExtractSummary,
}

impl<R: Read + Seek> CpioReader<R> {
    /// Extract every entry below `target`
    ///
    /// Ownership is restored only when running as root. Entries with unsafe
    /// names, or whose parent is a symlink, are skipped with a warning.
    pub fn extract_all(&mut self, target: &Path) -> Result<ExtractSummary> {
        let entries = self.entries()?;
        fs::create_dir_all(target)?;

        let mut unpacker = Unpacker {
            reader: self,
            target: target.to_path_buf(),
            restore_owner: nix::unistd::geteuid().is_root(),
            data_entries: find_data_entries(&entries),
            link_sources: HashMap::new(),
            summary: ExtractSummary::default(),
        };

        let mut directories = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let Some(relative) = unpacker.destination(entry) else {
                continue;
            };

            if entry.kind() == EntryKind::Directory {
                if unpacker.create_directory(entry, &relative) {
                    directories.push((relative, entry));
                }
                continue;
            }

            unpacker.extract_entry(index, &entries, entry, &relative)?;
        }

        directories.sort_by(|a, b| b.0.cmp(&a.0));
        for (relative, entry) in directories {
            if !unpacker.is_real_directory(&relative) {
                warn!(
                    "Not restoring metadata of {}: no longer a directory inside the target",
                    entry.name
                );
                unpacker.summary.skipped += 1;
                continue;
            }
            let path = unpacker.target.join(&relative);
            unpacker.apply_metadata(&path, entry, 0o700);
            unpacker.summary.directories += 1;
        }

        debug!("Extracted CPIO archive to {}: {:?}", target.display(), unpacker.summary);
        Ok(unpacker.summary)
    }
}

/// For each multiply linked inode, the first entry that carries data
fn find_data_entries(entries: &[CpioEntry]) -> HashMap<InodeKey, usize> {
    let mut data_entries = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        if entry.is_hard_link() {
            let slot = data_entries.entry(entry.inode_key()).or_insert(index);
            if entries[*slot].size == 0 && entry.size > 0 {
                *slot = index;
            }
        }
    }
    data_entries
}

impl<R: Read + Seek> Unpacker<'_, R> {
    /// Sanitized relative path for an entry, or `None` if it must be skipped
    fn destination(&mut self, entry: &CpioEntry) -> Option<PathBuf> {
        let relative = match sanitize_path(&entry.name) {
            Ok(relative) => relative,
            Err(crate::error::Error::InvalidPath(_)) => {
                debug!("Skipping CPIO entry with empty name {:?}", entry.name);
                return None;
            }
            Err(e) => {
                warn!("Refusing CPIO entry {}: {}", entry.name, e);
                self.summary.skipped += 1;
                return None;
            }
        };

        if crosses_symlink(&self.target, &relative) {
            warn!(
                "Refusing CPIO entry {}: parent directory is a symbolic link",
                entry.name
            );
            self.summary.skipped += 1;
            return None;
        }
        Some(relative)
    }

    /// Create the directory for `entry`, replacing a non-directory of the same name
    ///
    /// An earlier symlink or file at this path is removed, never followed.
    fn create_directory(&mut self, entry: &CpioEntry, relative: &Path) -> bool {
        let path = self.target.join(relative);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => return true,
            Ok(_) => {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(
                        "Refusing CPIO directory {}: cannot replace existing {}: {}",
                        entry.name,
                        path.display(),
                        e
                    );
                    self.summary.skipped += 1;
                    return false;
                }
                debug!("Directory entry {} replaces an earlier non-directory", entry.name);
            }
            Err(_) => {}
        }

        if let Err(e) = fs::create_dir_all(&path) {
            warn!("Failed to create directory {}: {}", path.display(), e);
            self.summary.skipped += 1;
            return false;
        }
        true
    }

    /// True if `relative` is a directory reached without any symlink
    fn is_real_directory(&self, relative: &Path) -> bool {
        !crosses_symlink(&self.target, relative)
            && fs::symlink_metadata(self.target.join(relative)).is_ok_and(|meta| meta.is_dir())
    }

    fn extract_entry(
        &mut self,
        index: usize,
        entries: &[CpioEntry],
        entry: &CpioEntry,
        relative: &Path,
    ) -> Result<()> {
        let path = self.target.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(&path).is_ok_and(|meta| meta.is_dir()) {
            warn!(
                "Refusing CPIO entry {}: a directory of the same name already exists",
                entry.name
            );
            self.summary.skipped += 1;
            return Ok(());
        }
        remove_existing(&path)?;

        match entry.kind() {
            EntryKind::Regular if entry.is_hard_link() => {
                self.extract_hard_link(index, entries, entry, &path)?
            }
            EntryKind::Regular => {
                self.write_file(entry, &path)?;
                self.apply_metadata(&path, entry, 0o600);
                self.summary.files += 1;
            }
            EntryKind::Symlink => self.create_symlink(entry, &path),
            EntryKind::CharDevice | EntryKind::BlockDevice | EntryKind::Fifo => {
                self.create_special(entry, &path)
            }
            EntryKind::Socket | EntryKind::Unknown => {
                debug!("Skipping CPIO entry {} with mode {:o}", entry.name, entry.mode);
                self.summary.skipped += 1;
            }
            EntryKind::Directory => {}
        }
        Ok(())
    }

    /// Realize one name of a multiply linked inode
    ///
    /// The first name extracted gets the content (taken from whichever entry
    /// in the set carries it); later names become hard links to it, or
    /// copies where linking fails.
    fn extract_hard_link(
        &mut self,
        index: usize,
        entries: &[CpioEntry],
        entry: &CpioEntry,
        path: &Path,
    ) -> Result<()> {
        let key = entry.inode_key();

        if let Some(source) = self.link_sources.get(&key) {
            if let Err(e) = fs::hard_link(source, path) {
                debug!(
                    "Hard link {} -> {} failed ({}), copying instead",
                    path.display(),
                    source.display(),
                    e
                );
                fs::copy(source, path)?;
            }
            self.summary.hard_links += 1;
            return Ok(());
        }

        let data_index = self.data_entries.get(&key).copied().unwrap_or(index);
        let data_entry = &entries[data_index];
        self.write_file(data_entry, path)?;
        self.apply_metadata(path, data_entry, 0o600);
        self.link_sources.insert(key, path.to_path_buf());
        self.summary.files += 1;
        Ok(())
    }

    fn write_file(&mut self, entry: &CpioEntry, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.reader.copy_data(entry, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn create_symlink(&mut self, entry: &CpioEntry, path: &Path) {
        let Some(link_target) = entry.link_target.as_deref() else {
            warn!("Symlink entry {} has no target", entry.name);
            self.summary.skipped += 1;
            return;
        };

        if let Err(e) = std::os::unix::fs::symlink(link_target, path) {
            warn!("Failed to create symlink {}: {}", path.display(), e);
            self.summary.skipped += 1;
            return;
        }
        if self.restore_owner
            && let Err(e) = std::os::unix::fs::lchown(path, Some(entry.uid), Some(entry.gid))
        {
            warn!("Failed to set owner of {}: {}", path.display(), e);
        }
        self.summary.symlinks += 1;
    }

    fn create_special(&mut self, entry: &CpioEntry, path: &Path) {
        use nix::sys::stat::{Mode, SFlag, makedev, mknod};

        let perm = Mode::from_bits_truncate((entry.permissions() & 0o777) as nix::libc::mode_t);
        let created = match entry.kind() {
            EntryKind::Fifo => nix::unistd::mkfifo(path, perm),
            kind => {
                let flag = if kind == EntryKind::CharDevice {
                    SFlag::S_IFCHR
                } else {
                    SFlag::S_IFBLK
                };
                let dev = makedev(u64::from(entry.rdev_major), u64::from(entry.rdev_minor));
                mknod(path, flag, perm, dev)
            }
        };

        match created {
            Ok(()) => {
                self.apply_metadata(path, entry, 0o600);
                self.summary.special += 1;
            }
            Err(e) => {
                warn!("Failed to create special file {}: {}", path.display(), e);
                self.summary.skipped += 1;
            }
        }
    }

    /// Restore owner, permissions and mtime; failures are only logged
    ///
    /// `owner_bits` stay set so extracted content remains readable and
    /// removable by the scanner.
    fn apply_metadata(&self, path: &Path, entry: &CpioEntry, owner_bits: u32) {
        use std::os::unix::fs::PermissionsExt;

        if self.restore_owner
            && let Err(e) = std::os::unix::fs::chown(path, Some(entry.uid), Some(entry.gid))
        {
            warn!("Failed to set owner of {}: {}", path.display(), e);
        }

        let mode = (entry.permissions() & 0o777) | owner_bits;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            warn!("Failed to set permissions of {}: {}", path.display(), e);
        }

        let mtime = FileTime::from_unix_time(i64::from(entry.mtime), 0);
        if let Err(e) = filetime::set_file_mtime(path, mtime) {
            warn!("Failed to set mtime of {}: {}", path.display(), e);
        }
    }
}

/// Remove a non-directory left over from an earlier entry with the same name
fn remove_existing(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::cpio::{S_IFDIR, S_IFLNK, S_IFREG, TRAILER_NAME};
    use std::io::Cursor;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    fn push_entry(buf: &mut Vec<u8>, ino: u32, mode: u32, nlink: u32, name: &str, data: &[u8]) {
        let header = format!(
            "070701{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}",
            ino,
            mode,
            0,
            0,
            nlink,
            1_600_000_000u32,
            data.len(),
            0,
            0,
            0,
            0,
            name.len() + 1,
            0
        );
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        buf.extend_from_slice(data);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    fn extract(buf: Vec<u8>) -> (tempfile::TempDir, ExtractSummary) {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = CpioReader::new(Cursor::new(buf)).unwrap();
        let summary = reader.extract_all(dir.path()).unwrap();
        (dir, summary)
    }

    #[test]
    fn test_extract_tree() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 1, S_IFDIR | 0o555, 2, "./usr", b"");
        push_entry(&mut buf, 2, S_IFDIR | 0o755, 2, "./usr/src", b"");
        push_entry(&mut buf, 3, S_IFREG | 0o640, 1, "./usr/src/aes.c", b"AES_encrypt();\n");
        push_entry(&mut buf, 4, S_IFLNK | 0o777, 1, "./usr/src/cipher.c", b"aes.c");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        let root = dir.path();
        assert_eq!(fs::read(root.join("usr/src/aes.c")).unwrap(), b"AES_encrypt();\n");
        assert_eq!(fs::read_link(root.join("usr/src/cipher.c")).unwrap(), Path::new("aes.c"));
        assert_eq!(fs::read(root.join("usr/src/cipher.c")).unwrap(), b"AES_encrypt();\n");

        let meta = fs::metadata(root.join("usr/src/aes.c")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(meta.mtime(), 1_600_000_000);

        // Read-only directory keeps owner write access
        let usr = fs::metadata(root.join("usr")).unwrap();
        assert_eq!(usr.permissions().mode() & 0o777, 0o755);
        assert_eq!(usr.mtime(), 1_600_000_000);

        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.symlinks, 1);
    }

    #[test]
    fn test_hard_links_data_on_last_entry() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 9, S_IFREG | 0o644, 3, "bin/a", b"");
        push_entry(&mut buf, 9, S_IFREG | 0o644, 3, "bin/b", b"");
        push_entry(&mut buf, 9, S_IFREG | 0o644, 3, "bin/c", b"shared content");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        for name in ["bin/a", "bin/b", "bin/c"] {
            assert_eq!(fs::read(dir.path().join(name)).unwrap(), b"shared content", "{}", name);
        }
        let ino = fs::metadata(dir.path().join("bin/a")).unwrap().ino();
        assert_eq!(fs::metadata(dir.path().join("bin/c")).unwrap().ino(), ino);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.hard_links, 2);
    }

    #[test]
    fn test_refuses_traversal_and_symlinked_parent() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 1, S_IFREG | 0o644, 1, "../evil", b"x");
        push_entry(&mut buf, 2, S_IFLNK | 0o777, 1, "escape", b"/tmp");
        push_entry(&mut buf, 3, S_IFREG | 0o644, 1, "escape/evil", b"x");
        push_entry(&mut buf, 4, S_IFREG | 0o644, 1, "ok", b"fine");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.files, 1);
        assert!(!dir.path().parent().unwrap().join("evil").exists());
        assert_eq!(fs::read(dir.path().join("ok")).unwrap(), b"fine");
    }

    #[test]
    fn test_directory_entry_does_not_follow_symlink() {
        let outside = tempfile::tempdir().unwrap();
        fs::set_permissions(outside.path(), fs::Permissions::from_mode(0o700)).unwrap();
        let before = fs::metadata(outside.path()).unwrap().mtime();

        let mut buf = Vec::new();
        let link_target = outside.path().to_string_lossy().into_owned();
        push_entry(&mut buf, 1, S_IFLNK | 0o777, 1, "escape", link_target.as_bytes());
        push_entry(&mut buf, 2, S_IFDIR | 0o777, 2, "escape", b"");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        let outside_meta = fs::metadata(outside.path()).unwrap();
        assert_eq!(outside_meta.permissions().mode() & 0o777, 0o700);
        assert_eq!(outside_meta.mtime(), before);

        let escape = fs::symlink_metadata(dir.path().join("escape")).unwrap();
        assert!(escape.is_dir());
        assert_eq!(escape.permissions().mode() & 0o777, 0o777);
        assert_eq!(summary.symlinks, 1);
        assert_eq!(summary.directories, 1);
    }

    #[test]
    fn test_directory_replaces_earlier_file() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 1, S_IFREG | 0o644, 1, "doc", b"placeholder");
        push_entry(&mut buf, 2, S_IFDIR | 0o755, 2, "doc", b"");
        push_entry(&mut buf, 3, S_IFREG | 0o644, 1, "doc/README", b"uses AES");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        assert!(dir.path().join("doc").is_dir());
        assert_eq!(fs::read(dir.path().join("doc/README")).unwrap(), b"uses AES");
        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_file_over_directory_is_skipped() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 1, S_IFDIR | 0o755, 2, "lib", b"");
        push_entry(&mut buf, 2, S_IFREG | 0o644, 1, "lib/libssl.so", b"\x7fELF");
        push_entry(&mut buf, 3, S_IFREG | 0o644, 1, "lib", b"clobber");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let (dir, summary) = extract(buf);
        assert!(dir.path().join("lib").is_dir());
        assert_eq!(fs::read(dir.path().join("lib/libssl.so")).unwrap(), b"\x7fELF");
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_exhausted_reader_extracts_nothing() {
        let mut buf = Vec::new();
        push_entry(&mut buf, 1, S_IFREG | 0o644, 1, "a/b/c.txt", b"des");
        push_entry(&mut buf, 0, 0, 1, TRAILER_NAME, b"");

        let dir = tempfile::tempdir().unwrap();
        let mut reader = CpioReader::new(Cursor::new(buf)).unwrap();
        reader.extract_all(dir.path()).unwrap();
        // Reader is exhausted; a second call extracts nothing new
        let summary = reader.extract_all(dir.path()).unwrap();
        assert_eq!(summary, ExtractSummary::default());
        assert_eq!(fs::read(dir.path().join("a/b/c.txt")).unwrap(), b"des");
    }
}
