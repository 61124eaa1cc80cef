// src/filesystem/workspace.rs

//! Scratch directories for archive extraction
//!
//! Each archive is unpacked into its own workspace. Workspaces are removed
//! when dropped, including on error paths. Archives routinely contain
//! read-only directories, so permissions are opened up before removal.

use crate::error::{Error, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Prefix of every workspace directory name
const WORKSPACE_PREFIX: &str = "crypto-detector-";

/// A temporary directory owned by one extraction
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a workspace in `parent`, or in the system temp directory
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::FileWrite {
            path: parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            reason: format!("failed to create scratch directory: {}", e),
        })?;

        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(TempDir::path).unwrap_or(Path::new(""))
    }

    /// Remove the workspace now, reporting failures
    pub fn close(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                relax_permissions(dir.path());
                dir.close()?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path: PathBuf = dir.path().to_path_buf();
            relax_permissions(&path);
            if let Err(e) = dir.close() {
                warn!("Failed to remove workspace {}: {}", path.display(), e);
            }
        }
    }
}

/// Give the owner full access to every directory below `root`
fn relax_permissions(root: &Path) {
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let mode = meta.permissions().mode();
        if mode & 0o700 != 0o700 {
            let relaxed = std::fs::Permissions::from_mode(mode | 0o700);
            if let Err(e) = std::fs::set_permissions(entry.path(), relaxed) {
                debug!("Could not relax permissions on {}: {}", entry.path().display(), e);
            }
        }
    }
}
