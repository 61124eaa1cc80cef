// src/scanner/lister.rs

//! Package enumeration
//!
//! A package argument is a file, a directory or a wild-card expression. Each
//! package becomes a [`PackageListing`]: the files to scan, each with the
//! path shown to the user and the path where its bytes can be read. Archives
//! are extracted into scratch workspaces, recursively, and their members are
//! displayed below the archive (`/pkg/src.tar.gz/lib/aes.c`).

use crate::config::{OutputExisting, ScanConfig};
use crate::error::{Error, Result};
use crate::filesystem::Workspace;
use crate::filesystem::path::display_join;
use crate::packages::{ArchiveFormat, classify, extract_archive};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Extension of report files; such files are never scanned as packages
pub const REPORT_EXTENSION: &str = "crypto";

/// A file to scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// Path reported to the user, showing archive nesting
    pub display_path: String,
    /// Where the content can be read
    pub physical_path: PathBuf,
}

/// All files belonging to one package
///
/// Scratch directories holding extracted archive members are owned by the
/// listing and removed when it is dropped.
#[derive(Debug)]
pub struct PackageListing {
    pub name: String,
    /// Directory containing the package; `None` inside an archive
    pub root: Option<PathBuf>,
    pub files: Vec<ListedFile>,
    workspaces: Vec<Workspace>,
}

impl PackageListing {
    /// Remove the scratch directories now instead of on drop
    pub fn cleanup(&mut self) -> Result<()> {
        for workspace in self.workspaces.drain(..) {
            workspace.close()?;
        }
        Ok(())
    }
}

/// Turns package arguments into file lists
#[derive(Debug, Clone)]
pub struct FileLister {
    skip_existing: bool,
    output_directory: PathBuf,
    output_in_package_directory: bool,
    scratch_parent: Option<PathBuf>,
}

impl FileLister {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            skip_existing: config.output_existing == OutputExisting::Skip,
            output_directory: config.output.clone(),
            output_in_package_directory: config.output_in_package_directory,
            scratch_parent: None,
        }
    }

    /// Create scratch workspaces below `parent` instead of the system temp directory
    pub fn with_scratch_dir(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(parent.into());
        self
    }

    /// Check that every package argument names something listable
    pub fn validate_packages(packages: &[String]) -> Result<()> {
        for package in packages {
            let path = Path::new(package);
            if !(path.is_file() || path.is_dir() || is_wild_card(package)) {
                return Err(Error::InvalidPackage(format!(
                    "{}. It wasn't a file, directory, an archive or a wild-card expression",
                    package
                )));
            }
        }
        Ok(())
    }

    /// List the packages named by one argument
    ///
    /// A wild-card can name several packages; skipped packages produce no
    /// listing.
    pub fn list(&self, package: &str) -> Result<Vec<PackageListing>> {
        let path = Path::new(package);
        if path.is_file() {
            return Ok(self.list_file(path)?.into_iter().collect());
        }
        if path.is_dir() {
            return Ok(self.list_directory(path)?.into_iter().collect());
        }
        if is_wild_card(package) {
            return self.list_wild_card(package);
        }
        Err(Error::InvalidPackage(package.to_string()))
    }

    fn list_wild_card(&self, pattern: &str) -> Result<Vec<PackageListing>> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::InvalidPackage(format!("{}: {}", pattern, e)))?;

        let mut listings = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable wild-card match: {}", e);
                    continue;
                }
            };
            let listing = if path.is_file() {
                self.list_file(&path)?
            } else {
                self.list_directory(&path)?
            };
            listings.extend(listing);
        }
        Ok(listings)
    }

    /// A single file is a package of its own; an archive is expanded
    fn list_file(&self, path: &Path) -> Result<Option<PackageListing>> {
        let name = file_name(path);
        let absolute = std::path::absolute(path)?;
        let root = absolute.parent().map(Path::to_path_buf);

        if path.extension().is_some_and(|ext| ext == REPORT_EXTENSION) {
            info!(
                "The file {} has a .{} extension, which is reserved for reports. Not listing it as a package",
                path.display(),
                REPORT_EXTENSION
            );
            return Ok(None);
        }
        if self.skip_package(&name, root.as_deref()) {
            return Ok(None);
        }

        let display_path = absolute.to_string_lossy().into_owned();
        let format = match classify(path) {
            Ok(format) => format,
            Err(e) => {
                error!("{}", e);
                return Ok(None);
            }
        };

        if !format.is_archive() {
            return Ok(Some(PackageListing {
                name,
                root,
                files: vec![ListedFile {
                    display_path,
                    physical_path: path.to_path_buf(),
                }],
                workspaces: Vec::new(),
            }));
        }

        let mut workspaces = Vec::new();
        let workspace = match self.extract(format, path, &display_path) {
            Ok(workspace) => workspace,
            Err(e) if e.is_recoverable() => {
                error!("{}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let extracted = workspace.path().to_path_buf();
        workspaces.push(workspace);

        let files = self.collect(&extracted, Some(&display_path), &mut workspaces)?;
        Ok(Some(PackageListing {
            name,
            root,
            files,
            workspaces,
        }))
    }

    fn list_directory(&self, path: &Path) -> Result<Option<PackageListing>> {
        let absolute = std::path::absolute(path)?;
        let name = file_name(&absolute);
        let root = absolute.parent().map(Path::to_path_buf);

        if self.skip_package(&name, root.as_deref()) {
            return Ok(None);
        }

        let mut workspaces = Vec::new();
        let files = self.collect(&absolute, None, &mut workspaces)?;
        Ok(Some(PackageListing {
            name,
            root,
            files,
            workspaces,
        }))
    }

    /// Walk `dir`, descending into archives
    ///
    /// `archive_display` is the display path of the archive `dir` was
    /// extracted from, if any. Archives that fail to extract are logged and
    /// left out.
    fn collect(
        &self,
        dir: &Path,
        archive_display: Option<&str>,
        workspaces: &mut Vec<Workspace>,
    ) -> Result<Vec<ListedFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry below {}: {}", dir.display(), e);
                    continue;
                }
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let display_path = match archive_display {
                Some(archive) => {
                    let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
                    display_join(archive, relative)
                }
                None => entry.path().to_string_lossy().into_owned(),
            };

            if file_type.is_symlink() {
                warn!("Skipping symbolic link: {}", display_path);
                continue;
            }
            if !file_type.is_file() {
                debug!("Skipping special file: {}", display_path);
                continue;
            }

            let format = match classify(entry.path()) {
                Ok(format) => format,
                Err(e) => {
                    error!("{}", Error::extract(&display_path, e));
                    continue;
                }
            };

            if format.is_archive() {
                let workspace = match self.extract(format, entry.path(), &display_path) {
                    Ok(workspace) => workspace,
                    Err(e) if e.is_recoverable() => {
                        error!("{}", e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let extracted = workspace.path().to_path_buf();
                workspaces.push(workspace);
                files.extend(self.collect(&extracted, Some(&display_path), workspaces)?);
            } else {
                files.push(ListedFile {
                    display_path,
                    physical_path: entry.into_path(),
                });
            }
        }

        Ok(files)
    }

    /// Extract an archive into a fresh workspace
    ///
    /// The workspace is dropped, and so removed, if extraction fails.
    fn extract(&self, format: ArchiveFormat, path: &Path, display_path: &str) -> Result<Workspace> {
        let workspace = Workspace::new(self.scratch_parent.as_deref())?;
        extract_archive(format, path, display_path, workspace.path())?;
        Ok(workspace)
    }

    /// True if the package's report exists and existing reports are kept
    fn skip_package(&self, name: &str, root: Option<&Path>) -> bool {
        if !self.skip_existing {
            return false;
        }

        let output_directory = match root {
            Some(root) if self.output_in_package_directory => root,
            _ => self.output_directory.as_path(),
        };
        let report = output_directory.join(format!("{}.{}", name, REPORT_EXTENSION));
        let exists = report.is_file();
        if exists {
            info!(
                "Found a report for package {} at {}. Will skip scanning this package",
                name,
                report.display()
            );
        }
        exists
    }
}

/// True if `pattern` is a glob expression matching at least one path
pub fn is_wild_card(pattern: &str) -> bool {
    glob::glob(pattern)
        .map(|mut paths| paths.next().is_some())
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn lister() -> FileLister {
        FileLister::new(&ScanConfig::default())
    }

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn test_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("openssl-1.0");
        fs::create_dir_all(pkg.join("crypto")).unwrap();
        fs::write(pkg.join("crypto/aes.c"), b"AES_encrypt").unwrap();
        fs::write(pkg.join("README"), b"docs").unwrap();

        let listings = lister().list(pkg.to_str().unwrap()).unwrap();
        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert_eq!(listing.name, "openssl-1.0");
        assert_eq!(listing.root.as_deref(), Some(dir.path()));

        let names: Vec<&str> = listing.files.iter().map(|f| f.display_path.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("openssl-1.0/README"));
        assert!(names[1].ends_with("openssl-1.0/crypto/aes.c"));
    }

    #[test]
    fn test_nested_archive_display_paths() {
        let dir = tempfile::tempdir().unwrap();
        let inner = tar_gz(&[("lib/rsa.py", b"import rsa")]);
        let outer = tar_gz(&[("vendor/inner.tar.gz", &inner), ("main.c", b"int main;")]);
        let archive = dir.path().join("outer.tar.gz");
        fs::write(&archive, outer).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let lister = lister().with_scratch_dir(scratch.path());
        let mut listings = lister.list(archive.to_str().unwrap()).unwrap();
        assert_eq!(listings.len(), 1);
        let listing = &mut listings[0];
        assert_eq!(listing.name, "outer.tar.gz");

        let archive_display = std::path::absolute(&archive).unwrap();
        let archive_display = archive_display.to_string_lossy();
        let displays: Vec<String> = listing.files.iter().map(|f| f.display_path.clone()).collect();
        assert!(displays.contains(&format!("{}/main.c", archive_display)));
        assert!(displays.contains(&format!("{}/vendor/inner.tar.gz/lib/rsa.py", archive_display)));

        let nested = listing
            .files
            .iter()
            .find(|f| f.display_path.ends_with("rsa.py"))
            .unwrap();
        assert_eq!(fs::read(&nested.physical_path).unwrap(), b"import rsa");

        listing.cleanup().unwrap();
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_broken_nested_archive_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        // Valid gzip header, truncated body
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&[b'x'; 4096]).unwrap();
        let mut bytes = gz.finish().unwrap();
        bytes.truncate(bytes.len() - 8);
        fs::write(pkg.join("broken.gz"), bytes).unwrap();
        fs::write(pkg.join("ok.txt"), b"fine").unwrap();

        let listings = lister().list(pkg.to_str().unwrap()).unwrap();
        let files = &listings[0].files;
        assert!(files.iter().any(|f| f.display_path.ends_with("ok.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.c"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.c"), dir.path().join("link.c")).unwrap();

        let listings = lister().list(dir.path().to_str().unwrap()).unwrap();
        let files = &listings[0].files;
        assert_eq!(files.len(), 1);
        assert!(files[0].display_path.ends_with("real.c"));
    }

    #[test]
    fn test_report_files_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("pkg.crypto");
        fs::write(&report, b"{}").unwrap();
        assert!(lister().list(report.to_str().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_skip_existing_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("zlib");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("a.c"), b"x").unwrap();
        fs::write(out.path().join("zlib.crypto"), b"{}").unwrap();

        let config = ScanConfig {
            output: out.path().to_path_buf(),
            output_existing: OutputExisting::Skip,
            ..Default::default()
        };
        let listings = FileLister::new(&config).list(pkg.to_str().unwrap()).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn test_wild_card() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), b"x").unwrap();
        fs::write(dir.path().join("b.py"), b"y").unwrap();
        fs::write(dir.path().join("c.txt"), b"z").unwrap();

        let pattern = format!("{}/*.py", dir.path().display());
        assert!(is_wild_card(&pattern));
        FileLister::validate_packages(&[pattern.clone()]).unwrap();

        let listings = lister().list(&pattern).unwrap();
        let names: Vec<&str> = listings.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_validate_rejects_missing() {
        let result = FileLister::validate_packages(&["/nonexistent/package".to_string()]);
        assert!(matches!(result, Err(Error::InvalidPackage(_))));
    }
}
