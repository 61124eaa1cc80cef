// src/scanner/report.rs

//! Scan results and report files
//!
//! A full scan produces one [`PackageReport`] per package, written as JSON to
//! `<output>/<package>.crypto`. The file is written under a `.partial` name
//! and renamed at the end, so a `.crypto` file that exists is complete.

use crate::config::{OutputExisting, ScanConfig};
use crate::error::{Error, Result};
use crate::matcher::MatchRecord;
use crate::scanner::lister::REPORT_EXTENSION;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File receiving the result of a quick scan
pub const QUICK_RESULT_FILE: &str = "quick-scan-result.txt";

/// Matches found in one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub sha256: String,
    pub language: String,
    pub matches: Vec<MatchRecord>,
}

/// Counters gathered while scanning a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PackageStats {
    pub file_count: usize,
    pub text_bytes: u64,
    pub binary_bytes: u64,
    pub lines_of_text: usize,
    pub execution_time_secs: f64,
}

impl PackageStats {
    /// Add another package's counters to these
    pub fn accumulate(&mut self, other: &PackageStats) {
        self.file_count += other.file_count;
        self.text_bytes += other.text_bytes;
        self.binary_bytes += other.binary_bytes;
        self.lines_of_text += other.lines_of_text;
        self.execution_time_secs += other.execution_time_secs;
    }
}

/// Options the package was scanned with
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSettings {
    /// Ids of the methods that ran
    pub methods: Vec<String>,
    pub keyword_ignore_case: bool,
    pub quick: bool,
    pub source_files_only: bool,
    pub stop_after: Option<usize>,
    pub ignore_evidence_types: Vec<String>,
}

impl ScanSettings {
    pub fn new(config: &ScanConfig, methods: Vec<String>) -> Self {
        let mut ignore_evidence_types = config.ignore_evidence_types.clone();
        ignore_evidence_types.sort();
        ignore_evidence_types.dedup();

        Self {
            methods,
            keyword_ignore_case: config.keyword.ignore_case,
            quick: config.quick,
            source_files_only: config.source_files_only,
            stop_after: config.stop_after,
            ignore_evidence_types,
        }
    }
}

/// Result of a full scan of one package
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub package_name: String,
    pub crypto_detector_version: String,
    /// Keyword list version per active method that has one
    pub keyword_list_versions: BTreeMap<String, String>,
    pub scan_settings: ScanSettings,
    /// SHA-256 over the sorted checksums of every scanned file
    pub verification_code: String,
    /// Files with at least one match, keyed by display path
    pub files: BTreeMap<String, FileReport>,
    pub stats: PackageStats,
    /// Directory holding the package; `None` inside an archive
    #[serde(skip)]
    pub package_root: Option<PathBuf>,
}

impl PackageReport {
    pub fn match_count(&self) -> usize {
        self.files.values().map(|file| file.matches.len()).sum()
    }
}

/// Write `report` into `directory`
///
/// Returns the path written, or `None` when an existing report is kept.
pub fn write_report(
    report: &PackageReport,
    directory: &Path,
    existing: OutputExisting,
    pretty: bool,
) -> Result<Option<PathBuf>> {
    let Some(target) = report_path(directory, &report.package_name, existing) else {
        info!(
            "Report for {} already exists in {}, not overwriting",
            report.package_name,
            directory.display()
        );
        return Ok(None);
    };

    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .map_err(|e| Error::FileWrite {
        path: target.clone(),
        reason: e.to_string(),
    })?;

    info!("Writing output in {}", target.display());
    let partial = PathBuf::from(format!("{}.partial", target.display()));
    let write_error = |path: &Path, e: std::io::Error| Error::FileWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut file = fs::File::create(&partial).map_err(|e| write_error(&partial, e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| write_error(&partial, e))?;
    drop(file);

    fs::rename(&partial, &target).map_err(|e| write_error(&target, e))?;
    Ok(Some(target))
}

/// Where the report for `package` goes, honouring `existing`
fn report_path(directory: &Path, package: &str, existing: OutputExisting) -> Option<PathBuf> {
    let base = directory.join(format!("{}.{}", package, REPORT_EXTENSION));
    match existing {
        OutputExisting::Overwrite => Some(base),
        OutputExisting::Skip if base.exists() => None,
        OutputExisting::Skip => Some(base),
        OutputExisting::Rename => {
            if !base.exists() {
                return Some(base);
            }
            (1..)
                .map(|n| directory.join(format!("{}.{}.{}", package, n, REPORT_EXTENSION)))
                .find(|candidate| !candidate.exists())
        }
    }
}

/// Text summary of a quick scan
pub fn format_quick_result(results: &[(String, bool)]) -> String {
    let matched: Vec<&str> = results
        .iter()
        .filter(|(_, found)| *found)
        .map(|(name, _)| name.as_str())
        .collect();

    if matched.is_empty() {
        return "Did not find any matches in any of the packages.\n".to_string();
    }

    let mut text = String::from("Found matches in the following packages:\n\n");
    for name in matched {
        text.push_str("    ");
        text.push_str(name);
        text.push('\n');
    }
    text
}

/// Write the quick scan summary to [`QUICK_RESULT_FILE`] in `directory`
pub fn write_quick_result(results: &[(String, bool)], directory: &Path) -> Result<PathBuf> {
    let path = directory.join(QUICK_RESULT_FILE);
    fs::write(&path, format_quick_result(results)).map_err(|e| Error::FileWrite {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Size in bytes as text with binary units
pub fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if size < 1024 {
        return format!("{} bytes", size);
    }
    let mut value = size as f64 / 1024.0;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} {}", value, UNITS[UNITS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str) -> PackageReport {
        PackageReport {
            package_name: name.to_string(),
            crypto_detector_version: "test".to_string(),
            keyword_list_versions: BTreeMap::new(),
            scan_settings: ScanSettings::default(),
            verification_code: String::new(),
            files: BTreeMap::new(),
            stats: PackageStats::default(),
            package_root: None,
        }
    }

    #[test]
    fn test_write_rename_existing() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_report(&report("zlib"), dir.path(), OutputExisting::Rename, false)
            .unwrap()
            .unwrap();
        let second = write_report(&report("zlib"), dir.path(), OutputExisting::Rename, false)
            .unwrap()
            .unwrap();
        let third = write_report(&report("zlib"), dir.path(), OutputExisting::Rename, true)
            .unwrap()
            .unwrap();

        assert_eq!(first, dir.path().join("zlib.crypto"));
        assert_eq!(second, dir.path().join("zlib.1.crypto"));
        assert_eq!(third, dir.path().join("zlib.2.crypto"));
        assert!(!dir.path().join("zlib.crypto.partial").exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(json["package_name"], "zlib");
        assert!(json.get("package_root").is_none());
    }

    #[test]
    fn test_report_records_scan_settings() {
        let config = ScanConfig {
            stop_after: Some(3),
            source_files_only: true,
            ignore_evidence_types: vec!["generic".to_string(), "generic".to_string()],
            ..Default::default()
        };
        let mut zlib = report("zlib");
        zlib.scan_settings = ScanSettings::new(&config, vec!["api".to_string()]);

        let json = serde_json::to_value(&zlib).unwrap();
        let settings = &json["scan_settings"];
        assert_eq!(settings["methods"], serde_json::json!(["api"]));
        assert_eq!(settings["keyword_ignore_case"], false);
        assert_eq!(settings["quick"], false);
        assert_eq!(settings["source_files_only"], true);
        assert_eq!(settings["stop_after"], 3);
        assert_eq!(settings["ignore_evidence_types"], serde_json::json!(["generic"]));

        let unlimited = ScanSettings::new(&ScanConfig::default(), Vec::new());
        assert!(serde_json::to_value(unlimited).unwrap()["stop_after"].is_null());
    }

    #[test]
    fn test_write_overwrite_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gnupg.crypto");
        fs::write(&path, b"old").unwrap();

        assert!(write_report(&report("gnupg"), dir.path(), OutputExisting::Skip, false)
            .unwrap()
            .is_none());
        assert_eq!(fs::read(&path).unwrap(), b"old");

        let written = write_report(&report("gnupg"), dir.path(), OutputExisting::Overwrite, false)
            .unwrap()
            .unwrap();
        assert_eq!(written, path);
        assert_ne!(fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let result = write_report(
            &report("x"),
            Path::new("/nonexistent/reports"),
            OutputExisting::Overwrite,
            false,
        );
        assert!(matches!(result, Err(Error::FileWrite { .. })));
    }

    #[test]
    fn test_quick_result() {
        let none = vec![("a".to_string(), false)];
        assert!(format_quick_result(&none).starts_with("Did not find"));

        let dir = tempfile::tempdir().unwrap();
        let results = vec![("a".to_string(), true), ("b".to_string(), false)];
        let path = write_quick_result(&results, dir.path()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("    a\n"));
        assert!(!text.contains("    b\n"));
    }

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0 bytes");
        assert_eq!(human_readable_size(1023), "1023 bytes");
        assert_eq!(human_readable_size(1536), "1.50 KiB");
        assert_eq!(human_readable_size(5 * 1024 * 1024), "5.00 MiB");
    }
}
