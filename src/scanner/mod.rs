// src/scanner/mod.rs

//! Scan coordination
//!
//! [`Scanner::scan`] lists each package, runs the active methods over every
//! file and collects the matches into one [`PackageReport`] per package.
//! Archive problems are handled while listing; per-file read failures are
//! logged and the file is skipped.

pub mod lister;
pub mod report;

pub use lister::{FileLister, ListedFile, PackageListing};
pub use report::{FileReport, PackageReport, PackageStats, ScanSettings, human_readable_size};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::hash;
use crate::language::Language;
use crate::methods::{Method, MethodRegistry};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

/// Version string recorded in every report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of a scan job
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Full scan reports, in scan order; empty in quick mode
    pub reports: Vec<PackageReport>,
    /// Quick mode: whether each package contained a match
    pub quick_results: Vec<(String, bool)>,
    pub package_count: usize,
    pub totals: PackageStats,
}

impl ScanSummary {
    pub fn any_matches(&self) -> bool {
        self.quick_results.iter().any(|(_, found)| *found)
            || self.reports.iter().any(|report| report.match_count() > 0)
    }
}

/// Runs detection methods over packages
pub struct Scanner {
    config: ScanConfig,
    methods: Vec<Box<dyn Method>>,
    lister: FileLister,
    write_output: bool,
}

impl Scanner {
    /// Build the methods selected in `config` from `registry`
    pub fn new(config: ScanConfig, registry: &MethodRegistry) -> Result<Self> {
        config.validate(registry)?;
        let methods = registry.build(&config.methods, &config.method_settings())?;
        Ok(Self::with_methods(config, methods))
    }

    /// Scanner over already constructed methods
    pub fn with_methods(config: ScanConfig, methods: Vec<Box<dyn Method>>) -> Self {
        let lister = FileLister::new(&config);
        Self {
            config,
            methods,
            lister,
            write_output: true,
        }
    }

    /// Keep results in memory only; no report files are written
    pub fn without_output(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Extract archives below `parent` instead of the system temp directory
    pub fn with_scratch_dir(mut self, parent: &Path) -> Self {
        self.lister = self.lister.with_scratch_dir(parent);
        self
    }

    pub fn methods(&self) -> &[Box<dyn Method>] {
        &self.methods
    }

    /// Scan every package argument in order
    pub fn scan(&self, packages: &[String]) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        if packages.is_empty() {
            info!("No package specified. Nothing to scan");
            return Ok(summary);
        }
        FileLister::validate_packages(packages)?;
        self.log_job();

        for package in packages {
            for mut listing in self.lister.list(package)? {
                summary.package_count += 1;
                let outcome = self.scan_package(&listing);
                debug!("Cleaning up temporary files of {}", listing.name);
                if let Err(e) = listing.cleanup() {
                    error!("Failed to clean up after {}: {}", listing.name, e);
                }

                match outcome? {
                    PackageOutcome::Quick { name, found, stats } => {
                        summary.totals.accumulate(&stats);
                        summary.quick_results.push((name, found));
                    }
                    PackageOutcome::Full(report) => {
                        summary.totals.accumulate(&report.stats);
                        if self.write_output {
                            let directory = match &report.package_root {
                                Some(root) if self.config.output_in_package_directory => root,
                                _ => &self.config.output,
                            };
                            report::write_report(
                                &report,
                                directory,
                                self.config.output_existing,
                                self.config.pretty,
                            )?;
                        }
                        summary.reports.push(*report);
                    }
                }
            }
        }

        if self.config.quick && self.write_output {
            let text = report::format_quick_result(&summary.quick_results);
            println!("\n{}", text);
            report::write_quick_result(&summary.quick_results, &self.config.output)?;
        }

        let totals = &summary.totals;
        info!(
            "Took {:.2} seconds to scan {} files in {} package{}, processing {} lines of text in {} of text data, in addition to scanning {} of binary data",
            totals.execution_time_secs,
            totals.file_count,
            summary.package_count,
            if summary.package_count == 1 { "" } else { "s" },
            totals.lines_of_text,
            human_readable_size(totals.text_bytes),
            human_readable_size(totals.binary_bytes),
        );
        Ok(summary)
    }

    fn log_job(&self) {
        info!("Crypto Detector {}", VERSION);
        info!(
            "Starting a new scan: source_files_only={} stop_after={:?} output_existing={} ignore_evidence_types={:?}",
            self.config.source_files_only,
            self.config.stop_after,
            self.config.output_existing,
            self.config.ignore_evidence_types,
        );
        for method in &self.methods {
            match method.keyword_list_version() {
                Some(version) => info!("Method {} is active with list version {}", method.id(), version),
                None => info!("Method {} is active", method.id()),
            }
        }
    }

    fn scan_package(&self, listing: &PackageListing) -> Result<PackageOutcome> {
        info!("Scanning package {}", listing.name);
        let start = Instant::now();

        let mut stats = PackageStats {
            file_count: listing.files.len(),
            ..Default::default()
        };
        let mut checksums = Vec::with_capacity(listing.files.len());
        let mut files = BTreeMap::new();
        let mut found_any = false;
        let mut remaining = self.config.stop_after;

        for file in &listing.files {
            let bytes = match std::fs::read(&file.physical_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to read {}: {}", file.display_path, e);
                    continue;
                }
            };
            let checksum = hash::sha256(&bytes);
            let (language, text) = Language::guess(&file.physical_path, &bytes);

            match &text {
                Some(text) => {
                    stats.text_bytes += bytes.len() as u64;
                    stats.lines_of_text += text.lines().count();
                }
                None => stats.binary_bytes += bytes.len() as u64,
            }

            let found = match text {
                Some(text) if self.config.quick => self.quick_search_file(file, &text, language),
                Some(text) => {
                    let matches = self.search_file(file, &text, language)?;
                    let found = !matches.is_empty();
                    if found {
                        files.insert(
                            file.display_path.clone(),
                            FileReport {
                                sha256: checksum.clone(),
                                language: language.to_string(),
                                matches,
                            },
                        );
                    }
                    found
                }
                None => false,
            };
            checksums.push(checksum);

            if found {
                found_any = true;
                if self.config.quick {
                    break;
                }
                if let Some(left) = remaining.as_mut() {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        info!(
                            "Stopping {} after {} files with matches",
                            listing.name,
                            self.config.stop_after.unwrap_or_default()
                        );
                        break;
                    }
                }
            }
        }

        stats.execution_time_secs = start.elapsed().as_secs_f64();

        if self.config.quick {
            return Ok(PackageOutcome::Quick {
                name: listing.name.clone(),
                found: found_any,
                stats,
            });
        }

        let report = PackageReport {
            package_name: listing.name.clone(),
            crypto_detector_version: VERSION.to_string(),
            keyword_list_versions: self
                .methods
                .iter()
                .filter_map(|m| m.keyword_list_version().map(|v| (m.id().to_string(), v.to_string())))
                .collect(),
            scan_settings: ScanSettings::new(
                &self.config,
                self.methods.iter().map(|m| m.id().to_string()).collect(),
            ),
            verification_code: hash::verification_code(checksums.iter().map(String::as_str)),
            files,
            stats,
            package_root: listing.root.clone(),
        };

        let matches = match report.match_count() {
            0 => "Did not find any matches".to_string(),
            1 => "Found only one match".to_string(),
            n => format!("Found {} matches", n),
        };
        info!(
            "Finished scanning package {} in {:.2} seconds. There were {} files consisting of {} lines of text in {} of text data and {} of binary data. {} in {}",
            listing.name,
            stats.execution_time_secs,
            stats.file_count,
            stats.lines_of_text,
            human_readable_size(stats.text_bytes),
            human_readable_size(stats.binary_bytes),
            matches,
            listing.name,
        );

        Ok(PackageOutcome::Full(Box::new(report)))
    }

    /// Methods that should look at a file of `language`
    fn applicable(&self, language: Language) -> impl Iterator<Item = &dyn Method> {
        let source_only = self.config.source_files_only;
        self.methods
            .iter()
            .map(|method| method.as_ref())
            .filter(move |method| method.supports_scanning_file(language))
            .filter(move |_| !source_only || language.is_source_code())
    }

    fn quick_search_file(&self, file: &ListedFile, text: &str, language: Language) -> bool {
        self.applicable(language).any(|method| {
            debug!("[{}] Scanning file {}", method.id(), file.display_path);
            method.quick_search(text, language)
        })
    }

    fn search_file(
        &self,
        file: &ListedFile,
        text: &str,
        language: Language,
    ) -> Result<Vec<crate::matcher::MatchRecord>> {
        let mut matches = Vec::new();
        for method in self.applicable(language) {
            debug!("[{}] Scanning file {}", method.id(), file.display_path);
            matches.extend(method.search(text, language)?);
        }
        Ok(matches)
    }
}

enum PackageOutcome {
    Quick {
        name: String,
        found: bool,
        stats: PackageStats,
    },
    Full(Box<PackageReport>),
}
