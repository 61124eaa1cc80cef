// src/commands.rs
//! Command handlers for the crypto detector CLI

use crate::cli::ScanArgs;
use anyhow::{Context, Result};
use crypto_detector::config::{ConfigOverrides, ScanConfig};
use crypto_detector::language::Language;
use crypto_detector::matcher::KeywordTable;
use crypto_detector::methods::MethodRegistry;
use crypto_detector::scanner::Scanner;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Resolve the scan configuration: config file first, command line on top
pub fn load_scan_config(args: &ScanArgs) -> Result<ScanConfig> {
    let mut config = ScanConfig::discover(args.config.as_deref())
        .context("Failed to load configuration")?;

    config.apply(ConfigOverrides {
        methods: args.methods.clone(),
        output: args.output.clone(),
        output_in_package_directory: args.output_in_package_directory,
        output_existing: args.output_existing,
        pretty: args.pretty,
        quick: args.quick,
        stop_after: args.stop_after,
        source_files_only: args.source_files_only,
        ignore_evidence_types: args.ignore_evidence_types.clone(),
        verbose: false,
        suppress_warnings: args.suppress_warnings,
        keyword_ignore_case: args.keyword_ignore_case,
        keyword_list: args.keyword_list.clone(),
        api_list: args.api_list.clone(),
    });
    Ok(config)
}

/// Scan the packages named in `args`
pub fn cmd_scan(args: &ScanArgs, config: ScanConfig) -> Result<()> {
    let registry = MethodRegistry::builtin()?;
    let scanner = Scanner::new(config, &registry).context("Invalid scan options")?;

    let summary = scanner.scan(&args.packages)?;
    if summary.package_count > 0 {
        info!(
            "Scanned {} package(s), {}",
            summary.package_count,
            if summary.any_matches() {
                "cryptography found"
            } else {
                "no cryptography found"
            }
        );
    }
    Ok(())
}

/// Print the registered detection methods
pub fn cmd_list_methods() -> Result<()> {
    let registry = MethodRegistry::builtin()?;
    println!("Available methods:");
    for id in registry.ids() {
        println!("  {}", id);
    }
    Ok(())
}

/// Load a keyword list and print its version and per-language counts
pub fn cmd_check_keywords(path: &Path, ignore_evidence_types: &[String]) -> Result<()> {
    let ignore: HashSet<String> = ignore_evidence_types.iter().cloned().collect();
    let table = KeywordTable::load(path, &ignore)
        .with_context(|| format!("Keyword list {} is invalid", path.display()))?;

    println!("{}: version {}", path.display(), table.version());
    println!(
        "  {} keywords in {} evidence specs",
        table.len(),
        table.specs().len()
    );
    for language in Language::keyword_groups() {
        let count = table.keywords(*language).len();
        if count > 0 {
            println!("  {:<12} {}", language.as_str(), count);
        }
    }
    Ok(())
}
