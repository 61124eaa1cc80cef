// src/cli.rs
//! CLI definitions for the crypto detector
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use crypto_detector::config::OutputExisting;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crypto-detector")]
#[command(version)]
#[command(about = "Scan source trees, archives and RPM packages for evidence of cryptography", long_about = None)]
pub struct Cli {
    /// Log debug messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan packages (files, directories, archives or wild-cards)
    Scan(ScanArgs),

    /// List the available detection methods
    ListMethods,

    /// Validate a keyword or API pattern list
    CheckKeywords {
        /// Path to the list file
        path: PathBuf,

        /// Evidence type to leave out (repeatable)
        #[arg(long = "ignore-evidence-type")]
        ignore_evidence_types: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Files, directories, archives or wild-card expressions to scan
    pub packages: Vec<String>,

    /// Detection methods to run (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub methods: Option<Vec<String>>,

    /// Directory receiving the .crypto reports
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write each report next to its package
    #[arg(long)]
    pub output_in_package_directory: bool,

    /// What to do with an existing report: rename, overwrite or skip
    #[arg(long)]
    pub output_existing: Option<OutputExisting>,

    /// Only report whether each package contains any match
    #[arg(long)]
    pub quick: bool,

    /// Stop a package after this many files produced matches
    #[arg(long)]
    pub stop_after: Option<usize>,

    /// Skip files that are not source code
    #[arg(long)]
    pub source_files_only: bool,

    /// Evidence type to leave out (repeatable)
    #[arg(long = "ignore-evidence-type")]
    pub ignore_evidence_types: Vec<String>,

    /// Match keywords regardless of case
    #[arg(long)]
    pub keyword_ignore_case: bool,

    /// Keyword list replacing the built-in one
    #[arg(long)]
    pub keyword_list: Option<PathBuf>,

    /// API pattern list replacing the built-in one
    #[arg(long)]
    pub api_list: Option<PathBuf>,

    /// Configuration file (default: ./cryptodetector.toml, then ~/.cryptodetector.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Indent the JSON reports
    #[arg(long)]
    pub pretty: bool,

    /// Only log errors
    #[arg(long)]
    pub suppress_warnings: bool,
}
