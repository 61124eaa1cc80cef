// src/lib.rs

//! Crypto Detector
//!
//! Scans files, directories and packages for evidence of cryptography and
//! reports each match with its exact position and surrounding lines.
//!
//! # Architecture
//!
//! - Keyword tables: loaded once from INI-style lists, read-only afterwards
//! - Match engine: substring pre-filter, then a single alternation regex
//! - Methods: compiled-in registry of detection methods, configured explicitly
//! - Packages: zip, tar, gzip, bzip2, xz/lzma and RPM (decoded from scratch,
//!   including the newc CPIO payload)
//! - Scanner: lists packages, extracts nested archives into scratch
//!   directories and writes one JSON report per package

pub mod compression;
pub mod config;
mod error;
pub mod filesystem;
pub mod hash;
pub mod language;
pub mod matcher;
pub mod methods;
pub mod packages;
pub mod scanner;

pub use config::{OutputExisting, ScanConfig};
pub use error::{Error, Result};
pub use language::Language;
pub use matcher::{KeywordTable, MatchEngine, MatchOptions, MatchRecord};
pub use methods::{Method, MethodRegistry, MethodSettings};
pub use packages::{ArchiveFormat, CpioReader, RpmDecoder, extract_rpm, is_rpm};
pub use scanner::{PackageReport, ScanSummary, Scanner};
