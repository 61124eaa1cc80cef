// src/error.rs

//! Error types for the crypto detector
//!
//! Configuration errors (keyword lists, regexes, methods, options) are fatal
//! and abort startup. Archive errors (`Extract`, `Read`, `Compression`,
//! `InvalidRpm`) are recoverable: the scanner logs them with the offending
//! path and skips the affected file or archive.

use crate::compression::CompressionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed keyword or API pattern list
    #[error("Invalid keyword list: {0}")]
    InvalidKeywordList(String),

    /// A keyword pattern failed to compile
    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),

    /// Broken method registration (duplicate id, bad list)
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Language tag outside the supported set
    #[error("Invalid language '{0}'")]
    InvalidLanguage(String),

    /// Bad scan options or configuration file
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A package argument that is neither a file, directory nor wild-card
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// Failure to probe or extract an archive
    #[error("Failed to extract {}: {reason}", path.display())]
    Extract { path: PathBuf, reason: String },

    /// Truncated or corrupt CPIO stream
    #[error("Read error at offset {offset}: {reason}")]
    Read { offset: u64, reason: String },

    /// Missing or failing decompressor
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// Malformed RPM container
    #[error("Invalid RPM: {0}")]
    InvalidRpm(String),

    /// Archive entry tried to escape the extraction root
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Archive entry name that is empty after sanitization
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Failure writing a report or scratch directory
    #[error("Failed to write {}: {reason}", path.display())]
    FileWrite { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any error as an extraction failure for `path`
    pub fn extract(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Extract {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors the scanner recovers from by skipping one archive
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Extract { .. }
                | Self::Read { .. }
                | Self::Compression(_)
                | Self::InvalidRpm(_)
                | Self::PathTraversal(_)
                | Self::InvalidPath(_)
        )
    }
}
