// src/config.rs
//! Scan configuration
//!
//! Options come from an optional TOML file and from the command line, with
//! command line values taking precedence. The file is looked up in this
//! order: an explicit `--config` path, `./cryptodetector.toml`, then
//! `$HOME/.cryptodetector.toml`.
//!
//! # Example (TOML)
//!
//! ```toml
//! methods = ["keyword", "api"]
//! output = "/var/tmp/crypto-reports"
//! output_existing = "rename"
//! pretty = true
//! source_files_only = false
//! ignore_evidence_types = ["generic"]
//!
//! [keyword]
//! ignore_case = true
//! list = "/etc/cryptodetector/keyword_list.txt"
//!
//! [api]
//! list = "/etc/cryptodetector/api_patterns.txt"
//! ```

use crate::error::{Error, Result};
use crate::methods::{MethodRegistry, MethodSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Name of the configuration file searched for in the working and home directories
pub const CONFIG_FILE_NAME: &str = "cryptodetector.toml";

/// What to do when a package's report file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputExisting {
    /// Write `<package>.1.crypto`, `<package>.2.crypto`, ... instead
    #[default]
    Rename,
    /// Replace the existing report
    Overwrite,
    /// Do not scan the package at all
    Skip,
}

impl fmt::Display for OutputExisting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename => write!(f, "rename"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for OutputExisting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rename" => Ok(Self::Rename),
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidOptions(format!(
                "output_existing had invalid value '{}', expected one of rename, overwrite, skip",
                other
            ))),
        }
    }
}

/// Options of the keyword method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordOptions {
    /// Match keywords regardless of case
    pub ignore_case: bool,
    /// Keyword list replacing the built-in one
    pub list: Option<PathBuf>,
}

/// Options of the API method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    /// API pattern list replacing the built-in one
    pub list: Option<PathBuf>,
}

/// Complete configuration of one scan job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Detection methods to run, by id
    pub methods: Vec<String>,
    /// Directory receiving the `.crypto` reports
    pub output: PathBuf,
    /// Write each report next to its package instead of into `output`
    pub output_in_package_directory: bool,
    pub output_existing: OutputExisting,
    /// Indent the JSON reports
    pub pretty: bool,
    /// Only report whether each package contains any match
    pub quick: bool,
    /// Stop a package after this many files produced matches
    pub stop_after: Option<usize>,
    /// Skip files that are not source code
    pub source_files_only: bool,
    /// Evidence types whose keywords are never loaded
    pub ignore_evidence_types: Vec<String>,
    pub verbose: bool,
    pub suppress_warnings: bool,
    pub keyword: KeywordOptions,
    pub api: ApiOptions,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            methods: vec!["keyword".to_string(), "api".to_string()],
            output: PathBuf::from("."),
            output_in_package_directory: false,
            output_existing: OutputExisting::default(),
            pretty: false,
            quick: false,
            stop_after: None,
            source_files_only: false,
            ignore_evidence_types: Vec::new(),
            verbose: false,
            suppress_warnings: false,
            keyword: KeywordOptions::default(),
            api: ApiOptions::default(),
        }
    }
}

/// Command line values that replace configuration file values when present
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub methods: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub output_in_package_directory: bool,
    pub output_existing: Option<OutputExisting>,
    pub pretty: bool,
    pub quick: bool,
    pub stop_after: Option<usize>,
    pub source_files_only: bool,
    /// Added to the configured ignore list
    pub ignore_evidence_types: Vec<String>,
    pub verbose: bool,
    pub suppress_warnings: bool,
    pub keyword_ignore_case: bool,
    pub keyword_list: Option<PathBuf>,
    pub api_list: Option<PathBuf>,
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidOptions(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, path)
    }

    /// Parse TOML configuration text; `origin` only appears in errors
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::InvalidOptions(format!(
                "failed to parse config file {}: {}",
                origin.display(),
                e
            ))
        })
    }

    /// Find and load the configuration file
    ///
    /// An explicit path must exist. Without one, the working directory and
    /// then the home directory are searched; if neither has a file the
    /// defaults are used.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::InvalidOptions(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Self::load(path);
        }

        let home = dirs::home_dir().map(|home| home.join(format!(".{}", CONFIG_FILE_NAME)));
        let candidates = std::iter::once(PathBuf::from(CONFIG_FILE_NAME)).chain(home);

        for candidate in candidates {
            if candidate.is_file() {
                debug!("Using config file {}", candidate.display());
                return Self::load(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply command line values on top of this configuration
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(methods) = overrides.methods {
            self.methods = methods;
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if let Some(existing) = overrides.output_existing {
            self.output_existing = existing;
        }
        if overrides.stop_after.is_some() {
            self.stop_after = overrides.stop_after;
        }
        if overrides.keyword_list.is_some() {
            self.keyword.list = overrides.keyword_list;
        }
        if overrides.api_list.is_some() {
            self.api.list = overrides.api_list;
        }

        self.output_in_package_directory |= overrides.output_in_package_directory;
        self.pretty |= overrides.pretty;
        self.quick |= overrides.quick;
        self.source_files_only |= overrides.source_files_only;
        self.verbose |= overrides.verbose;
        self.suppress_warnings |= overrides.suppress_warnings;
        self.keyword.ignore_case |= overrides.keyword_ignore_case;

        for evidence_type in overrides.ignore_evidence_types {
            if !self.ignore_evidence_types.contains(&evidence_type) {
                self.ignore_evidence_types.push(evidence_type);
            }
        }
    }

    /// Check the options against each other and against `registry`
    pub fn validate(&self, registry: &MethodRegistry) -> Result<()> {
        if self.stop_after == Some(0) {
            return Err(Error::InvalidOptions(
                "stop_after should be a positive integer".to_string(),
            ));
        }

        if self.methods.is_empty() {
            return Err(Error::InvalidOptions(
                "at least one detection method must be selected".to_string(),
            ));
        }

        if let Some(unknown) = self.methods.iter().find(|id| !registry.contains(id)) {
            let known: Vec<&str> = registry.ids().collect();
            return Err(Error::InvalidOptions(format!(
                "invalid method '{}', available methods: {}",
                unknown,
                known.join(", ")
            )));
        }

        if !self.output.is_dir() {
            return Err(Error::InvalidOptions(format!(
                "the specified output directory doesn't exist: {}",
                self.output.display()
            )));
        }

        Ok(())
    }

    /// Settings handed to method constructors
    pub fn method_settings(&self) -> MethodSettings {
        MethodSettings {
            ignore_evidence_types: self.ignore_evidence_types.iter().cloned().collect(),
            keyword_ignore_case: self.keyword.ignore_case,
            keyword_list: self.keyword.list.clone(),
            api_list: self.api.list.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.methods, vec!["keyword", "api"]);
        assert_eq!(config.output_existing, OutputExisting::Rename);
        assert!(config.stop_after.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let text = r#"
methods = ["keyword"]
output_existing = "skip"
stop_after = 2

[keyword]
ignore_case = true
"#;
        let config = ScanConfig::parse(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.methods, vec!["keyword"]);
        assert_eq!(config.output_existing, OutputExisting::Skip);
        assert_eq!(config.stop_after, Some(2));
        assert!(config.keyword.ignore_case);
        assert!(!config.pretty);
        assert_eq!(config.output, PathBuf::from("."));
    }

    #[test]
    fn test_parse_rejects_bad_value() {
        let err = ScanConfig::parse("output_existing = \"append\"", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = ScanConfig {
            ignore_evidence_types: vec!["generic".to_string()],
            ..Default::default()
        };
        config.apply(ConfigOverrides {
            methods: Some(vec!["api".to_string()]),
            output_existing: Some(OutputExisting::Overwrite),
            ignore_evidence_types: vec!["generic".to_string(), "library".to_string()],
            keyword_ignore_case: true,
            ..Default::default()
        });

        assert_eq!(config.methods, vec!["api"]);
        assert_eq!(config.output_existing, OutputExisting::Overwrite);
        assert_eq!(config.ignore_evidence_types, vec!["generic", "library"]);
        assert!(config.method_settings().keyword_ignore_case);
    }

    #[test]
    fn test_validate() {
        let registry = MethodRegistry::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            output: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.validate(&registry).unwrap();

        let zero = ScanConfig {
            stop_after: Some(0),
            ..config.clone()
        };
        assert!(matches!(zero.validate(&registry), Err(Error::InvalidOptions(_))));

        let unknown = ScanConfig {
            methods: vec!["entropy".to_string()],
            ..config.clone()
        };
        assert!(matches!(unknown.validate(&registry), Err(Error::InvalidOptions(_))));

        let missing = ScanConfig {
            output: dir.path().join("nope"),
            ..config
        };
        assert!(matches!(missing.validate(&registry), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_discover_explicit_missing() {
        let result = ScanConfig::discover(Some(Path::new("/nonexistent/cryptodetector.toml")));
        assert!(matches!(result, Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_output_existing_from_str() {
        assert_eq!("skip".parse::<OutputExisting>().unwrap(), OutputExisting::Skip);
        assert!("keep".parse::<OutputExisting>().is_err());
        assert_eq!(OutputExisting::Rename.to_string(), "rename");
    }
}
