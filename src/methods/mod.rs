// src/methods/mod.rs

//! Detection methods
//!
//! A method decides which files it can scan and produces match records for
//! them. Methods are registered in a compiled-in table of
//! `(id, constructor)` pairs; the table is checked for duplicate ids when it
//! is built, and constructors receive all of their configuration through
//! [`MethodSettings`].

mod api;
mod common;
mod keyword;

pub use api::ApiMethod;
pub use common::ListMethod;
pub use keyword::KeywordMethod;

use crate::error::{Error, Result};
use crate::language::Language;
use crate::matcher::MatchRecord;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// A way of finding cryptographic evidence in file content
pub trait Method: Send + Sync {
    /// Identifier used on the command line and in reports
    fn id(&self) -> &'static str;

    /// Whether files of `language` should be handed to this method
    fn supports_scanning_file(&self, language: Language) -> bool;

    /// Find every match in `content`
    fn search(&self, content: &str, language: Language) -> Result<Vec<MatchRecord>>;

    /// True if `content` contains at least one match
    fn quick_search(&self, content: &str, language: Language) -> bool;

    /// Version of the list the method searches with, if it has one
    fn keyword_list_version(&self) -> Option<&str> {
        None
    }
}

/// Configuration handed to method constructors
#[derive(Debug, Clone, Default)]
pub struct MethodSettings {
    /// Evidence types whose keywords are not loaded at all
    pub ignore_evidence_types: HashSet<String>,
    /// Keyword method compares case-insensitively
    pub keyword_ignore_case: bool,
    /// Keyword list replacing the built-in one
    pub keyword_list: Option<PathBuf>,
    /// API pattern list replacing the built-in one
    pub api_list: Option<PathBuf>,
}

/// Builds a method from settings
pub type MethodConstructor = fn(&MethodSettings) -> Result<Box<dyn Method>>;

/// Table of available methods
pub struct MethodRegistry {
    entries: Vec<(&'static str, MethodConstructor)>,
}

impl MethodRegistry {
    /// Create a registry, rejecting duplicate ids
    pub fn new(entries: Vec<(&'static str, MethodConstructor)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (id, _) in &entries {
            if id.is_empty() {
                return Err(Error::InvalidMethod("method id must not be empty".to_string()));
            }
            if !seen.insert(*id) {
                return Err(Error::InvalidMethod(format!(
                    "method id '{}' is registered more than once",
                    id
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Registry holding the methods shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::new(vec![
            (KeywordMethod::ID, KeywordMethod::construct as MethodConstructor),
            (ApiMethod::ID, ApiMethod::construct as MethodConstructor),
        ])
    }

    /// Registered ids, in registration order
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(registered, _)| *registered == id)
    }

    /// Construct the selected methods, in the order given
    ///
    /// Repeated ids are constructed once; an unknown id is
    /// [`Error::InvalidOptions`].
    pub fn build(&self, ids: &[String], settings: &MethodSettings) -> Result<Vec<Box<dyn Method>>> {
        if ids.is_empty() {
            return Err(Error::InvalidOptions(
                "at least one detection method must be selected".to_string(),
            ));
        }

        let mut built = HashSet::new();
        let mut methods = Vec::new();
        for id in ids {
            let Some((_, construct)) = self
                .entries
                .iter()
                .find(|(registered, _)| *registered == id.as_str())
            else {
                let known: Vec<&str> = self.ids().collect();
                return Err(Error::InvalidOptions(format!(
                    "unknown method '{}', available methods: {}",
                    id,
                    known.join(", ")
                )));
            };
            if built.insert(id.as_str()) {
                debug!("Constructing method {}", id);
                methods.push(construct(settings)?);
            }
        }
        Ok(methods)
    }
}
