// src/methods/keyword.rs

//! Keyword search method

use crate::error::Result;
use crate::matcher::MatchOptions;
use crate::methods::common::{ListMethod, ListSource};
use crate::methods::{Method, MethodSettings};

/// Built-in keyword list
const DEFAULT_KEYWORD_LIST: &str = include_str!("../../data/keyword_list.txt");

/// Searches text files for crypto-related keywords
///
/// Keywords match anywhere, including inside identifiers, unless the list
/// marks a boundary with `\b`. Case sensitivity is configurable.
pub struct KeywordMethod;

impl KeywordMethod {
    pub const ID: &'static str = "keyword";

    pub fn new(settings: &MethodSettings) -> Result<ListMethod> {
        let source = ListSource {
            path: settings.keyword_list.as_deref(),
            builtin: DEFAULT_KEYWORD_LIST,
            builtin_name: "built-in keyword list",
        };
        ListMethod::new(
            Self::ID,
            source,
            &settings.ignore_evidence_types,
            MatchOptions {
                ignore_case: settings.keyword_ignore_case,
                whole_words: false,
            },
        )
    }

    pub fn construct(settings: &MethodSettings) -> Result<Box<dyn Method>> {
        Ok(Box::new(Self::new(settings)?))
    }
}
