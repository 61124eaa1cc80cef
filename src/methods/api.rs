// src/methods/api.rs

//! API usage method

use crate::error::Result;
use crate::matcher::MatchOptions;
use crate::methods::common::{ListMethod, ListSource};
use crate::methods::{Method, MethodSettings};

/// Built-in API pattern list
const DEFAULT_API_PATTERNS: &str = include_str!("../../data/api_patterns.txt");

/// Searches source files for calls into crypto libraries
///
/// Patterns are case-sensitive and only match whole words, so
/// `EVP_EncryptInit` does not fire on `EVP_EncryptInit_ex`.
pub struct ApiMethod;

impl ApiMethod {
    pub const ID: &'static str = "api";

    pub fn new(settings: &MethodSettings) -> Result<ListMethod> {
        let source = ListSource {
            path: settings.api_list.as_deref(),
            builtin: DEFAULT_API_PATTERNS,
            builtin_name: "built-in API pattern list",
        };
        ListMethod::new(
            Self::ID,
            source,
            &settings.ignore_evidence_types,
            MatchOptions {
                ignore_case: false,
                whole_words: true,
            },
        )
    }

    pub fn construct(settings: &MethodSettings) -> Result<Box<dyn Method>> {
        Ok(Box::new(Self::new(settings)?))
    }
}
