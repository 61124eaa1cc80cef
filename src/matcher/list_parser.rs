// src/matcher/list_parser.rs

//! Reader for the INI-like keyword list format
//!
//! ```text
//! # comment
//! [{"evidence_type": "generic", "language": "all"}]
//! "encrypt"
//! "\bDES\b"
//!
//! [keyword_list_version]
//! 3.0
//! ```
//!
//! Section headers are kept verbatim; interpreting them as JSON is the job of
//! the keyword table. Each non-header line is one value: the text before an
//! optional `=` delimiter, trimmed.

use crate::error::{Error, Result};
use std::collections::HashSet;

/// One `[header]` block and the values listed under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Line number of the header (1-based)
    pub line: usize,
    pub values: Vec<String>,
}

/// Split keyword list text into sections
///
/// `origin` only decorates error messages (usually the file path).
pub fn parse_sections(text: &str, origin: &str) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_values: HashSet<String> = HashSet::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
            let name = line[1..line.len() - 1].to_string();
            if !seen_names.insert(name.clone()) {
                return Err(Error::InvalidKeywordList(format!(
                    "In {}, line {}: duplicate section [{}]",
                    origin, line_number, name
                )));
            }
            seen_values.clear();
            sections.push(Section {
                name,
                line: line_number,
                values: Vec::new(),
            });
            continue;
        }

        let value = match line.split_once('=') {
            Some((key, _)) => key.trim(),
            None => line,
        };

        let Some(section) = sections.last_mut() else {
            return Err(Error::InvalidKeywordList(format!(
                "In {}, line {}: value '{}' appears before any section header",
                origin, line_number, value
            )));
        };

        if !seen_values.insert(value.to_string()) {
            return Err(Error::InvalidKeywordList(format!(
                "In {}, section [{}], line {}: duplicate value {}",
                origin, section.name, line_number, value
            )));
        }
        section.values.push(value.to_string());
    }

    Ok(sections)
}
