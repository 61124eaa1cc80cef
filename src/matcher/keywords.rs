// src/matcher/keywords.rs

//! Keyword tables
//!
//! A keyword table is built once from a keyword list and is read-only
//! afterwards. Every section of the list is an evidence specification (a JSON
//! object) followed by the keywords that produce that kind of evidence.
//!
//! Keywords registered under the synthetic `all` and `source` languages are
//! copied into every concrete language group at load time, so a lookup at
//! search time only ever touches one group.

use crate::error::{Error, Result};
use crate::language::Language;
use crate::matcher::list_parser::{Section, parse_sections};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Name of the section carrying the keyword list version
pub const VERSION_SECTION: &str = "keyword_list_version";

/// Marker a keyword literal may contain to request a word boundary
pub const BOUNDARY_MARKER: &str = "\\b";

/// What a keyword is evidence of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceSpec {
    pub evidence_type: String,
    pub language: Language,
    /// Every other key of the section header, copied into each match
    pub extra_fields: BTreeMap<String, String>,
}

impl EvidenceSpec {
    /// Build a spec from a section header
    fn from_header(header: &str, origin: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(header).map_err(|e| {
            Error::InvalidKeywordList(format!(
                "In {}, section [{}]: invalid JSON string: {}",
                origin, header, e
            ))
        })?;

        let Value::Object(map) = value else {
            return Err(Error::InvalidKeywordList(format!(
                "In {}, section [{}]: section header must be a JSON object",
                origin, header
            )));
        };

        let mut evidence_type = None;
        let mut language = Language::PlainText;
        let mut extra_fields = BTreeMap::new();

        for (key, value) in map {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            match key.as_str() {
                "evidence_type" => evidence_type = Some(text),
                "language" => {
                    language = Language::parse(&text)
                        .ok()
                        .filter(|lang| lang.is_text())
                        .ok_or_else(|| {
                            let valid: Vec<&str> =
                                Language::keyword_groups().iter().map(|l| l.as_str()).collect();
                            Error::InvalidKeywordList(format!(
                                "In {}, section [{}]: invalid language '{}', must be one of {:?}",
                                origin, header, text, valid
                            ))
                        })?;
                }
                _ => {
                    extra_fields.insert(key, text);
                }
            }
        }

        let evidence_type = evidence_type.ok_or_else(|| {
            Error::InvalidKeywordList(format!(
                "In {}, section [{}]: missing key 'evidence_type'",
                origin, header
            ))
        })?;

        Ok(Self {
            evidence_type,
            language,
            extra_fields,
        })
    }
}

/// A single keyword and the evidence it produces
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    /// Keyword as written in the list, quotes removed, markers kept
    pub raw_text: String,
    /// Keyword with boundary markers stripped; the text a match consists of
    pub literal: String,
    /// Regex source: the escaped literal with `\b` at each marker
    pub pattern: String,
    pub spec: Arc<EvidenceSpec>,
}

impl KeywordEntry {
    fn new(raw_text: String, spec: Arc<EvidenceSpec>) -> Self {
        let pieces: Vec<&str> = raw_text.split(BOUNDARY_MARKER).collect();
        let literal = pieces.concat();
        let pattern = pieces
            .iter()
            .map(|piece| regex::escape(piece))
            .collect::<Vec<_>>()
            .join(r"\b");

        Self {
            raw_text,
            literal,
            pattern,
            spec,
        }
    }

    /// Ordering key: longer keywords first, then reverse alphabetical
    fn priority(&self) -> (usize, String) {
        (self.literal.chars().count(), self.literal.to_lowercase())
    }
}

/// Per-language keyword groups loaded from a keyword list
#[derive(Debug, Clone)]
pub struct KeywordTable {
    version: String,
    groups: HashMap<Language, Vec<Arc<KeywordEntry>>>,
    /// Lower-cased literal to evidence
    index: HashMap<String, Arc<EvidenceSpec>>,
    specs: Vec<Arc<EvidenceSpec>>,
}

impl KeywordTable {
    /// Load a keyword list file
    ///
    /// Sections whose evidence type is in `ignore` are skipped entirely.
    pub fn load(path: &Path, ignore: &HashSet<String>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidKeywordList(format!(
                "Failed to read keyword list {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&text, &path.display().to_string(), ignore)
    }

    /// Build a table from keyword list text
    pub fn parse(text: &str, origin: &str, ignore: &HashSet<String>) -> Result<Self> {
        let sections = parse_sections(text, origin)?;

        let mut version = None;
        let mut groups: HashMap<Language, Vec<Arc<KeywordEntry>>> = Language::keyword_groups()
            .iter()
            .map(|lang| (*lang, Vec::new()))
            .collect();
        let mut index = HashMap::new();
        let mut specs = Vec::new();

        for section in &sections {
            if section.name == VERSION_SECTION {
                version = Some(Self::read_version(section, origin)?);
                continue;
            }

            let spec = Arc::new(EvidenceSpec::from_header(&section.name, origin)?);
            if ignore.contains(&spec.evidence_type) {
                debug!(
                    "Skipping section [{}]: evidence type {} is ignored",
                    section.name, spec.evidence_type
                );
                continue;
            }

            for value in &section.values {
                let entry = Arc::new(KeywordEntry::new(
                    Self::unquote(value, section, origin)?,
                    Arc::clone(&spec),
                ));

                if entry.literal.is_empty() {
                    return Err(Error::InvalidKeywordList(format!(
                        "In {}, section [{}]: empty keyword {}",
                        origin, section.name, value
                    )));
                }

                let key = entry.literal.to_lowercase();
                if index.contains_key(&key) {
                    return Err(Error::InvalidKeywordList(format!(
                        "In {}, section [{}]: keyword {} is already registered \
                         (keywords are compared case-insensitively)",
                        origin, section.name, value
                    )));
                }
                index.insert(key, Arc::clone(&spec));

                for lang in Self::target_groups(spec.language) {
                    if let Some(group) = groups.get_mut(&lang) {
                        group.push(Arc::clone(&entry));
                    }
                }
            }

            specs.push(spec);
        }

        let version = version.ok_or_else(|| {
            Error::InvalidKeywordList(format!(
                "In {}: missing [{}] section",
                origin, VERSION_SECTION
            ))
        })?;

        for group in groups.values_mut() {
            group.sort_by(|a, b| b.priority().cmp(&a.priority()));
        }

        debug!(
            "Loaded keyword list {} version {} ({} keywords, {} evidence specs)",
            origin,
            version,
            index.len(),
            specs.len()
        );

        Ok(Self {
            version,
            groups,
            index,
            specs,
        })
    }

    /// Groups that receive keywords registered under `language`
    fn target_groups(language: Language) -> Vec<Language> {
        match language {
            Language::PlainText => Language::keyword_groups().to_vec(),
            Language::Source => {
                let mut langs = vec![Language::Source];
                langs.extend_from_slice(Language::source_languages());
                langs
            }
            other => vec![other],
        }
    }

    fn unquote(value: &str, section: &Section, origin: &str) -> Result<String> {
        if value.len() < 2 || !value.starts_with('"') || !value.ends_with('"') {
            return Err(Error::InvalidKeywordList(format!(
                "In {}, section [{}]: invalid keyword {}; keywords must begin and end with a quote",
                origin, section.name, value
            )));
        }
        Ok(value[1..value.len() - 1].to_string())
    }

    fn read_version(section: &Section, origin: &str) -> Result<String> {
        match section.values.as_slice() {
            [value] => Ok(value.trim_matches('"').to_string()),
            values => Err(Error::InvalidKeywordList(format!(
                "In {}: section [{}] must contain exactly one value, found {}",
                origin,
                VERSION_SECTION,
                values.len()
            ))),
        }
    }

    /// Keyword list version identifier
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Keywords that apply to `language`, highest priority first
    pub fn keywords(&self, language: Language) -> &[Arc<KeywordEntry>] {
        self.groups
            .get(&language)
            .map(|group| group.as_slice())
            .unwrap_or(&[])
    }

    /// Evidence for a matched keyword, compared case-insensitively
    pub fn lookup(&self, matched_text: &str) -> Option<&Arc<EvidenceSpec>> {
        self.index.get(&matched_text.to_lowercase())
    }

    /// Number of distinct keywords
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All evidence specifications, in list order
    pub fn specs(&self) -> &[Arc<EvidenceSpec>] {
        &self.specs
    }
}
