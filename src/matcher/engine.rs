// src/matcher/engine.rs

//! Keyword search over file content
//!
//! Searching is done in two passes. A cheap substring test drops every
//! keyword that does not occur in the content at all; only the survivors are
//! compiled into one alternation and scanned with a single regex pass. The
//! alternation keeps the table's priority order (longest keyword first), and
//! the regex engine takes the first alternative that matches at the leftmost
//! position, so a keyword that extends another always wins.
//!
//! Offsets in match records count characters, not bytes. Line numbers are
//! 1-based, every other offset is 0-based.

use crate::error::{Error, Result};
use crate::language::Language;
use crate::matcher::keywords::{BOUNDARY_MARKER, KeywordEntry, KeywordTable};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Lines of context captured on each side of a match
pub const CONTEXT_LINES: usize = 3;

/// Search behaviour, fixed per engine instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Compare keywords and content case-insensitively
    pub ignore_case: bool,
    /// Only match keywords that are not part of a larger identifier
    pub whole_words: bool,
}

/// One keyword occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub matched_text: String,
    pub line_text: String,
    pub line_number: usize,
    pub file_index_begin: usize,
    pub file_index_end: usize,
    pub line_index_begin: usize,
    pub line_index_end: usize,
    pub line_text_before_1: String,
    pub line_text_before_2: String,
    pub line_text_before_3: String,
    pub line_text_after_1: String,
    pub line_text_after_2: String,
    pub line_text_after_3: String,
    pub evidence_type: String,
    /// Id of the method that produced the match; set by the method
    pub detection_method: String,
    /// Extra keys of the evidence spec (never `language`)
    #[serde(flatten)]
    pub extra_fields: BTreeMap<String, String>,
}

/// A keyword prepared for searching
#[derive(Debug)]
struct CompiledKeyword {
    entry: Arc<KeywordEntry>,
    /// Text for the substring pre-filter (lower-cased when ignoring case)
    needle: String,
    /// Full regex form, including word boundaries
    pattern: String,
    regex: Regex,
}

/// Finds keyword occurrences in file content
#[derive(Debug)]
pub struct MatchEngine {
    table: Arc<KeywordTable>,
    options: MatchOptions,
    groups: HashMap<Language, Vec<Arc<CompiledKeyword>>>,
}

impl MatchEngine {
    /// Compile every keyword of `table` for the given options
    pub fn new(table: Arc<KeywordTable>, options: MatchOptions) -> Result<Self> {
        let mut compiled: HashMap<String, Arc<CompiledKeyword>> = HashMap::new();
        let mut groups = HashMap::new();

        for lang in Language::keyword_groups() {
            let mut group = Vec::new();
            for entry in table.keywords(*lang) {
                let keyword = match compiled.get(&entry.literal) {
                    Some(keyword) => Arc::clone(keyword),
                    None => {
                        let keyword = Arc::new(Self::compile_keyword(entry, options)?);
                        compiled.insert(entry.literal.clone(), Arc::clone(&keyword));
                        keyword
                    }
                };
                group.push(keyword);
            }
            groups.insert(*lang, group);
        }

        Ok(Self {
            table,
            options,
            groups,
        })
    }

    fn compile_keyword(entry: &Arc<KeywordEntry>, options: MatchOptions) -> Result<CompiledKeyword> {
        let pattern = Self::full_pattern(entry, options.whole_words);
        let regex = Self::build_regex(&pattern, options.ignore_case)?;
        let needle = if options.ignore_case {
            entry.literal.to_lowercase()
        } else {
            entry.literal.clone()
        };

        Ok(CompiledKeyword {
            entry: Arc::clone(entry),
            needle,
            pattern,
            regex,
        })
    }

    /// Wrap a keyword in word boundaries where its edges are word characters
    fn full_pattern(entry: &KeywordEntry, whole_words: bool) -> String {
        if !whole_words {
            return entry.pattern.clone();
        }

        let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        let mut pattern = String::with_capacity(entry.pattern.len() + 4);

        if is_word(entry.literal.chars().next()) && !entry.raw_text.starts_with(BOUNDARY_MARKER) {
            pattern.push_str(r"\b");
        }
        pattern.push_str(&entry.pattern);
        if is_word(entry.literal.chars().last()) && !entry.raw_text.ends_with(BOUNDARY_MARKER) {
            pattern.push_str(r"\b");
        }
        pattern
    }

    fn build_regex(pattern: &str, ignore_case: bool) -> Result<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| Error::InvalidRegex(format!("{}: {}", pattern, e)))
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Keywords of `language` whose text occurs somewhere in the content
    fn candidates<'a>(&'a self, content: &str, language: Language) -> Vec<&'a CompiledKeyword> {
        let Some(group) = self.groups.get(&language) else {
            return Vec::new();
        };

        let folded;
        let haystack = if self.options.ignore_case {
            folded = content.to_lowercase();
            folded.as_str()
        } else {
            content
        };

        group
            .iter()
            .filter(|keyword| haystack.contains(keyword.needle.as_str()))
            .map(|keyword| keyword.as_ref())
            .collect()
    }

    /// Find every keyword occurrence in `content`
    pub fn search(&self, content: &str, language: Language) -> Result<Vec<MatchRecord>> {
        let candidates = self.candidates(content, language);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let alternation = candidates
            .iter()
            .map(|keyword| format!("(?:{})", keyword.pattern))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Self::build_regex(&alternation, self.options.ignore_case)?;

        let lines: Vec<&str> = content.split('\n').collect();
        let mut locator = LineLocator::new(&lines);
        let mut records = Vec::new();

        for m in regex.find_iter(content) {
            if m.as_str().is_empty() {
                continue;
            }

            let Some(spec) = self.table.lookup(m.as_str()) else {
                warn!(
                    "Matched text '{}' does not map to a registered keyword",
                    m.as_str()
                );
                continue;
            };

            let position = locator.locate(content, m.start());
            let length = m.as_str().chars().count();
            let line = position.line;
            let context_before = |n: usize| {
                line.checked_sub(n)
                    .map(|i| lines[i].to_string())
                    .unwrap_or_default()
            };
            let context_after =
                |n: usize| lines.get(line + n).map(|l| l.to_string()).unwrap_or_default();

            records.push(MatchRecord {
                matched_text: m.as_str().to_string(),
                line_text: lines[line].to_string(),
                line_number: line + 1,
                file_index_begin: position.file_chars,
                file_index_end: position.file_chars + length,
                line_index_begin: position.line_chars,
                line_index_end: position.line_chars + length,
                line_text_before_1: context_before(1),
                line_text_before_2: context_before(2),
                line_text_before_3: context_before(CONTEXT_LINES),
                line_text_after_1: context_after(1),
                line_text_after_2: context_after(2),
                line_text_after_3: context_after(CONTEXT_LINES),
                evidence_type: spec.evidence_type.clone(),
                detection_method: String::new(),
                extra_fields: spec.extra_fields.clone(),
            });
        }

        Ok(records)
    }

    /// True if any keyword of `language` occurs in `content`
    pub fn quick_search(&self, content: &str, language: Language) -> bool {
        self.candidates(content, language)
            .iter()
            .any(|keyword| keyword.regex.is_match(content))
    }

    /// Keywords that would be searched for `language`, highest priority first
    pub fn keywords(&self, language: Language) -> impl Iterator<Item = &KeywordEntry> {
        self.groups
            .get(&language)
            .into_iter()
            .flatten()
            .map(|keyword| keyword.entry.as_ref())
    }
}

/// Position of a byte offset in line and character terms
struct Position {
    /// 0-based line index
    line: usize,
    /// Characters from the start of the file
    file_chars: usize,
    /// Characters from the start of the line
    line_chars: usize,
}

/// Maps ascending byte offsets to lines without rescanning earlier lines
struct LineLocator<'a> {
    lines: &'a [&'a str],
    line: usize,
    line_byte_start: usize,
    line_char_start: usize,
}

impl<'a> LineLocator<'a> {
    fn new(lines: &'a [&'a str]) -> Self {
        Self {
            lines,
            line: 0,
            line_byte_start: 0,
            line_char_start: 0,
        }
    }

    fn locate(&mut self, content: &str, byte_offset: usize) -> Position {
        while self.line + 1 < self.lines.len()
            && self.line_byte_start + self.lines[self.line].len() < byte_offset
        {
            let current = self.lines[self.line];
            self.line_byte_start += current.len() + 1;
            self.line_char_start += current.chars().count() + 1;
            self.line += 1;
        }

        let line_chars = content[self.line_byte_start..byte_offset].chars().count();
        Position {
            line: self.line,
            file_chars: self.line_char_start + line_chars,
            line_chars,
        }
    }
}
