// src/methods/common.rs

//! Shared plumbing for methods that search with a pattern list

use crate::error::Result;
use crate::language::Language;
use crate::matcher::{KeywordTable, MatchEngine, MatchOptions, MatchRecord};
use crate::methods::Method;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Where a method's pattern list comes from
pub(crate) struct ListSource<'a> {
    /// File replacing the built-in list
    pub path: Option<&'a Path>,
    pub builtin: &'static str,
    pub builtin_name: &'static str,
}

/// Method backed by a pattern list
///
/// Scans every text file. Records are labelled with the id the method was
/// built under.
pub struct ListMethod {
    method_id: &'static str,
    engine: MatchEngine,
}

impl ListMethod {
    pub(crate) fn new(
        method_id: &'static str,
        source: ListSource<'_>,
        ignore: &HashSet<String>,
        options: MatchOptions,
    ) -> Result<Self> {
        let table = load_table(&source, ignore)?;
        info!(
            "Method {}: list version {}, {} patterns",
            method_id,
            table.version(),
            table.len()
        );

        Ok(Self {
            method_id,
            engine: MatchEngine::new(Arc::new(table), options)?,
        })
    }

    pub fn options(&self) -> MatchOptions {
        self.engine.options()
    }
}

impl Method for ListMethod {
    fn id(&self) -> &'static str {
        self.method_id
    }

    fn supports_scanning_file(&self, language: Language) -> bool {
        language.is_text()
    }

    fn search(&self, content: &str, language: Language) -> Result<Vec<MatchRecord>> {
        let mut matches = self.engine.search(content, language)?;
        for record in &mut matches {
            record.detection_method = self.method_id.to_string();
        }
        Ok(matches)
    }

    fn quick_search(&self, content: &str, language: Language) -> bool {
        self.engine.quick_search(content, language)
    }

    fn keyword_list_version(&self) -> Option<&str> {
        Some(self.engine.table().version())
    }
}

/// Load a pattern list from its file, or from the built-in text
fn load_table(source: &ListSource<'_>, ignore: &HashSet<String>) -> Result<KeywordTable> {
    match source.path {
        Some(path) => KeywordTable::load(path, ignore),
        None => KeywordTable::parse(source.builtin, source.builtin_name, ignore),
    }
}
