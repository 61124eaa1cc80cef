// src/matcher/mod.rs

//! Keyword lists and the search engine built on them

mod engine;
mod keywords;
mod list_parser;

pub use engine::{CONTEXT_LINES, MatchEngine, MatchOptions, MatchRecord};
pub use keywords::{BOUNDARY_MARKER, EvidenceSpec, KeywordEntry, KeywordTable, VERSION_SECTION};
pub use list_parser::{Section, parse_sections};
