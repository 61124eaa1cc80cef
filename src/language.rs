// src/language.rs

//! Language tags for scanned files
//!
//! A language decides which keyword group a file is matched against. Two tags
//! are synthetic: `all` (plain text, and keywords that apply everywhere) and
//! `source` (keywords that apply to every source code language).

use crate::error::{Error, Result};
use encoding_rs::WINDOWS_1252;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported file languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    /// Plain text; also the tag for keywords applying to every language
    PlainText,
    /// Keywords applying to every source code language
    Source,
    C,
    Python,
    Java,
    Shell,
    Perl,
    Javascript,
    Scala,
    Msdos,
    Haskell,
    Php,
    Patch,
    Pascal,
    /// Non-text content
    Binary,
    /// Not yet classified
    Unknown,
}

impl Language {
    /// Every text language that owns a keyword group
    pub fn keyword_groups() -> &'static [Language] {
        &[
            Self::PlainText,
            Self::Source,
            Self::C,
            Self::Python,
            Self::Java,
            Self::Shell,
            Self::Perl,
            Self::Javascript,
            Self::Scala,
            Self::Msdos,
            Self::Haskell,
            Self::Php,
            Self::Patch,
            Self::Pascal,
        ]
    }

    /// Concrete source code languages (excludes the synthetic tags)
    pub fn source_languages() -> &'static [Language] {
        &Self::keyword_groups()[2..]
    }

    /// Get the string representation used in keyword lists and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "all",
            Self::Source => "source",
            Self::C => "c",
            Self::Python => "python",
            Self::Java => "java",
            Self::Shell => "shell",
            Self::Perl => "perl",
            Self::Javascript => "javascript",
            Self::Scala => "scala",
            Self::Msdos => "msdos",
            Self::Haskell => "haskell",
            Self::Php => "php",
            Self::Patch => "patch",
            Self::Pascal => "pascal",
            Self::Binary => "binary",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a language tag
    pub fn parse(s: &str) -> Result<Self> {
        Self::keyword_groups()
            .iter()
            .chain([Self::Binary, Self::Unknown].iter())
            .copied()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| Error::InvalidLanguage(s.to_string()))
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, Self::Binary | Self::Unknown)
    }

    pub fn is_source_code(&self) -> bool {
        self.is_text() && !matches!(self, Self::PlainText | Self::Source)
    }

    /// Synthetic tags whose keywords propagate into other groups
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::PlainText | Self::Source)
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::PlainText => &["txt", "text", "xml", "html", "xsl", "xspf"],
            Self::C => &[
                "c", "cc", "cp", "cpp", "c++", "cxx", "h", "hh", "hxx", "hpp", "h++", "moc",
            ],
            Self::Python => &["py", "rpy", "pyt", "pyw", "pym", "re"],
            Self::Java => &["java", "jsp", "j"],
            Self::Shell => &["sh", "csh", "ksh", "run", "bsh", "bash"],
            Self::Perl => &["pl"],
            Self::Javascript => &["js", "javascript", "json"],
            Self::Scala => &["scala"],
            Self::Msdos => &["bat"],
            Self::Haskell => &["hs", "lhs"],
            Self::Php => &["php"],
            Self::Patch => &["patch"],
            Self::Pascal => &["p"],
            Self::Source | Self::Binary | Self::Unknown => &[],
        }
    }

    /// Guess the language from a file extension (case-insensitive)
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.to_ascii_lowercase();
        Self::keyword_groups()
            .iter()
            .copied()
            .find(|lang| lang.extensions().contains(&extension.as_str()))
            .unwrap_or(Self::Unknown)
    }

    /// Guess the language of a file and decode its content
    ///
    /// Known text extensions are decoded as text. Unknown extensions are
    /// decoded and checked for non-text control bytes; anything that fails
    /// either step is `Binary` and `None` is returned for the text.
    pub fn guess(path: &Path, bytes: &[u8]) -> (Self, Option<String>) {
        let language = path
            .extension()
            .map(|ext| Self::from_extension(&ext.to_string_lossy()))
            .unwrap_or(Self::Unknown);

        match language {
            Self::Unknown => {
                if has_nontext_bytes(bytes) {
                    (Self::Binary, None)
                } else {
                    (Self::PlainText, Some(decode_text(bytes)))
                }
            }
            _ => (language, Some(decode_text(bytes))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Decode file bytes as UTF-8, falling back to Windows-1252
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Bytes outside the text character set used by file(1)
///
/// Text is BEL, BS, TAB, LF, VT, FF, CR, ESC and everything from 0x20 up,
/// except DEL.
pub fn has_nontext_bytes(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| match b {
        7..=13 | 27 => false,
        0x7f => true,
        b => b < 0x20,
    })
}
