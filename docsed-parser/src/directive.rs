use regex::Regex;

use crate::address::{CellAddress, ImageAddress, TableRef};
use crate::attributes::{AttributeSet, InlineSpan};
use crate::error::Error;
use crate::template::Template;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Substitute,
    Delete,
    Append,
    Insert,
    Transliterate,
}

/// A one-to-one character mapping for `y/src/dst/` directives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transliteration {
    from: Vec<char>,
    to: Vec<char>,
}

impl Transliteration {
    pub fn new(from: &str, to: &str) -> Result<Self, Error> {
        let from: Vec<char> = unescape_set(from);
        let to: Vec<char> = unescape_set(to);
        if from.len() != to.len() {
            return Err(Error::TransliterateLength {
                from: from.len(),
                to: to.len(),
            });
        }
        Ok(Self { from, to })
    }

    #[must_use]
    pub fn map_char(&self, ch: char) -> char {
        self.from
            .iter()
            .position(|c| *c == ch)
            .and_then(|i| self.to.get(i).copied())
            .unwrap_or(ch)
    }

    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        text.chars().map(|c| self.map_char(c)).collect()
    }

    /// A pattern matching any single character of the source set.
    #[must_use]
    pub fn pattern_source(&self) -> String {
        let alternatives: Vec<String> = self
            .from
            .iter()
            .map(|c| regex::escape(&c.to_string()))
            .collect();
        format!("(?:{})", alternatives.join("|"))
    }
}

fn unescape_set(set: &str) -> Vec<char> {
    let mut out = Vec::new();
    let mut chars = set.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek().copied() {
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some(other) => {
                    chars.next();
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// One parsed edit directive. Built once by the expression parser and never
/// mutated afterwards.
#[derive(Clone, Debug)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// The compiled pattern, including any `(?i)`/`(?m)` prefixes.
    pub pattern: Regex,
    /// The pattern as written, before flag prefixes and address stripping.
    pub raw_pattern: String,
    pub template: Template,
    pub global: bool,
    pub nth_match: Option<u32>,
    pub table: Option<TableRef>,
    pub cell: Option<CellAddress>,
    pub image: Option<ImageAddress>,
    pub attributes: Option<AttributeSet>,
    pub spans: Vec<InlineSpan>,
    pub transliteration: Option<Transliteration>,
    /// The directive as written, for error reporting.
    pub raw: String,
}

impl Directive {
    /// Whether nth-match selection or an explicit global flag widens the
    /// match set beyond the default single match.
    #[must_use]
    pub fn bounded_to_first(&self) -> bool {
        !self.global && self.nth_match.is_none()
    }
}
