use serde::Serialize;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("empty directive")]
    EmptyDirective,

    #[error("unknown directive command: {0:?}")]
    UnknownCommand(char),

    #[error("delimiter after {command:?} must not be alphanumeric: {found:?}")]
    InvalidDelimiter { command: char, found: char },

    #[error("directive is missing its closing delimiter: {0}")]
    MissingDelimiter(String),

    #[error("directive has an empty {field} field: {directive}")]
    EmptyField {
        field: &'static str,
        directive: String,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("unknown flag {flag:?} in directive: {directive}")]
    UnknownFlag { flag: char, directive: String },

    #[error("transliterate sets differ in length: {from} source vs {to} destination characters")]
    TransliterateLength { from: usize, to: usize },

    #[error("unknown attribute token: {0:?}")]
    UnknownAttribute(String),

    #[error("invalid value {value:?} for attribute {key:?}")]
    InvalidAttributeValue { key: String, value: String },

    #[error("unterminated attribute block: {0}")]
    UnterminatedAttributeBlock(String),

    #[error("invalid address: {0}")]
    Address(String),
}

impl Error {
    /// Get advice for this error if available.
    ///
    /// Returns helpful information for resolving the error.
    #[must_use]
    pub fn advice(&self) -> Option<&'static str> {
        match self {
            Self::UnknownCommand(_) => {
                Some("Directives start with one of: s (substitute), d (delete), a (append), i (insert), y (transliterate)")
            }
            Self::MissingDelimiter(_) => Some(
                "Every field of a directive must be closed by the delimiter chosen after the command letter, e.g. s/pattern/replacement/flags",
            ),
            Self::TransliterateLength { .. } => {
                Some("y/src/dst/ maps characters one-to-one, so src and dst must have the same length")
            }
            Self::UnknownAttribute(_) => Some(
                "Attribute blocks take boolean flags (b, i, u, st, code, sup, sub, sc), negations (!flag), reset (0), or key=value pairs",
            ),
            Self::EmptyDirective
            | Self::InvalidDelimiter { .. }
            | Self::EmptyField { .. }
            | Self::Pattern(_)
            | Self::UnknownFlag { .. }
            | Self::InvalidAttributeValue { .. }
            | Self::UnterminatedAttributeBlock(_)
            | Self::Address(_) => None,
        }
    }
}

/// A parse failure tied to the line it came from, for multi-directive programs.
#[derive(Debug, Serialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}
