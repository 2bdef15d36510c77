//! The `{...}` attribute block language.
//!
//! An attribute block rides on the flag tail of a directive (or on the end of
//! a replacement) and describes formatting and structural requests for the
//! matched range: `{b u fg=red h=2 break=page}`. Tokens are split on
//! whitespace with quoting, and every token must be a known flag, negated
//! flag, reset marker, or `key=value` pair — anything else is a parse error.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::address::TableRef;
use crate::error::Error;

/// Boolean text toggles carried by an attribute set or an inline span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleKind {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Superscript,
    Subscript,
    SmallCaps,
}

impl ToggleKind {
    const ALL: [ToggleKind; 8] = [
        ToggleKind::Bold,
        ToggleKind::Italic,
        ToggleKind::Underline,
        ToggleKind::Strike,
        ToggleKind::Code,
        ToggleKind::Superscript,
        ToggleKind::Subscript,
        ToggleKind::SmallCaps,
    ];

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "b" | "bold" => Some(Self::Bold),
            "i" | "italic" => Some(Self::Italic),
            "u" | "underline" => Some(Self::Underline),
            "st" | "strike" => Some(Self::Strike),
            "code" => Some(Self::Code),
            "sup" => Some(Self::Superscript),
            "sub" => Some(Self::Subscript),
            "sc" | "smallcaps" => Some(Self::SmallCaps),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Page,
    Column,
    Section,
    Rule,
}

/// Formatting scoped to a sub-range of one replacement's text.
///
/// The parser records the literal text and flags; `start`/`end` are filled in
/// by the operation compiler once the expanded replacement exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSpan {
    pub text: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    pub flags: Vec<ToggleKind>,
}

/// The parsed form of one `{...}` block.
///
/// Boolean toggles are tri-state: `None` is unset, `Some(true)` enabled,
/// `Some(false)` explicitly disabled. The distinction matters because an
/// attribute set implicitly resets formatting on its target range, and an
/// explicit `!flag` must survive as "disabled" rather than decaying to unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttributeSet {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strike: Option<bool>,
    pub code: Option<bool>,
    pub superscript: Option<bool>,
    pub subscript: Option<bool>,
    pub small_caps: Option<bool>,

    pub text: Option<String>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub font: Option<String>,
    pub size: Option<f64>,
    pub link: Option<String>,
    pub heading: Option<u8>,
    pub alignment: Option<Alignment>,
    pub indent: Option<u8>,
    pub line_spacing: Option<f64>,
    pub paragraph_spacing: Option<(f64, f64)>,
    pub effect: Option<String>,
    pub columns: Option<u32>,
    pub break_kind: Option<BreakKind>,
    pub comment: Option<String>,
    pub bookmark: Option<String>,
    pub checkbox: Option<bool>,
    pub toc_depth: Option<u8>,
    pub image: Option<String>,
    pub table: Option<TableRef>,
    pub person: Option<String>,

    pub reset: bool,
    pub no_implicit_reset: bool,
}

impl AttributeSet {
    /// Parse the content between the outermost braces of one block.
    #[tracing::instrument(level = "trace")]
    pub fn parse(content: &str) -> Result<(Self, Vec<InlineSpan>), Error> {
        let mut set = Self::default();
        let mut spans = Vec::new();

        for token in tokenize(content) {
            set.apply_token(&token, &mut spans)?;
        }
        Ok((set, spans))
    }

    fn apply_token(&mut self, token: &str, spans: &mut Vec<InlineSpan>) -> Result<(), Error> {
        if token == "0" {
            self.reset = true;
            return Ok(());
        }
        if token == "!0" {
            self.no_implicit_reset = true;
            return Ok(());
        }
        if let Some(negated) = token.strip_prefix('!') {
            let Some(kind) = ToggleKind::from_token(negated) else {
                return Err(Error::UnknownAttribute(token.to_string()));
            };
            self.set_toggle(kind, false);
            return Ok(());
        }
        if let Some((key, value)) = token.split_once('=') {
            let value = unquote(value);
            // An inline-scoped boolean: `sub=2` both enables the toggle and
            // names the replacement sub-string it covers.
            if let Some(kind) = ToggleKind::from_token(key) {
                spans.push(InlineSpan {
                    text: value,
                    start: 0,
                    end: 0,
                    flags: vec![kind],
                });
                return Ok(());
            }
            return self.apply_value(key, &value);
        }
        let Some(kind) = ToggleKind::from_token(token) else {
            return Err(Error::UnknownAttribute(token.to_string()));
        };
        self.set_toggle(kind, true);
        Ok(())
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let invalid = || Error::InvalidAttributeValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "text" => self.text = Some(value.to_string()),
            "fg" | "color" => self.foreground = Some(resolve_color(value)),
            "bg" => self.background = Some(resolve_color(value)),
            "font" => self.font = Some(value.to_string()),
            "size" => self.size = Some(value.parse().map_err(|_| invalid())?),
            "link" | "url" => self.link = Some(value.to_string()),
            "h" | "heading" => {
                let level: u8 = value.parse().map_err(|_| invalid())?;
                if level > 6 {
                    return Err(invalid());
                }
                self.heading = Some(level);
            }
            "align" => {
                self.alignment = Some(match value {
                    "left" => Alignment::Left,
                    "center" => Alignment::Center,
                    "right" => Alignment::Right,
                    "justify" => Alignment::Justify,
                    _ => return Err(invalid()),
                });
            }
            "indent" => self.indent = Some(value.parse().map_err(|_| invalid())?),
            "ls" => self.line_spacing = Some(value.parse().map_err(|_| invalid())?),
            "ps" => self.paragraph_spacing = Some(parse_spacing(value).ok_or_else(invalid)?),
            "effect" => self.effect = Some(value.to_string()),
            "cols" => self.columns = Some(value.parse().map_err(|_| invalid())?),
            "break" => {
                self.break_kind = Some(match value {
                    "page" => BreakKind::Page,
                    "column" => BreakKind::Column,
                    "section" => BreakKind::Section,
                    "rule" => BreakKind::Rule,
                    _ => return Err(invalid()),
                });
            }
            "comment" => self.comment = Some(value.to_string()),
            "bookmark" => self.bookmark = Some(value.to_string()),
            "checkbox" => {
                self.checkbox = Some(match value {
                    "checked" => true,
                    "unchecked" => false,
                    _ => return Err(invalid()),
                });
            }
            "toc" => self.toc_depth = Some(value.parse().map_err(|_| invalid())?),
            "img" => self.image = Some(value.to_string()),
            "T" => {
                self.table =
                    Some(crate::address::parse_table_ref(value).ok_or_else(invalid)?);
            }
            "person" => self.person = Some(value.to_string()),
            _ => return Err(Error::UnknownAttribute(format!("{key}={value}"))),
        }
        Ok(())
    }

    pub fn set_toggle(&mut self, kind: ToggleKind, on: bool) {
        let slot = match kind {
            ToggleKind::Bold => &mut self.bold,
            ToggleKind::Italic => &mut self.italic,
            ToggleKind::Underline => &mut self.underline,
            ToggleKind::Strike => &mut self.strike,
            ToggleKind::Code => &mut self.code,
            ToggleKind::Superscript => &mut self.superscript,
            ToggleKind::Subscript => &mut self.subscript,
            ToggleKind::SmallCaps => &mut self.small_caps,
        };
        *slot = Some(on);
    }

    #[must_use]
    pub fn toggle(&self, kind: ToggleKind) -> Option<bool> {
        match kind {
            ToggleKind::Bold => self.bold,
            ToggleKind::Italic => self.italic,
            ToggleKind::Underline => self.underline,
            ToggleKind::Strike => self.strike,
            ToggleKind::Code => self.code,
            ToggleKind::Superscript => self.superscript,
            ToggleKind::Subscript => self.subscript,
            ToggleKind::SmallCaps => self.small_caps,
        }
    }

    /// Whether any character-level formatting is requested.
    #[must_use]
    pub fn has_text_format(&self) -> bool {
        ToggleKind::ALL.iter().any(|k| self.toggle(*k).is_some())
            || self.foreground.is_some()
            || self.background.is_some()
            || self.font.is_some()
            || self.size.is_some()
            || self.link.is_some()
            || self.effect.is_some()
            || self.reset
    }

    /// Whether any paragraph-level formatting is requested.
    #[must_use]
    pub fn has_paragraph_format(&self) -> bool {
        self.heading.is_some()
            || self.alignment.is_some()
            || self.indent.is_some()
            || self.line_spacing.is_some()
            || self.paragraph_spacing.is_some()
    }

    /// Whether the set carries a request that needs its own structural phase
    /// (columns, checkbox conversion, bookmark, person chip).
    #[must_use]
    pub fn has_structural_request(&self) -> bool {
        self.columns.is_some()
            || self.checkbox.is_some()
            || self.bookmark.is_some()
            || self.person.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge another block into this one; the other block's values win.
    pub fn merge(&mut self, other: Self) {
        macro_rules! take {
            ($($field:ident),+ $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })+
            };
        }
        take!(
            bold, italic, underline, strike, code, superscript, subscript, small_caps, text,
            foreground, background, font, size, link, heading, alignment, indent, line_spacing,
            paragraph_spacing, effect, columns, break_kind, comment, bookmark, checkbox, toc_depth,
            image, table, person,
        );
        self.reset |= other.reset;
        self.no_implicit_reset |= other.no_implicit_reset;
    }
}

/// Split block content on whitespace, keeping quoted values intact and
/// unescaping `\{` / `\}`.
fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if matches!(chars.peek(), Some(&('{' | '}'))) => {
                if let Some(brace) = chars.next() {
                    current.push(brace);
                }
            }
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

fn parse_spacing(value: &str) -> Option<(f64, f64)> {
    match value.split_once(',') {
        Some((above, below)) => Some((above.parse().ok()?, below.parse().ok()?)),
        None => {
            let both: f64 = value.parse().ok()?;
            Some((both, both))
        }
    }
}

static NAMED_COLORS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = FxHashMap::default();
    m.insert("black", "#000000");
    m.insert("white", "#ffffff");
    m.insert("red", "#ff0000");
    m.insert("green", "#00ff00");
    m.insert("blue", "#0000ff");
    m.insert("yellow", "#ffff00");
    m.insert("cyan", "#00ffff");
    m.insert("magenta", "#ff00ff");
    m.insert("gray", "#808080");
    m.insert("grey", "#808080");
    m.insert("orange", "#ffa500");
    m.insert("purple", "#800080");
    m.insert("brown", "#a52a2a");
    m.insert("pink", "#ffc0cb");
    m.insert("darkred", "#8b0000");
    m.insert("darkgreen", "#006400");
    m.insert("darkblue", "#00008b");
    m.insert("lightgray", "#d3d3d3");
    m.insert("lightgrey", "#d3d3d3");
    m
});

/// Resolve a named color to hex; unrecognized names and hex values pass
/// through unchanged.
#[must_use]
pub fn resolve_color(value: &str) -> String {
    NAMED_COLORS
        .get(value.to_ascii_lowercase().as_str())
        .map_or_else(|| value.to_string(), |hex| (*hex).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_flags_enable() {
        let (set, spans) = AttributeSet::parse("b u").unwrap();
        assert_eq!(set.bold, Some(true));
        assert_eq!(set.underline, Some(true));
        assert_eq!(set.italic, None);
        assert!(spans.is_empty());
    }

    #[test]
    fn negated_flag_disables_without_collapsing_to_unset() {
        let (set, _) = AttributeSet::parse("!b i").unwrap();
        assert_eq!(set.toggle(ToggleKind::Bold), Some(false));
        assert_eq!(set.toggle(ToggleKind::Italic), Some(true));
        assert_eq!(set.toggle(ToggleKind::Strike), None);
    }

    #[test]
    fn reset_markers() {
        let (set, _) = AttributeSet::parse("0").unwrap();
        assert!(set.reset);
        assert!(!set.no_implicit_reset);

        let (set, _) = AttributeSet::parse("!0").unwrap();
        assert!(set.no_implicit_reset);
    }

    #[test]
    fn named_color_resolves_to_hex() {
        let (set, _) = AttributeSet::parse("fg=red bg=#123abc").unwrap();
        assert_eq!(set.foreground.as_deref(), Some("#ff0000"));
        assert_eq!(set.background.as_deref(), Some("#123abc"));
    }

    #[test]
    fn unrecognized_color_passes_through() {
        let (set, _) = AttributeSet::parse("fg=chartreuse-ish").unwrap();
        assert_eq!(set.foreground.as_deref(), Some("chartreuse-ish"));
    }

    #[test]
    fn inline_scoped_boolean_becomes_span() {
        let (set, spans) = AttributeSet::parse("sub=2").unwrap();
        assert!(set.toggle(ToggleKind::Subscript).is_none());
        assert_eq!(
            spans,
            vec![InlineSpan {
                text: "2".to_string(),
                start: 0,
                end: 0,
                flags: vec![ToggleKind::Subscript],
            }]
        );
    }

    #[test]
    fn quoted_value_keeps_spaces() {
        let (set, _) = AttributeSet::parse(r#"font="Fira Sans" size=11.5"#).unwrap();
        assert_eq!(set.font.as_deref(), Some("Fira Sans"));
        assert_eq!(set.size, Some(11.5));
    }

    #[test]
    fn paragraph_spacing_single_and_pair() {
        let (set, _) = AttributeSet::parse("ps=6").unwrap();
        assert_eq!(set.paragraph_spacing, Some((6.0, 6.0)));

        let (set, _) = AttributeSet::parse("ps=6,12").unwrap();
        assert_eq!(set.paragraph_spacing, Some((6.0, 12.0)));
    }

    #[test]
    fn unknown_token_is_an_error() {
        let err = AttributeSet::parse("b wobble").unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(t) if t == "wobble"));
    }

    #[test]
    fn heading_out_of_range_rejected() {
        assert!(AttributeSet::parse("h=7").is_err());
        let (set, _) = AttributeSet::parse("h=3").unwrap();
        assert_eq!(set.heading, Some(3));
    }

    #[test]
    fn structural_and_paragraph_classification() {
        let (set, _) = AttributeSet::parse("h=1 align=center").unwrap();
        assert!(set.has_paragraph_format());
        assert!(!set.has_structural_request());

        let (set, _) = AttributeSet::parse("cols=2 bookmark=intro").unwrap();
        assert!(set.has_structural_request());
        assert!(!set.has_text_format());
    }

    #[test]
    fn merge_prefers_later_values() {
        let (mut a, _) = AttributeSet::parse("b fg=red").unwrap();
        let (b, _) = AttributeSet::parse("!b fg=blue h=2").unwrap();
        a.merge(b);
        assert_eq!(a.bold, Some(false));
        assert_eq!(a.foreground.as_deref(), Some("#0000ff"));
        assert_eq!(a.heading, Some(2));
    }

    #[test]
    fn escaped_braces_are_literal_in_values() {
        let (set, _) = AttributeSet::parse(r"comment=\{note\}").unwrap();
        assert_eq!(set.comment.as_deref(), Some("{note}"));
    }

    proptest::proptest! {
        // Whatever order flags and negations arrive in, a toggle is exactly
        // one of unset / enabled / disabled, with the last token winning;
        // "disabled" must never decay into "unset".
        #[test]
        fn toggles_preserve_tristate(
            tokens in proptest::collection::vec(
                proptest::prelude::prop_oneof![
                    proptest::prelude::Just("b"),
                    proptest::prelude::Just("!b"),
                    proptest::prelude::Just("i"),
                    proptest::prelude::Just("!i"),
                    proptest::prelude::Just("u"),
                ],
                0..8,
            ),
        ) {
            let content = tokens.join(" ");
            let (set, _) = AttributeSet::parse(&content).unwrap();
            let last = |on: &str, off: &str| {
                tokens.iter().rev().find_map(|t| {
                    if *t == on {
                        Some(true)
                    } else if *t == off {
                        Some(false)
                    } else {
                        None
                    }
                })
            };
            proptest::prop_assert_eq!(set.bold, last("b", "!b"));
            proptest::prop_assert_eq!(set.italic, last("i", "!i"));
            proptest::prop_assert_eq!(set.underline, last("u", "!u"));
        }
    }
}
