//! Replacement templates.
//!
//! A replacement string is compiled once into a small AST of segments rather
//! than being rewritten through placeholder substitution. `\1`/`$1` become
//! [`Segment::Backreference`], a bare `&` becomes [`Segment::WholeMatch`],
//! and the escaped forms `\$`, `\&` and `\\` stay literal. Any other escape
//! sequence (e.g. `\*`) is kept verbatim so the markdown replacement parser
//! can interpret it later.

use regex::Captures;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Backreference(usize),
    WholeMatch,
}

/// A compiled replacement template, evaluated once per match.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.peek().copied() {
                    Some(d) if d.is_ascii_digit() => {
                        chars.next();
                        flush(&mut segments, &mut literal);
                        segments.push(Segment::Backreference(digit_value(d)));
                    }
                    Some('&') => {
                        chars.next();
                        literal.push('&');
                    }
                    Some('$') => {
                        chars.next();
                        literal.push('$');
                    }
                    Some('\\') => {
                        chars.next();
                        literal.push('\\');
                        literal.push('\\');
                    }
                    // Unknown escapes pass through untouched; the markdown
                    // layer owns sequences like \* and \n.
                    Some(other) => {
                        chars.next();
                        literal.push('\\');
                        literal.push(other);
                    }
                    None => literal.push('\\'),
                },
                '$' => match chars.peek().copied() {
                    Some(d) if d.is_ascii_digit() => {
                        chars.next();
                        flush(&mut segments, &mut literal);
                        segments.push(Segment::Backreference(digit_value(d)));
                    }
                    _ => literal.push('$'),
                },
                '&' => {
                    flush(&mut segments, &mut literal);
                    segments.push(Segment::WholeMatch);
                }
                other => literal.push(other),
            }
        }
        flush(&mut segments, &mut literal);

        Self { segments }
    }

    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Build a template that expands to the given text verbatim.
    #[must_use]
    pub fn literal(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Literal(text.to_string())],
        }
    }

    /// Evaluate the template against one set of captures.
    ///
    /// A backreference to a group that did not participate in the match
    /// expands to the empty string, matching sed behaviour.
    #[must_use]
    pub fn expand(&self, caps: &Captures) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Backreference(n) => {
                    if let Some(group) = caps.get(*n) {
                        out.push_str(group.as_str());
                    }
                }
                Segment::WholeMatch => {
                    if let Some(whole) = caps.get(0) {
                        out.push_str(whole.as_str());
                    }
                }
            }
        }
        out
    }

    /// Evaluate the template when only the whole-match text is available
    /// (no capture groups, e.g. whole-cell or image matches). Group
    /// backreferences expand empty.
    #[must_use]
    pub fn expand_whole(&self, whole: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Backreference(_) => {}
                Segment::WholeMatch => out.push_str(whole),
            }
        }
        out
    }

    /// The template's text if it contains no backreferences.
    #[must_use]
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Backreference(_) | Segment::WholeMatch => return None,
            }
        }
        Some(out)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn flush(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn digit_value(d: char) -> usize {
    d.to_digit(10).map_or(0, |v| v as usize)
}
