//! The markdown-flavored replacement mini-language.
//!
//! Replacement strings may carry lightweight formatting: `**bold**`,
//! `# headings`, `- list items`, fenced code, `^[footnotes]`, and so on.
//! Rendering strips the markup and returns the plain text together with an
//! ordered list of format tags, each tag covering a character range of the
//! plain text. Escaped delimiters (`\*`, `\#`, ...) are neutralized into
//! private-use placeholders before any pattern detection and restored after,
//! so literal formatting characters are never misinterpreted as markup.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagKind {
    Bold,
    Italic,
    Strike,
    Code,
    Link(String),
    Heading(u8),
    Bullet(u8),
    Numbered(u8),
    Quote,
    CodeBlock(Option<String>),
    HorizontalRule,
    Footnote,
}

impl TagKind {
    /// Tags that translate to character-level text styling.
    #[must_use]
    pub fn is_text_level(&self) -> bool {
        matches!(
            self,
            Self::Bold | Self::Italic | Self::Strike | Self::Code | Self::Link(_)
        )
    }

    /// Tags that translate to paragraph-level styling or list membership.
    #[must_use]
    pub fn is_paragraph_level(&self) -> bool {
        matches!(
            self,
            Self::Heading(_)
                | Self::Bullet(_)
                | Self::Numbered(_)
                | Self::Quote
                | Self::CodeBlock(_)
        )
    }
}

/// One format tag over a character range of the rendered plain text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatTag {
    pub kind: TagKind,
    pub start: usize,
    pub end: usize,
}

/// The result of rendering one replacement string.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rendered {
    pub text: String,
    pub tags: Vec<FormatTag>,
}

impl Rendered {
    /// Whether the replacement is a footnote marker.
    #[must_use]
    pub fn is_footnote(&self) -> bool {
        self.tags.iter().any(|t| t.kind == TagKind::Footnote)
    }

    #[must_use]
    pub fn has_formatting(&self) -> bool {
        !self.tags.is_empty()
    }
}

// Escape sequences and their single-character placeholders. Placeholders are
// private-use codepoints that cannot appear in well-formed input.
const ESCAPES: [(char, char); 7] = [
    ('*', '\u{e000}'),
    ('#', '\u{e001}'),
    ('~', '\u{e002}'),
    ('`', '\u{e003}'),
    ('-', '\u{e004}'),
    ('+', '\u{e005}'),
    ('\\', '\u{e006}'),
];

fn neutralize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some(escaped) => {
                if let Some((_, placeholder)) =
                    ESCAPES.iter().find(|(plain, _)| *plain == escaped)
                {
                    chars.next();
                    out.push(*placeholder);
                } else {
                    out.push('\\');
                }
            }
            None => out.push('\\'),
        }
    }
    out
}

fn restore(text: &str) -> String {
    text.chars()
        .map(|ch| {
            ESCAPES
                .iter()
                .find(|(_, placeholder)| *placeholder == ch)
                .map_or(ch, |(plain, _)| *plain)
        })
        .collect()
}

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| crate::static_regex(r"(?s)^```([^\n`]*)\n(.*?)\n?```$"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| crate::static_regex(r"^((?:  )*)(?:([-*+])|(\d+\.))[ \t]+(.*)$"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"^(#{1,6})[ \t]+(.*)$"));
static FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"(?s)^\^\[(.+)\]$"));

struct InlinePattern {
    regex: &'static LazyLock<Regex>,
    build: fn(&regex::Captures) -> (String, Vec<TagKind>),
}

static BOLD_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| crate::static_regex(r"\*\*\*([^*]+)\*\*\*"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"\*\*([^*]+)\*\*"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"\*([^*]+)\*"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"~~([^~]+)~~"));
static CODE: LazyLock<Regex> = LazyLock::new(|| crate::static_regex(r"`([^`]+)`"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| crate::static_regex(r#"\[([^\]]+)\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#));

fn content_only(caps: &regex::Captures) -> String {
    caps.get(1).map_or_else(String::new, |m| m.as_str().to_string())
}

// Priority order: longer delimiters first so `***` is never consumed as `**`
// plus a stray `*`.
static INLINE_PATTERNS: [InlinePattern; 6] = [
    InlinePattern {
        regex: &BOLD_ITALIC,
        build: |caps| (content_only(caps), vec![TagKind::Bold, TagKind::Italic]),
    },
    InlinePattern {
        regex: &BOLD,
        build: |caps| (content_only(caps), vec![TagKind::Bold]),
    },
    InlinePattern {
        regex: &ITALIC,
        build: |caps| (content_only(caps), vec![TagKind::Italic]),
    },
    InlinePattern {
        regex: &STRIKE,
        build: |caps| (content_only(caps), vec![TagKind::Strike]),
    },
    InlinePattern {
        regex: &CODE,
        build: |caps| (content_only(caps), vec![TagKind::Code]),
    },
    InlinePattern {
        regex: &LINK,
        build: |caps| {
            let url = caps.get(2).map_or_else(String::new, |m| m.as_str().to_string());
            (content_only(caps), vec![TagKind::Link(restore(&url))])
        },
    },
];

/// Render a replacement string to plain text plus format tags.
///
/// Rendering never fails; text that matches no markup form passes through
/// unchanged with an empty tag list.
#[tracing::instrument(level = "trace")]
#[must_use]
pub fn render(input: &str) -> Rendered {
    let work = neutralize(input);

    if let Some(rendered) = render_whole(&work) {
        return rendered;
    }

    let mut text = String::new();
    let mut tags = Vec::new();
    let mut offset = 0usize;

    // split (not lines): a trailing newline must survive into the output.
    let lines: Vec<&str> = work.split('\n').collect();
    let line_count = lines.len();
    for (i, line) in lines.into_iter().enumerate() {
        let (content, line_tag) = split_line_prefix(line);
        let (inline_text, inline_tags) = render_inline(&content);

        let line_start = offset;
        let line_len = inline_text.chars().count();
        for tag in inline_tags {
            tags.push(FormatTag {
                kind: tag.kind,
                start: tag.start + line_start,
                end: tag.end + line_start,
            });
        }
        if let Some(kind) = line_tag {
            tags.push(FormatTag {
                kind,
                start: line_start,
                end: line_start + line_len,
            });
        }

        text.push_str(&inline_text);
        offset += line_len;
        if i + 1 < line_count {
            text.push('\n');
            offset += 1;
        }
    }

    Rendered {
        text: restore(&text),
        tags,
    }
}

/// Forms that consume the entire replacement: horizontal rules, fenced code
/// blocks, footnote markers.
fn render_whole(work: &str) -> Option<Rendered> {
    let trimmed = work.trim();
    if matches!(trimmed, "---" | "***" | "___") {
        return Some(Rendered {
            text: String::new(),
            tags: vec![FormatTag {
                kind: TagKind::HorizontalRule,
                start: 0,
                end: 0,
            }],
        });
    }
    if let Some(caps) = FENCE.captures(trimmed) {
        let lang = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|l| !l.is_empty())
            .map(ToString::to_string);
        let body = restore(caps.get(2).map_or("", |m| m.as_str()));
        let len = body.chars().count();
        return Some(Rendered {
            text: body,
            tags: vec![FormatTag {
                kind: TagKind::CodeBlock(lang),
                start: 0,
                end: len,
            }],
        });
    }
    if let Some(caps) = FOOTNOTE.captures(trimmed) {
        let body = restore(caps.get(1).map_or("", |m| m.as_str()));
        let len = body.chars().count();
        return Some(Rendered {
            text: body,
            tags: vec![FormatTag {
                kind: TagKind::Footnote,
                start: 0,
                end: len,
            }],
        });
    }
    None
}

/// Strip a block-level line prefix, returning the remaining content and the
/// tag it implies. List indentation (2 spaces per level) converts to leading
/// tabs so nested levels survive into the inserted text.
fn split_line_prefix(line: &str) -> (String, Option<TagKind>) {
    if let Some(quoted) = line.strip_prefix("> ") {
        return (quoted.to_string(), Some(TagKind::Quote));
    }
    if let Some(caps) = LIST_ITEM.captures(line) {
        let indent = caps.get(1).map_or(0, |m| m.as_str().len());
        let level = u8::try_from(indent / 2).unwrap_or(u8::MAX);
        let body = caps.get(4).map_or("", |m| m.as_str());
        let mut content = "\t".repeat(usize::from(level));
        content.push_str(body);
        let kind = if caps.get(2).is_some() {
            TagKind::Bullet(level)
        } else {
            TagKind::Numbered(level)
        };
        return (content, Some(kind));
    }
    if let Some(caps) = HEADING.captures(line) {
        let level = caps.get(1).map_or(1, |m| m.as_str().len());
        let body = caps.get(2).map_or("", |m| m.as_str());
        return (
            body.to_string(),
            Some(TagKind::Heading(u8::try_from(level).unwrap_or(6))),
        );
    }
    (line.to_string(), None)
}

/// Strip paired inline delimiters left to right, recording a tag per span.
fn render_inline(line: &str) -> (String, Vec<FormatTag>) {
    let mut work = line.to_string();
    let mut tags = Vec::new();

    loop {
        let mut earliest: Option<(usize, &InlinePattern)> = None;
        for pattern in &INLINE_PATTERNS {
            if let Some(m) = pattern.regex.find(&work) {
                let better = earliest.is_none_or(|(start, _)| m.start() < start);
                if better {
                    earliest = Some((m.start(), pattern));
                }
            }
        }
        let Some((_, pattern)) = earliest else { break };
        let Some((range, content, kinds)) = pattern.regex.captures(&work).map(|caps| {
            let range = caps.get(0).map_or(0..0, |whole| whole.range());
            let (content, kinds) = (pattern.build)(&caps);
            (range, content, kinds)
        }) else {
            break;
        };
        if range.is_empty() {
            break;
        }

        let start_char = char_offset(&work, range.start);
        let content_len = content.chars().count();
        for kind in kinds {
            tags.push(FormatTag {
                kind,
                start: start_char,
                end: start_char + content_len,
            });
        }
        work.replace_range(range, &content);
    }

    (work, tags)
}

fn char_offset(s: &str, byte: usize) -> usize {
    s.get(..byte).map_or(0, |prefix| prefix.chars().count())
}
