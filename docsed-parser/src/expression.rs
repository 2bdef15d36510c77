//! The directive expression parser.
//!
//! One directive is a command letter, a delimiter of the author's choosing,
//! and delimiter-separated fields: `s/pattern/replacement/flags`. The flag
//! tail may end in an attribute block; the pattern may open with an address
//! (`|2|[A1]`, `!(1)`, `{T=2}`); the replacement may end in an attribute
//! block of its own. All of that is resolved here, once, into a [`Directive`].

use regex::Regex;

use crate::address::{self, PatternAddress};
use crate::attributes::{AttributeSet, InlineSpan};
use crate::directive::{Directive, DirectiveKind, Transliteration};
use crate::error::{Error, LineError};
use crate::template::{Segment, Template};

/// The result of parsing a multi-line expression program.
///
/// A malformed line aborts only itself; well-formed siblings still parse.
#[derive(Debug, Default)]
pub struct ProgramParse {
    pub directives: Vec<Directive>,
    pub errors: Vec<LineError>,
}

/// Parse a newline-separated expression list, skipping blank lines and `#`
/// comments.
#[tracing::instrument(level = "debug", skip(input))]
#[must_use]
pub fn parse_program(input: &str) -> ProgramParse {
    let mut parsed = ProgramParse::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse(line) {
            Ok(directive) => parsed.directives.push(directive),
            Err(error) => {
                tracing::warn!(line = index + 1, %error, "skipping malformed directive");
                parsed.errors.push(LineError {
                    line: index + 1,
                    message: error.to_string(),
                });
            }
        }
    }
    parsed
}

/// Parse one directive string.
#[tracing::instrument(level = "debug")]
pub fn parse(input: &str) -> Result<Directive, Error> {
    let raw = input.trim();
    let mut chars = raw.chars();
    let command = chars.next().ok_or(Error::EmptyDirective)?;
    let kind = match command {
        's' => DirectiveKind::Substitute,
        'd' => DirectiveKind::Delete,
        'a' => DirectiveKind::Append,
        'i' => DirectiveKind::Insert,
        'y' => DirectiveKind::Transliterate,
        other => return Err(Error::UnknownCommand(other)),
    };
    let delimiter = chars
        .next()
        .ok_or_else(|| Error::MissingDelimiter(raw.to_string()))?;
    if delimiter.is_alphanumeric() || delimiter == '\\' {
        return Err(Error::InvalidDelimiter {
            command,
            found: delimiter,
        });
    }

    let field_count = match kind {
        DirectiveKind::Delete => 1,
        DirectiveKind::Substitute
        | DirectiveKind::Append
        | DirectiveKind::Insert
        | DirectiveKind::Transliterate => 2,
    };
    let (fields, tail) = split_fields(chars.as_str(), delimiter, field_count)
        .ok_or_else(|| Error::MissingDelimiter(raw.to_string()))?;

    let mut fields = fields.into_iter();
    let raw_pattern = fields.next().unwrap_or_default();
    let second_field = fields.next();

    if raw_pattern.is_empty() {
        return Err(Error::EmptyField {
            field: "pattern",
            directive: raw.to_string(),
        });
    }

    if kind == DirectiveKind::Transliterate {
        return parse_transliterate(raw, &raw_pattern, second_field.as_deref(), &tail);
    }

    let flags = parse_flag_tail(&tail, raw)?;

    // The replacement may end in an attribute block of its own; the flag
    // tail's block is merged over it afterwards, later values winning.
    let mut attributes: Option<AttributeSet> = None;
    let mut spans: Vec<InlineSpan> = Vec::new();
    let replacement_body = match second_field {
        Some(replacement) => {
            // An image-insertion literal owns its trailing `{width=...}`
            // block; everything else may end in an attribute block.
            if address::parse_image_literal(&replacement).is_some() {
                replacement
            } else {
                let (body, block) = extract_trailing_block(&replacement)?;
                if let Some(content) = block {
                    let (set, mut block_spans) = AttributeSet::parse(&content)?;
                    attributes = Some(set);
                    spans.append(&mut block_spans);
                }
                body
            }
        }
        None => String::new(),
    };
    if let Some((set, mut flag_spans)) = flags.attributes {
        match attributes.as_mut() {
            Some(existing) => existing.merge(set),
            None => attributes = Some(set),
        }
        spans.append(&mut flag_spans);
    }

    if matches!(kind, DirectiveKind::Append | DirectiveKind::Insert) && replacement_body.is_empty()
    {
        return Err(Error::EmptyField {
            field: "text",
            directive: raw.to_string(),
        });
    }

    // Pattern-side addressing: `{T=...}` / `{img=...}` prefixes, or a whole
    // pattern that is itself a table/cell/image address.
    let mut table = None;
    let mut cell = None;
    let mut image = None;
    let mut effective_pattern = raw_pattern.clone();
    if let Some((content, rest)) = leading_block(&raw_pattern) {
        if let Some(value) = content.strip_prefix("T=") {
            match parse_table_value(value) {
                Some(PatternAddress::Table(t)) => table = Some(t),
                Some(PatternAddress::Cell(c)) => cell = Some(c),
                Some(PatternAddress::Image(_)) | None => {
                    return Err(Error::Address(content.clone()));
                }
            }
            effective_pattern = rest;
        } else if let Some(value) = content.strip_prefix("img=") {
            image = Some(parse_image_value(value).ok_or_else(|| Error::Address(content.clone()))?);
            effective_pattern = rest;
        }
    } else if let Some(addr) = address::parse_pattern_address(&raw_pattern) {
        match addr {
            PatternAddress::Table(t) => {
                table = Some(t);
                effective_pattern = String::new();
            }
            PatternAddress::Cell(c) => {
                effective_pattern = c.subpattern.clone().unwrap_or_default();
                cell = Some(c);
            }
            PatternAddress::Image(i) => {
                image = Some(i);
                effective_pattern = String::new();
            }
        }
    }

    // A `T=` value attribute in a block can scope the directive to a table
    // when the pattern itself did not.
    if table.is_none()
        && cell.is_none()
        && let Some(t) = attributes.as_ref().and_then(|a| a.table)
    {
        table = Some(t);
    }

    let multiline = flags.multiline || kind == DirectiveKind::Delete;
    let mut source = String::new();
    if flags.case_insensitive {
        source.push_str("(?i)");
    }
    if multiline {
        source.push_str("(?m)");
    }
    match kind {
        // A delete matches the whole line its pattern falls on, trailing
        // newline included.
        DirectiveKind::Delete if !effective_pattern.is_empty() => {
            source.push_str("^.*(?:");
            source.push_str(&effective_pattern);
            source.push_str(").*\n?");
        }
        DirectiveKind::Delete
        | DirectiveKind::Substitute
        | DirectiveKind::Append
        | DirectiveKind::Insert
        | DirectiveKind::Transliterate => source.push_str(&effective_pattern),
    }
    let pattern = Regex::new(&source)?;

    let template = match kind {
        DirectiveKind::Substitute => Template::parse(&replacement_body),
        DirectiveKind::Delete | DirectiveKind::Transliterate => Template::default(),
        DirectiveKind::Append => {
            let mut segments = vec![Segment::WholeMatch];
            segments.extend(Template::parse(&replacement_body).segments().to_vec());
            Template::from_segments(segments)
        }
        DirectiveKind::Insert => {
            let mut segments = Template::parse(&replacement_body).segments().to_vec();
            segments.push(Segment::WholeMatch);
            Template::from_segments(segments)
        }
    };

    Ok(Directive {
        kind,
        pattern,
        raw_pattern,
        template,
        global: flags.global,
        nth_match: flags.nth_match,
        table,
        cell,
        image,
        attributes,
        spans,
        transliteration: None,
        raw: raw.to_string(),
    })
}

fn parse_transliterate(
    raw: &str,
    from: &str,
    to: Option<&str>,
    tail: &str,
) -> Result<Directive, Error> {
    let to = to.ok_or_else(|| Error::MissingDelimiter(raw.to_string()))?;
    if to.is_empty() {
        return Err(Error::EmptyField {
            field: "destination",
            directive: raw.to_string(),
        });
    }
    let flags = parse_flag_tail(tail, raw)?;
    let transliteration = Transliteration::new(from, to)?;
    let pattern = Regex::new(&transliteration.pattern_source())?;
    Ok(Directive {
        kind: DirectiveKind::Transliterate,
        pattern,
        raw_pattern: from.to_string(),
        template: Template::default(),
        // Transliteration is inherently global: every source-set character
        // maps, wherever it appears.
        global: true,
        nth_match: None,
        table: None,
        cell: None,
        image: None,
        attributes: None,
        spans: Vec::new(),
        transliteration: Some(transliteration),
        raw: raw.to_string(),
    })
}

/// Split `body` into `count` delimiter-terminated fields plus the raw tail.
///
/// A backslash escapes the delimiter (the backslash is dropped); every other
/// escape sequence is preserved for downstream layers. Returns `None` when
/// fewer than `count` unescaped delimiters exist.
fn split_fields(body: &str, delimiter: char, count: usize) -> Option<(Vec<String>, String)> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();

    while fields.len() < count {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(escaped) if escaped == delimiter => current.push(delimiter),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => return None,
            },
            Some(ch) if ch == delimiter => fields.push(std::mem::take(&mut current)),
            Some(ch) => current.push(ch),
            None => return None,
        }
    }
    Some((fields, chars.as_str().to_string()))
}

struct Flags {
    global: bool,
    case_insensitive: bool,
    multiline: bool,
    nth_match: Option<u32>,
    attributes: Option<(AttributeSet, Vec<InlineSpan>)>,
}

/// Scan the flag tail: `g`/`i`/`m`, an nth-match integer, and optional
/// attribute blocks. Digits inside a block belong to the block, not the
/// nth-match count.
fn parse_flag_tail(tail: &str, raw: &str) -> Result<Flags, Error> {
    let mut flags = Flags {
        global: false,
        case_insensitive: false,
        multiline: false,
        nth_match: None,
        attributes: None,
    };

    let chars: Vec<char> = tail.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars.get(i).copied() {
            Some('{') => {
                let (content, next) = consume_block(&chars, i)
                    .ok_or_else(|| Error::UnterminatedAttributeBlock(raw.to_string()))?;
                let (set, spans) = AttributeSet::parse(&content)?;
                match flags.attributes.as_mut() {
                    Some((existing, existing_spans)) => {
                        existing.merge(set);
                        existing_spans.extend(spans);
                    }
                    None => flags.attributes = Some((set, spans)),
                }
                i = next;
            }
            Some('g') => {
                flags.global = true;
                i += 1;
            }
            Some('i') => {
                flags.case_insensitive = true;
                i += 1;
            }
            Some('m') => {
                flags.multiline = true;
                i += 1;
            }
            Some(d) if d.is_ascii_digit() => {
                let digit = d.to_digit(10).unwrap_or(0);
                flags.nth_match = Some(flags.nth_match.unwrap_or(0) * 10 + digit);
                i += 1;
            }
            Some(ws) if ws.is_whitespace() => i += 1,
            Some(other) => {
                return Err(Error::UnknownFlag {
                    flag: other,
                    directive: raw.to_string(),
                });
            }
            None => break,
        }
    }
    Ok(flags)
}

/// Consume a brace block starting at `start` (which must be `{`), honoring
/// nesting and `\{`/`\}` escapes. Returns the content (escapes intact) and
/// the index just past the closing brace.
fn consume_block(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut content = String::new();
    let mut depth = 1usize;
    let mut i = start + 1;
    while let Some(ch) = chars.get(i).copied() {
        match ch {
            '\\' if matches!(chars.get(i + 1), Some(&('{' | '}'))) => {
                content.push('\\');
                if let Some(brace) = chars.get(i + 1) {
                    content.push(*brace);
                }
                i += 2;
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((content, i + 1));
                }
            }
            _ => {}
        }
        content.push(ch);
        i += 1;
    }
    None
}

/// If the string ends with an unescaped balanced `{...}` block, split it off.
fn extract_trailing_block(s: &str) -> Result<(String, Option<String>), Error> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut last_block: Option<(usize, String, usize)> = None;
    while i < chars.len() {
        match chars.get(i).copied() {
            Some('\\') => i += 2,
            Some('{') => {
                let Some((content, next)) = consume_block(&chars, i) else {
                    return Err(Error::UnterminatedAttributeBlock(s.to_string()));
                };
                last_block = Some((i, content, next));
                i = next;
            }
            Some(_) => i += 1,
            None => break,
        }
    }
    match last_block {
        Some((start, content, end)) if end == chars.len() => {
            let before: String = chars.iter().take(start).collect();
            Ok((before, Some(content)))
        }
        _ => Ok((s.to_string(), None)),
    }
}

/// If the string starts with an unescaped `{...}` block, split it off.
fn leading_block(s: &str) -> Option<(String, String)> {
    if !s.starts_with('{') {
        return None;
    }
    let chars: Vec<char> = s.chars().collect();
    let (content, next) = consume_block(&chars, 0)?;
    let rest: String = chars.iter().skip(next).collect();
    Some((content, rest))
}

/// `{T=...}` values: a table reference (`2`, `-1`, `*`) or a table-plus-cell
/// form (`2[A1]`).
fn parse_table_value(value: &str) -> Option<PatternAddress> {
    if let Some(bracket) = value.find('[') {
        let (table, target) = value.split_at(bracket);
        return address::parse_cell_address(&format!("|{table}|{target}"))
            .map(PatternAddress::Cell);
    }
    address::parse_table_ref(value).map(PatternAddress::Table)
}

/// `{img=...}` values: positional forms with or without parentheses, or an
/// alt-text regex.
fn parse_image_value(value: &str) -> Option<address::ImageAddress> {
    if value.starts_with('(') || value.starts_with('[') {
        return address::parse_image_address(&format!("!{value}"));
    }
    if value == "*" {
        return Some(address::ImageAddress::All);
    }
    if let Some(negated) = value.strip_prefix('-') {
        return negated.parse().ok().map(address::ImageAddress::FromEnd);
    }
    if let Ok(n) = value.parse() {
        return Some(address::ImageAddress::Nth(n));
    }
    Some(address::ImageAddress::AltPattern(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Axis, CellTarget, ImageAddress, TableRef};
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_substitute() {
        let d = parse("s/old/new/").unwrap();
        assert_eq!(d.kind, DirectiveKind::Substitute);
        assert_eq!(d.pattern.as_str(), "old");
        assert_eq!(d.template.as_literal().unwrap(), "new");
        assert!(!d.global);
        assert!(d.bounded_to_first());
    }

    #[test]
    fn flags_parse_and_prefix_the_pattern() {
        let d = parse("s/old/new/gim").unwrap();
        assert!(d.global);
        assert_eq!(d.pattern.as_str(), "(?i)(?m)old");
    }

    #[test]
    fn alternate_delimiter_with_escapes() {
        let d = parse(r"s#a\#b#c#").unwrap();
        assert_eq!(d.pattern.as_str(), "a#b");
        assert_eq!(d.template.as_literal().unwrap(), "c");
    }

    #[test]
    fn escaped_delimiter_in_replacement() {
        let d = parse(r"s/x/a\/b/").unwrap();
        assert_eq!(d.template.as_literal().unwrap(), "a/b");
    }

    #[test]
    fn missing_closing_delimiter_is_an_error() {
        let err = parse("s/a/b").unwrap_err();
        assert!(matches!(err, Error::MissingDelimiter(_)));
    }

    #[test]
    fn empty_pattern_is_an_error() {
        let err = parse("s//x/").unwrap_err();
        assert!(matches!(err, Error::EmptyField { field: "pattern", .. }));
    }

    #[test]
    fn nth_match_from_flag_tail() {
        let d = parse("s/a/b/2").unwrap();
        assert_eq!(d.nth_match, Some(2));
        let d = parse("s/a/b/12").unwrap();
        assert_eq!(d.nth_match, Some(12));
    }

    #[test]
    fn digits_inside_attribute_block_are_not_nth_match() {
        let d = parse("s/a/b/2{h=3 size=14}").unwrap();
        assert_eq!(d.nth_match, Some(2));
        let attrs = d.attributes.unwrap();
        assert_eq!(attrs.heading, Some(3));
        assert_eq!(attrs.size, Some(14.0));
    }

    #[test]
    fn unknown_flag_rejected() {
        let err = parse("s/a/b/q").unwrap_err();
        assert!(matches!(err, Error::UnknownFlag { flag: 'q', .. }));
    }

    #[test]
    fn replacement_trailing_attribute_block() {
        let d = parse("s/a/b{b fg=red}/").unwrap();
        assert_eq!(d.template.as_literal().unwrap(), "b");
        let attrs = d.attributes.unwrap();
        assert_eq!(attrs.bold, Some(true));
        assert_eq!(attrs.foreground.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn flag_tail_block_wins_over_replacement_block() {
        let d = parse("s/a/b{fg=red}/{fg=blue}").unwrap();
        let attrs = d.attributes.unwrap();
        assert_eq!(attrs.foreground.as_deref(), Some("#0000ff"));
    }

    #[test]
    fn image_literal_replacement_keeps_its_dimensions() {
        let d = parse("s#a#![x](https://e.com/i.png){width=100 height=50}#").unwrap();
        assert!(d.attributes.is_none());
        let spec = address::parse_image_literal(&d.template.as_literal().unwrap()).unwrap();
        assert_eq!(spec.width, Some(100.0));
    }

    #[test]
    fn pattern_side_cell_address() {
        let d = parse("s/|2|[A1]/value/").unwrap();
        let cell = d.cell.unwrap();
        assert_eq!(cell.table, TableRef::Nth(2));
        assert_eq!(
            cell.target,
            CellTarget::Cell {
                row: Axis::Specific(1),
                col: Axis::Specific(1),
            }
        );
        assert_eq!(d.pattern.as_str(), "");
    }

    #[test]
    fn pattern_side_cell_address_with_subpattern() {
        let d = parse(r"s/|1|[2,2]:v\d+/new/").unwrap();
        assert_eq!(d.pattern.as_str(), r"v\d+");
        assert!(d.cell.is_some());
    }

    #[test]
    fn bare_table_pattern() {
        let d = parse("d/|2|/").unwrap();
        assert_eq!(d.table, Some(TableRef::Nth(2)));
    }

    #[test]
    fn brace_prefixed_table_addressing() {
        let d = parse("s/{T=2}total/sum/").unwrap();
        assert_eq!(d.table, Some(TableRef::Nth(2)));
        assert_eq!(d.pattern.as_str(), "total");
    }

    #[test]
    fn brace_prefixed_image_addressing() {
        let d = parse("s#{img=-1}#![n](https://e.com/n.png)#").unwrap();
        assert_eq!(d.image, Some(ImageAddress::FromEnd(1)));
    }

    #[test]
    fn image_pattern_address() {
        let d = parse("d/!(2)/").unwrap();
        assert_eq!(d.image, Some(ImageAddress::Nth(2)));
    }

    #[test]
    fn delete_lowers_to_line_pattern() {
        let d = parse("d/gone/").unwrap();
        assert_eq!(d.kind, DirectiveKind::Delete);
        assert_eq!(d.pattern.as_str(), "(?m)^.*(?:gone).*\n?");
        assert!(d.template.is_empty());
    }

    #[test]
    fn append_and_insert_wrap_the_whole_match() {
        let d = parse("a/host/:8080/").unwrap();
        assert_eq!(
            d.template.segments(),
            &[
                Segment::WholeMatch,
                Segment::Literal(":8080".to_string()),
            ]
        );

        let d = parse("i/host/www./").unwrap();
        assert_eq!(
            d.template.segments(),
            &[
                Segment::Literal("www.".to_string()),
                Segment::WholeMatch,
            ]
        );
    }

    #[test]
    fn transliterate_directive() {
        let d = parse("y/abc/xyz/").unwrap();
        assert_eq!(d.kind, DirectiveKind::Transliterate);
        assert!(d.global);
        let t = d.transliteration.unwrap();
        assert_eq!(t.apply("cabbage"), "zxyyxge");
    }

    #[test]
    fn transliterate_length_mismatch() {
        let err = parse("y/ab/xyz/").unwrap_err();
        assert!(matches!(err, Error::TransliterateLength { .. }));
    }

    #[test]
    fn invalid_regex_surfaces_as_pattern_error() {
        let err = parse("s/a(/b/").unwrap_err();
        assert!(matches!(err, Error::Pattern(_)));
    }

    #[test]
    fn program_parsing_skips_comments_and_collects_errors() {
        let program = "# a comment\ns/a/b/\n\ns/bad(/x/\nd/gone/";
        let parsed = parse_program(program);
        assert_eq!(parsed.directives.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 4);
    }

    #[test]
    fn inline_span_from_flag_tail() {
        let d = parse("s/H2O/H2O/{sub=2}").unwrap();
        assert_eq!(d.spans.len(), 1);
        assert_eq!(d.spans[0].text, "2");
    }
}
