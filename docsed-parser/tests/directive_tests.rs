//! End-to-end directive parsing: full expressions the way users write them,
//! exercising every layer of the front end at once.

use docsed_parser::{
    Axis, CellTarget, DirectiveKind, TableRef, TagKind, ToggleKind, parse, parse_program, render,
};
use pretty_assertions::assert_eq;

#[test]
fn substitute_with_markdown_and_attributes() {
    let d = parse("s/status: (\\w+)/**$1**/g{u fg=darkred}").unwrap();
    assert_eq!(d.kind, DirectiveKind::Substitute);
    assert!(d.global);

    let attrs = d.attributes.as_ref().unwrap();
    assert_eq!(attrs.toggle(ToggleKind::Underline), Some(true));
    assert_eq!(attrs.foreground.as_deref(), Some("#8b0000"));

    // The markdown layer only sees the template's expansion.
    let caps = d.pattern.captures("status: live").unwrap();
    let expanded = d.template.expand(&caps);
    assert_eq!(expanded, "**live**");
    let rendered = render(&expanded);
    assert_eq!(rendered.text, "live");
    assert_eq!(rendered.tags[0].kind, TagKind::Bold);
}

#[test]
fn full_cell_directive() {
    let d = parse("s/|3|[*,2]:\\$\\d+/redacted/g").unwrap();
    let cell = d.cell.as_ref().unwrap();
    assert_eq!(cell.table, TableRef::Nth(3));
    assert_eq!(
        cell.target,
        CellTarget::Cell {
            row: Axis::Wildcard,
            col: Axis::Specific(2),
        }
    );
    assert_eq!(cell.subpattern.as_deref(), Some("\\$\\d+"));
    assert_eq!(d.pattern.as_str(), "\\$\\d+");
}

#[test]
fn heading_replacement_parses_to_paragraph_tag() {
    let d = parse("s/^Overview$/# Overview/m").unwrap();
    let rendered = render(&d.template.as_literal().unwrap());
    assert_eq!(rendered.text, "Overview");
    assert_eq!(rendered.tags[0].kind, TagKind::Heading(1));
}

#[test]
fn footnote_replacement() {
    let d = parse("s/\\[citation needed\\]/^[see RFC 2119]/").unwrap();
    let rendered = render(&d.template.as_literal().unwrap());
    assert!(rendered.is_footnote());
    assert_eq!(rendered.text, "see RFC 2119");
}

#[test]
fn case_insensitive_matching() {
    let d = parse("s/warning/note/i").unwrap();
    assert!(d.pattern.is_match("WARNING"));
    assert!(d.pattern.is_match("Warning"));
}

#[test]
fn nth_match_with_attribute_block_digits() {
    // The `3` is the nth-match; the block's `h=2` digit is not.
    let d = parse("s/chapter/Chapter/3{h=2}").unwrap();
    assert_eq!(d.nth_match, Some(3));
    assert_eq!(d.attributes.as_ref().unwrap().heading, Some(2));
}

#[test]
fn program_with_mixed_directives() {
    let program = "\
# normalize terminology
s/e-mail/email/g
y/\u{201c}\u{201d}/\"\"/
d/DRAFT ONLY/
";
    let parsed = parse_program(program);
    assert_eq!(parsed.directives.len(), 3);
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.directives[0].kind, DirectiveKind::Substitute);
    assert_eq!(parsed.directives[1].kind, DirectiveKind::Transliterate);
    assert_eq!(parsed.directives[2].kind, DirectiveKind::Delete);
}

#[test]
fn errors_carry_advice() {
    let err = parse("q/a/b/").unwrap_err();
    assert!(err.advice().is_some());
}
