//! Parser for the `docsed` directive language.
//!
//! A directive is a compact, sed-inspired edit expression:
//!
//! ```text
//! s/pattern/replacement/flags
//! d/pattern/flags
//! a/pattern/text/flags
//! i/pattern/text/flags
//! y/src/dst/
//! ```
//!
//! Replacements speak a markdown-flavored mini-language (`**bold**`,
//! `# heading`, `- item`, `^[footnote]`), patterns and flag tails can carry
//! table/cell/image addresses (`|2|[A1]`, `!(-1)`) and `{...}` attribute
//! blocks (`{b fg=red h=2}`). Parsing is entirely offline: nothing here
//! touches a document or the network. The sibling engine crate consumes the
//! [`Directive`] values produced here.

mod address;
mod attributes;
mod directive;
mod error;
mod expression;
mod markdown;
mod template;

pub use address::{
    Axis, CellAddress, CellTarget, ImageAddress, ImageSpec, PatternAddress, StructuralOp,
    TableAxis, TableRef, TableSpec, parse_cell_address, parse_image_address, parse_image_literal,
    parse_pattern_address, parse_table_pattern, parse_table_ref, parse_table_spec,
};
pub use attributes::{AttributeSet, Alignment, BreakKind, InlineSpan, ToggleKind, resolve_color};
pub use directive::{Directive, DirectiveKind, Transliteration};
pub use error::{Error, LineError};
pub use expression::{ProgramParse, parse, parse_program};
pub use markdown::{FormatTag, Rendered, TagKind, render};
pub use template::{Segment, Template};

/// Compile a pattern that is known-good at authoring time.
#[allow(clippy::unwrap_used)]
pub(crate) fn static_regex(source: &str) -> regex::Regex {
    regex::Regex::new(source).unwrap()
}
