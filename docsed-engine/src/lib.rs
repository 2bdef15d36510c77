//! Execution back end for `docsed` directives.
//!
//! Takes the [`Directive`](docsed_parser::Directive) values the parser crate
//! produces and drives them against a remote rich-text document:
//!
//! 1. fetch a snapshot ([`Document`]) through an injected [`DocumentService`]
//! 2. locate matches ([`matcher`]) via one shared tree walk ([`walker`])
//! 3. classify each match ([`classify`]) and lower it to primitive
//!    operations ([`compiler`], [`ops`])
//! 4. group directives to minimize round trips ([`planner`])
//! 5. apply the operations phase by phase ([`Engine`]), re-fetching whenever
//!    a later phase's offsets depend on earlier mutations, with every call
//!    wrapped in bounded retry ([`RetryPolicy`])
//!
//! Offset safety is structural: operations are compiled in snapshot
//! coordinates and remapped through an [`OffsetTracker`] as edits commit.
//! There is no rollback; a failed phase surfaces which phase died and leaves
//! the document as the committed phases left it.

pub mod classify;
pub mod compiler;
mod document;
mod engine;
mod error;
pub mod matcher;
mod offset;
pub mod planner;
mod ops;
mod retry;
mod service;
pub mod walker;

#[cfg(feature = "network")]
mod http;

pub use document::{
    Document, InlineImage, Node, Paragraph, SectionBreak, Table, TableCell, TableRow, TextRun,
};
pub use engine::{ApplyOutcome, DirectiveOutcome, Engine};
pub use error::{AddressKind, Error, Phase};
pub use offset::OffsetTracker;
pub use ops::{BulletPreset, EditOperation, ParagraphStyle, Reply, TextStyle};
pub use retry::{CancelToken, RetryPolicy};
pub use service::{DocumentService, ServiceError};

#[cfg(feature = "network")]
pub use http::HttpDocumentService;

use docsed_parser::Directive;

/// Compile one directive against a snapshot without executing anything.
/// This is what `--dry-run` prints.
pub fn compile_plan(
    doc: &Document,
    directive: &Directive,
) -> Result<compiler::CompiledPlan, Error> {
    let matches = matcher::find_matches(doc, directive)?;
    let classified = matches
        .into_iter()
        .map(|m| classify::classify(m, directive))
        .collect();
    Ok(compiler::compile(classified, directive))
}
