//! One traversal for every consumer.
//!
//! The matcher, the image finder, and the table collector all need the same
//! depth-first walk of the snapshot tree, descending into table cells. It is
//! implemented once here, yielding flat, document-ordered collections of
//! paragraph texts (with run-accurate offset mapping), tables, and inline
//! images.

use crate::document::{Document, InlineImage, Node, Paragraph, Table, TableCell};

/// One text run's place in a concatenated paragraph text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RunSpan {
    /// Absolute character offset of the run's first character.
    abs_start: usize,
    /// Character length of the run.
    len: usize,
}

/// A paragraph's runs concatenated into one searchable string, with the
/// mapping back to absolute document offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParagraphText {
    pub text: String,
    spans: Vec<RunSpan>,
}

impl ParagraphText {
    fn from_paragraph(paragraph: &Paragraph) -> Self {
        let mut text = String::new();
        let mut spans = Vec::new();
        for run in &paragraph.runs {
            let len = run.text.chars().count();
            spans.push(RunSpan {
                abs_start: run.start,
                len,
            });
            text.push_str(&run.text);
        }
        Self { text, spans }
    }

    /// Absolute start of the paragraph text.
    #[must_use]
    pub fn start(&self) -> usize {
        self.spans.first().map_or(0, |s| s.abs_start)
    }

    /// Map a character offset within the concatenated text to an absolute
    /// document offset. Runs need not be contiguous: inline images occupy
    /// positions between them.
    #[must_use]
    pub fn abs(&self, rel: usize) -> usize {
        let mut remaining = rel;
        for span in &self.spans {
            if remaining < span.len {
                return span.abs_start + remaining;
            }
            remaining -= span.len;
        }
        // One past the final character: the paragraph end.
        self.spans
            .last()
            .map_or(rel, |s| s.abs_start + s.len + remaining)
    }
}

/// The flattened snapshot: every text, table, and image in document order.
#[derive(Debug, Default)]
pub struct Walk<'a> {
    pub texts: Vec<ParagraphText>,
    pub tables: Vec<&'a Table>,
    pub images: Vec<&'a InlineImage>,
}

impl<'a> Walk<'a> {
    /// Paragraph texts lying inside the given cell.
    #[must_use]
    pub fn texts_in_cell(&self, cell: &TableCell) -> Vec<&ParagraphText> {
        self.texts
            .iter()
            .filter(|t| t.start() >= cell.start && t.start() < cell.end)
            .collect()
    }
}

/// Walk the document depth-first, descending into table cells.
#[must_use]
pub fn walk(doc: &Document) -> Walk<'_> {
    let mut out = Walk::default();
    collect(&doc.body, &mut out);
    out
}

fn collect<'a>(nodes: &'a [Node], out: &mut Walk<'a>) {
    for node in nodes {
        match node {
            Node::Paragraph(p) => {
                out.images.extend(p.images.iter());
                out.texts.push(ParagraphText::from_paragraph(p));
            }
            Node::Table(t) => {
                out.tables.push(t);
                for row in &t.rows {
                    for cell in &row.cells {
                        collect(&cell.body, out);
                    }
                }
            }
            Node::SectionBreak(_) => {}
        }
    }
}
