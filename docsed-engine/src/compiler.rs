//! Lowering classified matches to edit operations.
//!
//! Matches are processed in reverse document order (highest start offset
//! first) so every emitted delete/insert lands before lower-offset edits
//! invalidate it. Anything that runs in a later phase is kept in snapshot
//! coordinates as an anchor plus inserted length; the engine remaps anchors
//! through its [`OffsetTracker`](crate::offset::OffsetTracker) when the
//! phase actually executes.

use docsed_parser::{
    AttributeSet, BreakKind, CellAddress, CellTarget, Directive, Rendered, StructuralOp,
    TableAxis, TableRef, TableSpec, TagKind,
};

use crate::classify::{Classified, ImageSource, MatchClass};
use crate::document::Table;
use crate::error::{AddressKind, Error};
use crate::matcher::{TextMatch, resolve_index, resolve_tables};
use crate::ops::{BulletPreset, EditOperation, ParagraphStyle, TextStyle};
use crate::walker::Walk;

/// A paragraph-style request anchored at a match's snapshot position.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AnchoredStyle {
    pub anchor: usize,
    pub len: usize,
    pub style: ParagraphStyle,
}

/// A list-membership request. Level 0 applies with the other paragraph
/// styles; nested levels are deferred so adjacent runs can be coalesced into
/// one call after the text has landed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct BulletPlan {
    pub anchor: usize,
    pub len: usize,
    pub level: u8,
    pub preset: BulletPreset,
}

/// A footnote to create, then populate once the service returns its
/// generated identifier.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FootnotePlan {
    pub anchor: usize,
    pub delete_len: usize,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct BreakPlan {
    pub anchor: usize,
    pub len: usize,
    pub kind: BreakKind,
}

/// Structural requests that need a fresh snapshot before they can be placed.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StructuralRequest {
    Columns { anchor: usize, count: u32 },
    Checkbox { anchor: usize, len: usize, checked: bool },
    Bookmark { anchor: usize, len: usize, name: String },
    PersonChip { anchor: usize, len: usize, email: String },
    Comment { anchor: usize, len: usize, text: String },
    TableOfContents { anchor: usize, depth: u8 },
}

/// Everything one directive's matches compile to, grouped by phase.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPlan {
    /// Isolated image round trips, reverse document order, applied first.
    pub image_edits: Vec<Vec<EditOperation>>,
    /// Phase 1: deletes, inserts, text styles. Reverse document order.
    pub primary: Vec<EditOperation>,
    /// Phase 2: paragraph styles.
    pub paragraph_styles: Vec<AnchoredStyle>,
    /// Phase 2: top-level list presets.
    pub bullets: Vec<BulletPlan>,
    /// Phase 5: nested list presets, merged after a re-fetch.
    pub deferred_bullets: Vec<BulletPlan>,
    /// Phase 3: footnote create-then-populate sequences, reverse order.
    pub footnotes: Vec<FootnotePlan>,
    /// Phase 4: structural breaks.
    pub breaks: Vec<BreakPlan>,
    /// Phase 5: columns, checkboxes, bookmarks, chips.
    pub structural: Vec<StructuralRequest>,
}

impl CompiledPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_edits.is_empty()
            && self.primary.is_empty()
            && self.paragraph_styles.is_empty()
            && self.bullets.is_empty()
            && self.deferred_bullets.is_empty()
            && self.footnotes.is_empty()
            && self.breaks.is_empty()
            && self.structural.is_empty()
    }

    /// Total operations across all phases, for reporting.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.image_edits.iter().map(Vec::len).sum::<usize>()
            + self.primary.len()
            + self.paragraph_styles.len()
            + self.bullets.len()
            + self.deferred_bullets.len()
            + self.footnotes.len() * 2
            + self.breaks.len()
            + self.structural.len()
    }
}

/// Compile classified matches into a phased plan.
#[tracing::instrument(level = "debug", skip_all, fields(matches = classified.len()))]
#[must_use]
pub fn compile(mut classified: Vec<Classified>, directive: &Directive) -> CompiledPlan {
    classified.sort_by(|a, b| b.m.start.cmp(&a.m.start));

    let mut plan = CompiledPlan::default();
    for c in &classified {
        match &c.class {
            MatchClass::Image(source) => compile_image(&mut plan, &c.m, source),
            MatchClass::Footnote(text) => plan.footnotes.push(FootnotePlan {
                anchor: c.m.start,
                delete_len: c.m.len(),
                text: text.clone(),
            }),
            MatchClass::Rich => compile_rich(&mut plan, &c.m, directive),
            MatchClass::Markdown(rendered) => compile_markdown(&mut plan, &c.m, rendered),
        }
    }
    plan
}

/// Image matches are never batched with anything else: an image fetch plus
/// unrelated mutations in one call is unreliable against the service, so
/// each match becomes its own delete-then-insert round trip.
fn compile_image(plan: &mut CompiledPlan, m: &TextMatch, source: &ImageSource) {
    let mut ops = Vec::new();
    if !m.is_empty() {
        ops.push(EditOperation::DeleteRange {
            start: m.start,
            end: m.end,
        });
    }
    let (url, width, height) = match source {
        ImageSource::Literal(spec) => (spec.url.clone(), spec.width, spec.height),
        ImageSource::Reference(url) => (url.clone(), None, None),
    };
    ops.push(EditOperation::InsertInlineImage {
        at: m.start,
        url,
        width,
        height,
    });
    plan.image_edits.push(ops);
}

fn compile_rich(plan: &mut CompiledPlan, m: &TextMatch, directive: &Directive) {
    let attrs = directive.attributes.as_ref();
    let text = attrs
        .and_then(|a| a.text.clone())
        .unwrap_or_else(|| m.replacement.clone());
    let len = text.chars().count();
    push_replace(plan, m, &text);

    if let Some(attrs) = attrs {
        if attrs.has_text_format() && len > 0 {
            let mut style = TextStyle::from_attributes(attrs);
            // Deterministic output: the inserted range is fully reset unless
            // the block opted out with `!0`.
            if !attrs.no_implicit_reset {
                style = style.filled_reset();
            }
            plan.primary.push(EditOperation::SetTextStyle {
                start: m.start,
                end: m.start + len,
                style,
            });
        }
        if attrs.has_paragraph_format() {
            plan.paragraph_styles.push(AnchoredStyle {
                anchor: m.start,
                len,
                style: ParagraphStyle::from_attributes(attrs),
            });
        }
        if let Some(kind) = attrs.break_kind {
            plan.breaks.push(BreakPlan {
                anchor: m.start,
                len,
                kind,
            });
        }
        push_structural(plan, m.start, len, attrs);
    }

    for span in &directive.spans {
        if let Some(rel) = char_find(&text, &span.text) {
            let span_len = span.text.chars().count();
            plan.primary.push(EditOperation::SetTextStyle {
                start: m.start + rel,
                end: m.start + rel + span_len,
                style: TextStyle::from_toggles(&span.flags),
            });
        } else {
            tracing::warn!(span = %span.text, "inline span text not found in replacement");
        }
    }
}

fn compile_markdown(plan: &mut CompiledPlan, m: &TextMatch, rendered: &Rendered) {
    push_replace(plan, m, &rendered.text);

    for tag in &rendered.tags {
        match &tag.kind {
            TagKind::Bold
            | TagKind::Italic
            | TagKind::Strike
            | TagKind::Code
            | TagKind::CodeBlock(_)
            | TagKind::Link(_) => {
                let mut style = TextStyle::default();
                style.apply_tag(&tag.kind);
                plan.primary.push(EditOperation::SetTextStyle {
                    start: m.start + tag.start,
                    end: m.start + tag.end,
                    style,
                });
            }
            TagKind::Heading(_) | TagKind::Quote => {
                let mut style = ParagraphStyle::default();
                style.apply_tag(&tag.kind);
                plan.paragraph_styles.push(AnchoredStyle {
                    anchor: m.start + tag.start,
                    len: tag.end - tag.start,
                    style,
                });
            }
            TagKind::Bullet(level) | TagKind::Numbered(level) => {
                let preset = if matches!(tag.kind, TagKind::Bullet(_)) {
                    BulletPreset::Disc
                } else {
                    BulletPreset::Decimal
                };
                let bullet = BulletPlan {
                    anchor: m.start + tag.start,
                    len: tag.end - tag.start,
                    level: *level,
                    preset,
                };
                // Nested levels wait for coalescing: the service only reads
                // leading-tab nesting correctly when one call covers the
                // whole run of adjacent items.
                if *level == 0 {
                    plan.bullets.push(bullet);
                } else {
                    plan.deferred_bullets.push(bullet);
                }
            }
            TagKind::HorizontalRule => plan.breaks.push(BreakPlan {
                anchor: m.start,
                len: rendered.text.chars().count(),
                kind: BreakKind::Rule,
            }),
            TagKind::Footnote => {}
        }
    }
}

/// The delete/insert pair shared by every non-image match.
fn push_replace(plan: &mut CompiledPlan, m: &TextMatch, text: &str) {
    if !m.is_empty() {
        plan.primary.push(EditOperation::DeleteRange {
            start: m.start,
            end: m.end,
        });
    }
    if !text.is_empty() {
        plan.primary.push(EditOperation::InsertText {
            at: m.start,
            text: text.to_string(),
            segment: None,
        });
    }
}

fn push_structural(plan: &mut CompiledPlan, anchor: usize, len: usize, attrs: &AttributeSet) {
    if let Some(count) = attrs.columns {
        plan.structural.push(StructuralRequest::Columns { anchor, count });
    }
    if let Some(checked) = attrs.checkbox {
        plan.structural.push(StructuralRequest::Checkbox {
            anchor,
            len,
            checked,
        });
    }
    if let Some(name) = &attrs.bookmark {
        plan.structural.push(StructuralRequest::Bookmark {
            anchor,
            len,
            name: name.clone(),
        });
    }
    if let Some(email) = &attrs.person {
        plan.structural.push(StructuralRequest::PersonChip {
            anchor,
            len,
            email: email.clone(),
        });
    }
    if let Some(text) = &attrs.comment {
        plan.structural.push(StructuralRequest::Comment {
            anchor,
            len,
            text: text.clone(),
        });
    }
    if let Some(depth) = attrs.toc_depth {
        plan.structural
            .push(StructuralRequest::TableOfContents { anchor, depth });
    }
}

fn char_find(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte| haystack.get(..byte).map_or(0, |p| p.chars().count()))
}

/// A cell to fill in once a structural insert has landed and offsets are
/// known again.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CellPopulate {
    pub table: TableRef,
    pub row: u32,
    pub col: u32,
    pub text: String,
}

/// Structural table operations plus any deferred cell population.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct TablePlan {
    pub ops: Vec<EditOperation>,
    pub populate: Vec<CellPopulate>,
}

/// Lower a merge / unmerge / row-column / insert-axis cell address to
/// structural table operations. Plain readable cell targets return an empty
/// plan; the matcher handles those.
pub fn compile_table_ops(
    walked: &Walk,
    directive: &Directive,
    address: &CellAddress,
) -> Result<TablePlan, Error> {
    let mut plan = TablePlan::default();
    let replacement = directive.template.expand_whole("");

    for table in resolve_tables(walked, address.table)? {
        match &address.target {
            CellTarget::Merge { from, to } | CellTarget::Unmerge { from, to } => {
                validate_merge_range(table, *from, *to)?;
                let (row, column) = *from;
                let (row_span, column_span) = (to.0 - from.0 + 1, to.1 - from.1 + 1);
                let op = if matches!(address.target, CellTarget::Merge { .. }) {
                    EditOperation::MergeCells {
                        table_start: table.start,
                        row,
                        column,
                        row_span,
                        column_span,
                    }
                } else {
                    EditOperation::UnmergeCells {
                        table_start: table.start,
                        row,
                        column,
                        row_span,
                        column_span,
                    }
                };
                plan.ops.push(op);
            }
            CellTarget::RowColOp { axis, op } => {
                plan.ops.push(lower_row_col_op(table, *axis, *op)?);
            }
            CellTarget::Cell { row, col } => {
                lower_insert_axes(&mut plan, table, address.table, *row, *col, &replacement)?;
            }
        }
    }
    Ok(plan)
}

fn validate_merge_range(table: &Table, from: (u32, u32), to: (u32, u32)) -> Result<(), Error> {
    if to.0 < from.0 || to.1 < from.1 {
        return Err(Error::InvalidRange {
            kind: AddressKind::Row,
            detail: format!("range {from:?}:{to:?} is inverted"),
        });
    }
    let rows = table.row_count();
    let cols = table.column_count();
    if from.0 == 0 || to.0 as usize > rows {
        return Err(Error::AddressOutOfRange {
            kind: AddressKind::Row,
            index: i64::from(to.0),
            len: rows,
        });
    }
    if from.1 == 0 || to.1 as usize > cols {
        return Err(Error::AddressOutOfRange {
            kind: AddressKind::Column,
            index: i64::from(to.1),
            len: cols,
        });
    }
    Ok(())
}

fn lower_row_col_op(
    table: &Table,
    axis: TableAxis,
    op: StructuralOp,
) -> Result<EditOperation, Error> {
    let (len, kind) = match axis {
        TableAxis::Row => (table.row_count(), AddressKind::Row),
        TableAxis::Column => (table.column_count(), AddressKind::Column),
    };
    let lowered = match (axis, op) {
        (TableAxis::Row, StructuralOp::Delete(target)) => EditOperation::DeleteTableRow {
            table_start: table.start,
            row: delete_index(target, len, kind)?,
        },
        (TableAxis::Column, StructuralOp::Delete(target)) => EditOperation::DeleteTableColumn {
            table_start: table.start,
            column: delete_index(target, len, kind)?,
        },
        (TableAxis::Row, StructuralOp::Insert(before)) => {
            validate_insert_point(before, len, kind)?;
            EditOperation::InsertTableRow {
                table_start: table.start,
                before,
            }
        }
        (TableAxis::Column, StructuralOp::Insert(before)) => {
            validate_insert_point(before, len, kind)?;
            EditOperation::InsertTableColumn {
                table_start: table.start,
                before,
            }
        }
        (TableAxis::Row, StructuralOp::Append) => EditOperation::InsertTableRow {
            table_start: table.start,
            before: append_point(len),
        },
        (TableAxis::Column, StructuralOp::Append) => EditOperation::InsertTableColumn {
            table_start: table.start,
            before: append_point(len),
        },
    };
    Ok(lowered)
}

/// `R,C` addresses where one axis is an insert point: create the row/column,
/// remember which new cell to populate once the snapshot is re-fetched.
fn lower_insert_axes(
    plan: &mut TablePlan,
    table: &Table,
    table_ref: TableRef,
    row: docsed_parser::Axis,
    col: docsed_parser::Axis,
    replacement: &str,
) -> Result<(), Error> {
    use docsed_parser::Axis;

    let (insert_row, target_row) = match row {
        Axis::InsertBefore(k) => {
            validate_insert_point(k, table.row_count(), AddressKind::Row)?;
            (Some(k), k)
        }
        Axis::Append => {
            let k = append_point(table.row_count());
            (Some(k), k)
        }
        Axis::Specific(n) => (None, n),
        Axis::FromEnd(n) => (
            None,
            u32::try_from(resolve_index(n, true, table.row_count(), AddressKind::Row)? + 1)
                .unwrap_or(1),
        ),
        Axis::Wildcard => (None, 0),
    };
    let (insert_col, target_col) = match col {
        Axis::InsertBefore(k) => {
            validate_insert_point(k, table.column_count(), AddressKind::Column)?;
            (Some(k), k)
        }
        Axis::Append => {
            let k = append_point(table.column_count());
            (Some(k), k)
        }
        Axis::Specific(n) => (None, n),
        Axis::FromEnd(n) => (
            None,
            u32::try_from(resolve_index(n, true, table.column_count(), AddressKind::Column)? + 1)
                .unwrap_or(1),
        ),
        Axis::Wildcard => (None, 0),
    };

    // Readable targets carry no structural work here.
    if insert_row.is_none() && insert_col.is_none() {
        return Ok(());
    }
    if insert_row.is_some() && insert_col.is_some() {
        return Err(Error::InvalidRange {
            kind: AddressKind::Row,
            detail: "cannot insert a row and a column in one address".to_string(),
        });
    }
    if let Some(before) = insert_row {
        plan.ops.push(EditOperation::InsertTableRow {
            table_start: table.start,
            before,
        });
    }
    if let Some(before) = insert_col {
        plan.ops.push(EditOperation::InsertTableColumn {
            table_start: table.start,
            before,
        });
    }
    if !replacement.is_empty() && target_row > 0 && target_col > 0 {
        plan.populate.push(CellPopulate {
            table: table_ref,
            row: target_row,
            col: target_col,
            text: replacement.to_string(),
        });
    }
    Ok(())
}

fn delete_index(target: docsed_parser::Axis, len: usize, kind: AddressKind) -> Result<u32, Error> {
    use docsed_parser::Axis;
    let zero_based = match target {
        Axis::Specific(n) => resolve_index(n, false, len, kind)?,
        Axis::FromEnd(n) => resolve_index(n, true, len, kind)?,
        Axis::Wildcard | Axis::InsertBefore(_) | Axis::Append => {
            return Err(Error::InvalidRange {
                kind,
                detail: "delete needs a concrete row/column".to_string(),
            });
        }
    };
    Ok(u32::try_from(zero_based + 1).unwrap_or(1))
}

fn validate_insert_point(before: u32, len: usize, kind: AddressKind) -> Result<(), Error> {
    if before == 0 || before as usize > len + 1 {
        return Err(Error::AddressOutOfRange {
            kind,
            index: i64::from(before),
            len,
        });
    }
    Ok(())
}

fn append_point(len: usize) -> u32 {
    u32::try_from(len + 1).unwrap_or(u32::MAX)
}

/// Lower a table-creation literal to its insert operation plus the cells to
/// populate after the re-fetch.
#[must_use]
pub fn table_create_ops(spec: &TableSpec, at: usize) -> (EditOperation, Vec<CellPopulate>, bool) {
    match spec {
        TableSpec::Grid { rows, cols, header } => (
            EditOperation::InsertTable {
                at,
                rows: *rows,
                columns: *cols,
            },
            Vec::new(),
            *header,
        ),
        TableSpec::Literal { rows, header } => {
            let row_count = u32::try_from(rows.len()).unwrap_or(0);
            let col_count = u32::try_from(rows.first().map_or(0, Vec::len)).unwrap_or(0);
            let mut populate = Vec::new();
            for (r, row) in rows.iter().enumerate() {
                for (c, text) in row.iter().enumerate() {
                    if !text.is_empty() {
                        populate.push(CellPopulate {
                            // The created table is resolved by position after
                            // the re-fetch, not by reference.
                            table: TableRef::All,
                            row: u32::try_from(r + 1).unwrap_or(1),
                            col: u32::try_from(c + 1).unwrap_or(1),
                            text: text.clone(),
                        });
                    }
                }
            }
            (
                EditOperation::InsertTable {
                    at,
                    rows: row_count,
                    columns: col_count,
                },
                populate,
                *header,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::matcher::find_matches;
    use crate::walker::walk;
    use docsed_parser::parse;
    use pretty_assertions::assert_eq;

    use crate::document::{Document, Node, Paragraph, TableCell, TableRow, TextRun};

    fn doc_of(text: &str) -> Document {
        let mut body = Vec::new();
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            let len = line.chars().count();
            body.push(Node::Paragraph(Paragraph {
                start: offset,
                end: offset + len,
                runs: vec![TextRun {
                    start: offset,
                    text: line.to_string(),
                }],
                images: Vec::new(),
            }));
            offset += len;
        }
        Document {
            id: "d".to_string(),
            revision: None,
            body,
        }
    }

    fn compile_for(doc: &Document, directive: &str) -> CompiledPlan {
        let d = parse(directive).unwrap();
        let matches = find_matches(doc, &d).unwrap();
        let classified = matches.into_iter().map(|m| classify(m, &d)).collect();
        compile(classified, &d)
    }

    #[test]
    fn bold_substitute_compiles_to_three_operations() {
        let doc = doc_of("a target here\n");
        let plan = compile_for(&doc, "s/target/**bold**/");
        assert_eq!(
            plan.primary,
            vec![
                EditOperation::DeleteRange { start: 2, end: 8 },
                EditOperation::InsertText {
                    at: 2,
                    text: "bold".to_string(),
                    segment: None,
                },
                EditOperation::SetTextStyle {
                    start: 2,
                    end: 6,
                    style: TextStyle {
                        bold: Some(true),
                        ..TextStyle::default()
                    },
                },
            ]
        );
    }

    #[test]
    fn reverse_order_across_matches() {
        let doc = doc_of("x x x\n");
        let plan = compile_for(&doc, "s/x/yy/g");
        let deletes: Vec<usize> = plan
            .primary
            .iter()
            .filter_map(|op| match op {
                EditOperation::DeleteRange { start, .. } => Some(*start),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec![4, 2, 0]);
    }

    #[test]
    fn identical_replacement_keeps_length_neutral_pair() {
        let doc = doc_of("same\n");
        let plan = compile_for(&doc, "s/same/same/");
        assert_eq!(
            plan.primary,
            vec![
                EditOperation::DeleteRange { start: 0, end: 4 },
                EditOperation::InsertText {
                    at: 0,
                    text: "same".to_string(),
                    segment: None,
                },
            ]
        );
    }

    #[test]
    fn attribute_set_text_style_resets_unset_toggles() {
        let doc = doc_of("word\n");
        let plan = compile_for(&doc, "s/word/word/{b}");
        let style = plan
            .primary
            .iter()
            .find_map(|op| match op {
                EditOperation::SetTextStyle { style, .. } => Some(style.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.italic, Some(false));
    }

    #[test]
    fn no_implicit_reset_leaves_toggles_unset() {
        let doc = doc_of("word\n");
        let plan = compile_for(&doc, "s/word/word/{b !0}");
        let style = plan
            .primary
            .iter()
            .find_map(|op| match op {
                EditOperation::SetTextStyle { style, .. } => Some(style.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.italic, None);
    }

    #[test]
    fn heading_goes_to_paragraph_phase() {
        let doc = doc_of("title\n");
        let plan = compile_for(&doc, "s/title/# Title/");
        assert_eq!(plan.paragraph_styles.len(), 1);
        assert_eq!(plan.paragraph_styles[0].style.heading, Some(1));
        assert_eq!(plan.paragraph_styles[0].anchor, 0);
        assert_eq!(plan.paragraph_styles[0].len, 5);
    }

    #[test]
    fn nested_bullets_defer_top_level_do_not() {
        let doc = doc_of("list\n");
        let plan = compile_for(&doc, "s/list/- a\\n  - b/");
        assert_eq!(plan.bullets.len(), 1);
        assert_eq!(plan.deferred_bullets.len(), 1);
        assert_eq!(plan.deferred_bullets[0].level, 1);
    }

    #[test]
    fn footnote_matches_compile_to_plans() {
        let doc = doc_of("ref\n");
        let plan = compile_for(&doc, "s/ref/^[the source]/");
        assert!(plan.primary.is_empty());
        assert_eq!(
            plan.footnotes,
            vec![FootnotePlan {
                anchor: 0,
                delete_len: 3,
                text: "the source".to_string(),
            }]
        );
    }

    #[test]
    fn image_literal_compiles_to_isolated_round_trip() {
        let doc = doc_of("logo\n");
        let plan = compile_for(&doc, "s#logo#![l](https://e.com/l.png){width=40 height=20}#");
        assert!(plan.primary.is_empty());
        assert_eq!(plan.image_edits.len(), 1);
        assert_eq!(
            plan.image_edits[0],
            vec![
                EditOperation::DeleteRange { start: 0, end: 4 },
                EditOperation::InsertInlineImage {
                    at: 0,
                    url: "https://e.com/l.png".to_string(),
                    width: Some(40.0),
                    height: Some(20.0),
                },
            ]
        );
    }

    #[test]
    fn inline_span_styles_its_substring() {
        let doc = doc_of("H2O\n");
        let plan = compile_for(&doc, "s/H2O/H2O/{sub=2}");
        let span_op = plan
            .primary
            .iter()
            .find(|op| matches!(op, EditOperation::SetTextStyle { start: 1, end: 2, .. }));
        assert!(span_op.is_some(), "expected a style over the `2`: {plan:?}");
    }

    fn table_fixture() -> Document {
        // A 4x2 table; offsets are loose but ordered.
        let mut rows = Vec::new();
        let mut offset = 10;
        for _ in 0..4 {
            let mut cells = Vec::new();
            for _ in 0..2 {
                cells.push(TableCell {
                    start: offset,
                    end: offset + 5,
                    body: vec![Node::Paragraph(Paragraph {
                        start: offset,
                        end: offset + 5,
                        runs: vec![TextRun {
                            start: offset,
                            text: "cell\n".to_string(),
                        }],
                        images: Vec::new(),
                    })],
                });
                offset += 5;
            }
            rows.push(TableRow { cells });
        }
        Document {
            id: "d".to_string(),
            revision: None,
            body: vec![Node::Table(crate::document::Table {
                start: 9,
                end: offset,
                rows,
            })],
        }
    }

    #[test]
    fn wildcard_column_compiles_one_update_per_row() {
        let doc = table_fixture();
        let plan = compile_for(&doc, "s/|1|[*,2]/new/");
        let inserts = plan
            .primary
            .iter()
            .filter(|op| matches!(op, EditOperation::InsertText { .. }))
            .count();
        assert_eq!(inserts, 4);
    }

    #[test]
    fn merge_range_compiles_to_one_operation() {
        let doc = table_fixture();
        let d = parse("s/|1|[1,1:2,2]//").unwrap();
        let walked = walk(&doc);
        let address = d.cell.clone().unwrap();
        let plan = compile_table_ops(&walked, &d, &address).unwrap();
        assert_eq!(
            plan.ops,
            vec![EditOperation::MergeCells {
                table_start: 9,
                row: 1,
                column: 1,
                row_span: 2,
                column_span: 2,
            }]
        );
    }

    #[test]
    fn merge_beyond_table_is_out_of_range() {
        let doc = table_fixture();
        let d = parse("s/|1|[1,1:9,2]//").unwrap();
        let walked = walk(&doc);
        let address = d.cell.clone().unwrap();
        let err = compile_table_ops(&walked, &d, &address).unwrap_err();
        assert!(matches!(
            err,
            Error::AddressOutOfRange { kind: AddressKind::Row, index: 9, len: 4 }
        ));
    }

    #[test]
    fn row_append_and_delete_lower_to_table_ops() {
        let doc = table_fixture();
        let walked = walk(&doc);

        let d = parse("s/|1|[row:$+]//").unwrap();
        let plan = compile_table_ops(&walked, &d, &d.cell.clone().unwrap()).unwrap();
        assert_eq!(
            plan.ops,
            vec![EditOperation::InsertTableRow {
                table_start: 9,
                before: 5,
            }]
        );

        let d = parse("s/|1|[col:-1]//").unwrap();
        let plan = compile_table_ops(&walked, &d, &d.cell.clone().unwrap()).unwrap();
        assert_eq!(
            plan.ops,
            vec![EditOperation::DeleteTableColumn {
                table_start: 9,
                column: 2,
            }]
        );
    }

    #[test]
    fn insert_axis_populates_the_new_cell() {
        let doc = table_fixture();
        let walked = walk(&doc);
        let d = parse("s/|1|[+2,1]/filled/").unwrap();
        let plan = compile_table_ops(&walked, &d, &d.cell.clone().unwrap()).unwrap();
        assert_eq!(
            plan.ops,
            vec![EditOperation::InsertTableRow {
                table_start: 9,
                before: 2,
            }]
        );
        assert_eq!(
            plan.populate,
            vec![CellPopulate {
                table: docsed_parser::TableRef::Nth(1),
                row: 2,
                col: 1,
                text: "filled".to_string(),
            }]
        );
    }
}
