//! Phased execution against the document service.
//!
//! Instructions run sequentially: every phase is a barrier, and no phase
//! begins before the previous one's network call has returned. A failing
//! phase aborts the rest and surfaces which phase died; already-committed
//! phases are not rolled back. The engine owns the snapshot and re-fetches
//! it whenever a later phase's offsets depend on earlier mutations.

use docsed_parser::{Axis, CellTarget, Directive};

use crate::classify::classify;
use crate::compiler::{self, CellPopulate, CompiledPlan};
use crate::document::{Document, Table};
use crate::error::{AddressKind, Error, Phase};
use crate::matcher::{self, find_matches};
use crate::offset::OffsetTracker;
use crate::ops::{BulletPreset, EditOperation, Reply};
use crate::planner::{self, Group, InstructionClass};
use crate::retry::{CancelToken, RetryPolicy};
use crate::service::{DocumentService, ServiceError};
use crate::walker::walk;

/// What one directive did, for reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DirectiveOutcome {
    pub directive: String,
    pub matches: usize,
    pub operations: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ApplyOutcome {
    pub outcomes: Vec<DirectiveOutcome>,
}

impl ApplyOutcome {
    #[must_use]
    pub fn total_operations(&self) -> usize {
        self.outcomes.iter().map(|o| o.operations).sum()
    }
}

/// The execution engine. Holds an injected service capability; it never
/// constructs its own network client.
pub struct Engine<'s> {
    service: &'s dyn DocumentService,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl<'s> Engine<'s> {
    #[must_use]
    pub fn new(service: &'s dyn DocumentService) -> Self {
        Self {
            service,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply a batch of directives to one document, grouped by the planner.
    #[tracing::instrument(level = "info", skip(self, directives), fields(directives = directives.len()))]
    pub fn apply(&self, doc_id: &str, directives: &[Directive]) -> Result<ApplyOutcome, Error> {
        let groups = planner::plan(directives);
        let mut outcome = ApplyOutcome {
            outcomes: directives
                .iter()
                .map(|d| DirectiveOutcome {
                    directive: d.raw.clone(),
                    ..DirectiveOutcome::default()
                })
                .collect(),
        };

        for group in &groups {
            match group.class {
                InstructionClass::Native => {
                    self.apply_native(doc_id, directives, group, &mut outcome)?;
                }
                InstructionClass::Cell if group.indices.len() > 1 => {
                    self.apply_cell_batch(doc_id, directives, group, &mut outcome)?;
                }
                InstructionClass::TableCreate => {
                    for &index in &group.indices {
                        if let Some(d) = directives.get(index) {
                            let stats = self.apply_table_create(doc_id, d)?;
                            record(&mut outcome, index, stats);
                        }
                    }
                }
                InstructionClass::Positional
                | InstructionClass::Command
                | InstructionClass::Cell
                | InstructionClass::Image
                | InstructionClass::Manual => {
                    for &index in &group.indices {
                        if let Some(d) = directives.get(index) {
                            let stats = self.apply_directive(doc_id, d)?;
                            record(&mut outcome, index, stats);
                        }
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// One directive through the full pipeline: fetch, match, classify,
    /// compile, run phases.
    fn apply_directive(&self, doc_id: &str, directive: &Directive) -> Result<(usize, usize), Error> {
        let doc = self.fetch_doc(doc_id)?;

        if let Some(address) = &directive.cell
            && is_structural_cell(&address.target)
        {
            let walked = walk(&doc);
            let table_plan = compiler::compile_table_ops(&walked, directive, address)?;
            let issued = table_plan.ops.len();
            self.mutate(doc_id, &table_plan.ops, Phase::CellUpdate)?;
            let populated = self.apply_populates(doc_id, &table_plan.populate, None)?;
            return Ok((table_plan.populate.len().max(issued), issued + populated));
        }

        let matches = if planner::classify_directive(directive) == InstructionClass::Positional {
            vec![positional_match(&doc, directive)]
        } else {
            find_matches(&doc, directive)?
        };
        if matches.is_empty() {
            tracing::debug!(directive = %directive.raw, "no matches");
            return Ok((0, 0));
        }
        let count = matches.len();
        let classified = matches
            .into_iter()
            .map(|m| classify(m, directive))
            .collect();
        let plan = compiler::compile(classified, directive);
        let issued = self.run_phases(doc_id, &plan)?;
        Ok((count, issued))
    }

    /// Drive one compiled plan through its phases.
    fn run_phases(&self, doc_id: &str, plan: &CompiledPlan) -> Result<usize, Error> {
        let mut tracker = OffsetTracker::new();
        let mut issued = 0usize;

        // Images first, each as its own isolated round trip.
        for edit in &plan.image_edits {
            let remapped = remap_ops(edit, &tracker);
            self.mutate(doc_id, &remapped, Phase::Images)?;
            record_effects(edit, &mut tracker);
            issued += remapped.len();
        }

        // Phase 1: deletes, inserts, text styles.
        if !plan.primary.is_empty() {
            let remapped = remap_ops(&plan.primary, &tracker);
            self.mutate(doc_id, &remapped, Phase::Primary)?;
            record_effects(&plan.primary, &mut tracker);
            issued += remapped.len();
        }

        // Phase 2: paragraph styles and top-level list presets.
        let mut styles = Vec::new();
        for s in &plan.paragraph_styles {
            let start = tracker.remap(s.anchor);
            styles.push(EditOperation::SetParagraphStyle {
                start,
                // One past the text to cover the trailing paragraph marker.
                end: start + s.len + 1,
                style: s.style.clone(),
            });
        }
        for b in &plan.bullets {
            let start = tracker.remap(b.anchor);
            styles.push(EditOperation::ApplyBulletPreset {
                start,
                end: start + b.len + 1,
                preset: b.preset,
            });
        }
        if !styles.is_empty() {
            self.mutate(doc_id, &styles, Phase::ParagraphStyles)?;
            issued += styles.len();
        }

        // Phase 3: footnotes, individually, create then populate.
        for f in &plan.footnotes {
            let at = tracker.remap(f.anchor);
            let mut ops = Vec::new();
            if f.delete_len > 0 {
                ops.push(EditOperation::DeleteRange {
                    start: at,
                    end: at + f.delete_len,
                });
            }
            ops.push(EditOperation::CreateFootnote { at });
            let replies = self.mutate(doc_id, &ops, Phase::Footnotes)?;
            let id = replies
                .iter()
                .find_map(|r| r.footnote_id.clone())
                .ok_or_else(|| Error::Phase {
                    phase: Phase::Footnotes,
                    source: ServiceError::Permanent(
                        "service returned no footnote id".to_string(),
                    ),
                })?;
            self.mutate(
                doc_id,
                &[EditOperation::InsertText {
                    at: 0,
                    text: f.text.clone(),
                    segment: Some(id),
                }],
                Phase::Footnotes,
            )?;
            tracker.record_delete(f.anchor, f.anchor + f.delete_len);
            // The footnote reference occupies one character.
            tracker.record_insert(f.anchor, 1);
            issued += ops.len() + 1;
        }

        // Phase 4: structural breaks, positioned after the edits that
        // requested them. Offsets have shifted, so re-fetch first.
        if !plan.breaks.is_empty() {
            let doc = self.fetch_doc(doc_id)?;
            let end = doc.end_offset().saturating_sub(1);
            let mut ops = Vec::new();
            let mut breaks = plan.breaks.clone();
            breaks.sort_by(|a, b| b.anchor.cmp(&a.anchor));
            for b in &breaks {
                let at = (tracker.remap(b.anchor) + b.len).min(end);
                ops.push(EditOperation::InsertBreak { at, kind: b.kind });
                tracker.record_insert(b.anchor + b.len, 1);
            }
            self.mutate(doc_id, &ops, Phase::Breaks)?;
            issued += ops.len();
        }

        // Phase 5: columns, checkboxes, bookmarks, chips, and the deferred
        // nested-bullet runs, merged now that all the text has landed.
        if !plan.structural.is_empty() || !plan.deferred_bullets.is_empty() {
            let _ = self.fetch_doc(doc_id)?;
            let mut ops = Vec::new();
            for run in merge_bullet_runs(&plan.deferred_bullets, &tracker) {
                ops.push(run);
            }
            for request in &plan.structural {
                ops.push(structural_op(request, &tracker));
            }
            self.mutate(doc_id, &ops, Phase::Structural)?;
            issued += ops.len();
        }

        Ok(issued)
    }

    /// Coalesced native find-replace calls: the whole group shares one
    /// round trip.
    fn apply_native(
        &self,
        doc_id: &str,
        directives: &[Directive],
        group: &Group,
        outcome: &mut ApplyOutcome,
    ) -> Result<(), Error> {
        let mut ops = Vec::new();
        for &index in &group.indices {
            let Some(d) = directives.get(index) else {
                continue;
            };
            ops.push(EditOperation::ReplaceAllText {
                pattern: d.raw_pattern.clone(),
                replacement: d.template.as_literal().unwrap_or_default(),
                match_case: !d.pattern.as_str().starts_with("(?i)"),
            });
        }
        let replies = self.mutate(doc_id, &ops, Phase::Native)?;
        for (slot, &index) in group.indices.iter().enumerate() {
            let matches = replies
                .get(slot)
                .and_then(|r| r.occurrences_changed)
                .unwrap_or(0) as usize;
            record(outcome, index, (matches, 1));
        }
        Ok(())
    }

    /// Simple whole-cell updates against one table, batched into one call.
    fn apply_cell_batch(
        &self,
        doc_id: &str,
        directives: &[Directive],
        group: &Group,
        outcome: &mut ApplyOutcome,
    ) -> Result<(), Error> {
        let doc = self.fetch_doc(doc_id)?;
        let mut ops = Vec::new();
        for &index in &group.indices {
            let Some(d) = directives.get(index) else {
                continue;
            };
            let matches = find_matches(&doc, d)?;
            let issued = matches.len() * 2;
            for m in &matches {
                if !m.is_empty() {
                    ops.push(EditOperation::DeleteRange {
                        start: m.start,
                        end: m.end,
                    });
                }
                if !m.replacement.is_empty() {
                    ops.push(EditOperation::InsertText {
                        at: m.start,
                        text: m.replacement.clone(),
                        segment: None,
                    });
                }
            }
            record(outcome, index, (matches.len(), issued));
        }
        // Highest offset first: the batch touches one snapshot.
        ops.sort_by(|a, b| op_anchor(b).cmp(&op_anchor(a)));
        self.mutate(doc_id, &ops, Phase::CellUpdate)?;
        Ok(())
    }

    /// Insert a new table where the pattern matches, then fill its cells.
    fn apply_table_create(&self, doc_id: &str, directive: &Directive) -> Result<(usize, usize), Error> {
        let spec = directive
            .template
            .as_literal()
            .and_then(|lit| docsed_parser::parse_table_spec(&lit));
        let Some(spec) = spec else {
            return self.apply_directive(doc_id, directive);
        };
        let doc = self.fetch_doc(doc_id)?;
        let matches = find_matches(&doc, directive)?;
        let Some(m) = matches.first() else {
            return Ok((0, 0));
        };

        let (insert, populate, header) = compiler::table_create_ops(&spec, m.start);
        let mut ops = Vec::new();
        if !m.is_empty() {
            ops.push(EditOperation::DeleteRange {
                start: m.start,
                end: m.end,
            });
        }
        ops.push(insert);
        let issued = ops.len();
        self.mutate(doc_id, &ops, Phase::TableCreate)?;

        let populated = self.apply_populates(doc_id, &populate, Some(m.start))?;
        let styled = if header {
            self.style_header_row(doc_id, m.start)?
        } else {
            0
        };
        Ok((1, issued + populated + styled))
    }

    /// Fill cells once their offsets are known again. `created_at` targets
    /// the table inserted at that position instead of a numbered reference.
    fn apply_populates(
        &self,
        doc_id: &str,
        populates: &[CellPopulate],
        created_at: Option<usize>,
    ) -> Result<usize, Error> {
        if populates.is_empty() {
            return Ok(0);
        }
        let doc = self.fetch_doc(doc_id)?;
        let walked = walk(&doc);
        let mut ops = Vec::new();
        for p in populates {
            let table = match created_at {
                Some(at) => table_at(&walked.tables, at)?,
                None => matcher::resolve_tables(&walked, p.table)?
                    .first()
                    .copied()
                    .ok_or(Error::AddressOutOfRange {
                        kind: AddressKind::Table,
                        index: 1,
                        len: 0,
                    })?,
            };
            let cell = table
                .rows
                .get(p.row as usize - 1)
                .and_then(|r| r.cells.get(p.col as usize - 1))
                .ok_or(Error::AddressOutOfRange {
                    kind: AddressKind::Row,
                    index: i64::from(p.row),
                    len: table.row_count(),
                })?;
            let end = cell.end.saturating_sub(1).max(cell.start);
            if end > cell.start {
                ops.push(EditOperation::DeleteRange {
                    start: cell.start,
                    end,
                });
            }
            ops.push(EditOperation::InsertText {
                at: cell.start,
                text: p.text.clone(),
                segment: None,
            });
        }
        ops.sort_by(|a, b| op_anchor(b).cmp(&op_anchor(a)));
        let issued = ops.len();
        self.mutate(doc_id, &ops, Phase::CellUpdate)?;
        Ok(issued)
    }

    /// Bold the first row of the table created at `at`.
    fn style_header_row(&self, doc_id: &str, at: usize) -> Result<usize, Error> {
        let doc = self.fetch_doc(doc_id)?;
        let walked = walk(&doc);
        let table = table_at(&walked.tables, at)?;
        let mut ops = Vec::new();
        if let Some(row) = table.rows.first() {
            for cell in &row.cells {
                let end = cell.end.saturating_sub(1).max(cell.start);
                if end > cell.start {
                    ops.push(EditOperation::SetTextStyle {
                        start: cell.start,
                        end,
                        style: crate::ops::TextStyle {
                            bold: Some(true),
                            ..crate::ops::TextStyle::default()
                        },
                    });
                }
            }
        }
        let issued = ops.len();
        self.mutate(doc_id, &ops, Phase::TableCreate)?;
        Ok(issued)
    }

    fn fetch_doc(&self, doc_id: &str) -> Result<Document, Error> {
        self.retry
            .run(&self.cancel, ServiceError::retryable_for_fetch, || {
                self.service.fetch(doc_id)
            })
            .map_err(Error::phase(Phase::Fetch))
    }

    fn mutate(
        &self,
        doc_id: &str,
        ops: &[EditOperation],
        phase: Phase,
    ) -> Result<Vec<Reply>, Error> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(%phase, ops = ops.len(), "mutating");
        self.retry
            .run(&self.cancel, ServiceError::retryable_for_mutate, || {
                self.service.batch_mutate(doc_id, ops)
            })
            .map_err(Error::phase(phase))
    }
}

fn record(outcome: &mut ApplyOutcome, index: usize, stats: (usize, usize)) {
    if let Some(slot) = outcome.outcomes.get_mut(index) {
        slot.matches += stats.0;
        slot.operations += stats.1;
    }
}

/// Positional directives insert at the document edges without matching.
fn positional_match(doc: &Document, directive: &Directive) -> matcher::TextMatch {
    let at = if directive.raw_pattern == "^" || directive.raw_pattern == r"\A" {
        0
    } else {
        doc.end_offset().saturating_sub(1)
    };
    matcher::TextMatch {
        start: at,
        end: at,
        original: String::new(),
        replacement: directive.template.expand_whole(""),
    }
}

/// Cell targets the matcher cannot read: merges, row/column operations, and
/// insert-axis addresses.
fn is_structural_cell(target: &CellTarget) -> bool {
    match target {
        CellTarget::Cell { row, col } => {
            let inserting =
                |axis: &Axis| matches!(axis, Axis::InsertBefore(_) | Axis::Append);
            inserting(row) || inserting(col)
        }
        CellTarget::Merge { .. } | CellTarget::Unmerge { .. } | CellTarget::RowColOp { .. } => {
            true
        }
    }
}

fn table_at<'a>(tables: &[&'a Table], at: usize) -> Result<&'a Table, Error> {
    tables
        .iter()
        .filter(|t| t.start >= at)
        .min_by_key(|t| t.start)
        .copied()
        .ok_or(Error::AddressOutOfRange {
            kind: AddressKind::Table,
            index: 1,
            len: tables.len(),
        })
}

/// Remap a batch compiled against a snapshot through the edits committed
/// since that snapshot was read.
fn remap_ops(ops: &[EditOperation], tracker: &OffsetTracker) -> Vec<EditOperation> {
    if tracker.is_empty() {
        return ops.to_vec();
    }
    ops.iter().map(|op| remap_op(op, tracker)).collect()
}

fn remap_op(op: &EditOperation, tracker: &OffsetTracker) -> EditOperation {
    let mut out = op.clone();
    match &mut out {
        EditOperation::DeleteRange { start, end }
        | EditOperation::SetTextStyle { start, end, .. }
        | EditOperation::SetParagraphStyle { start, end, .. }
        | EditOperation::ApplyBulletPreset { start, end, .. }
        | EditOperation::CreateNamedRange { start, end, .. }
        | EditOperation::AttachComment { start, end, .. } => {
            (*start, *end) = tracker.remap_range(*start, *end);
        }
        EditOperation::InsertText { at, .. }
        | EditOperation::InsertInlineImage { at, .. }
        | EditOperation::InsertTable { at, .. }
        | EditOperation::InsertBreak { at, .. }
        | EditOperation::CreateFootnote { at }
        | EditOperation::InsertPersonChip { at, .. }
        | EditOperation::UpdateSectionColumns { at, .. }
        | EditOperation::InsertTableOfContents { at, .. } => {
            *at = tracker.remap(*at);
        }
        EditOperation::InsertTableRow { table_start, .. }
        | EditOperation::DeleteTableRow { table_start, .. }
        | EditOperation::InsertTableColumn { table_start, .. }
        | EditOperation::DeleteTableColumn { table_start, .. }
        | EditOperation::MergeCells { table_start, .. }
        | EditOperation::UnmergeCells { table_start, .. } => {
            *table_start = tracker.remap(*table_start);
        }
        EditOperation::ReplaceAllText { .. } => {}
    }
    out
}

/// Record what a batch does to later offsets, in the coordinates the batch
/// was compiled in.
fn record_effects(ops: &[EditOperation], tracker: &mut OffsetTracker) {
    for op in ops {
        match op {
            EditOperation::DeleteRange { start, end } => tracker.record_delete(*start, *end),
            EditOperation::InsertText { at, text, segment } => {
                if segment.is_none() {
                    tracker.record_insert(*at, text.chars().count());
                }
            }
            EditOperation::InsertInlineImage { at, .. } => tracker.record_insert(*at, 1),
            EditOperation::InsertBreak { at, .. } => tracker.record_insert(*at, 1),
            EditOperation::SetTextStyle { .. }
            | EditOperation::SetParagraphStyle { .. }
            | EditOperation::InsertTable { .. }
            | EditOperation::InsertTableRow { .. }
            | EditOperation::DeleteTableRow { .. }
            | EditOperation::InsertTableColumn { .. }
            | EditOperation::DeleteTableColumn { .. }
            | EditOperation::MergeCells { .. }
            | EditOperation::UnmergeCells { .. }
            | EditOperation::CreateNamedRange { .. }
            | EditOperation::CreateFootnote { .. }
            | EditOperation::InsertPersonChip { .. }
            | EditOperation::ApplyBulletPreset { .. }
            | EditOperation::UpdateSectionColumns { .. }
            | EditOperation::InsertTableOfContents { .. }
            | EditOperation::AttachComment { .. }
            | EditOperation::ReplaceAllText { .. } => {}
        }
    }
}

/// Merge adjacent deferred-bullet ranges into single preset applications so
/// the service reads leading-tab nesting across the whole run.
fn merge_bullet_runs(
    bullets: &[crate::compiler::BulletPlan],
    tracker: &OffsetTracker,
) -> Vec<EditOperation> {
    let mut ranges: Vec<(usize, usize, BulletPreset)> = bullets
        .iter()
        .map(|b| {
            let start = tracker.remap(b.anchor);
            (start, start + b.len + 1, b.preset)
        })
        .collect();
    ranges.sort_by_key(|(start, ..)| *start);

    let mut merged: Vec<(usize, usize, BulletPreset)> = Vec::new();
    for (start, end, preset) in ranges {
        if let Some(last) = merged.last_mut()
            && last.2 == preset
            && start <= last.1
        {
            last.1 = last.1.max(end);
            continue;
        }
        merged.push((start, end, preset));
    }
    merged
        .into_iter()
        .map(|(start, end, preset)| EditOperation::ApplyBulletPreset { start, end, preset })
        .collect()
}

fn structural_op(
    request: &crate::compiler::StructuralRequest,
    tracker: &OffsetTracker,
) -> EditOperation {
    use crate::compiler::StructuralRequest;
    match request {
        StructuralRequest::Columns { anchor, count } => EditOperation::UpdateSectionColumns {
            at: tracker.remap(*anchor),
            count: *count,
        },
        StructuralRequest::Checkbox {
            anchor,
            len,
            checked,
        } => {
            let start = tracker.remap(*anchor);
            EditOperation::ApplyBulletPreset {
                start,
                end: start + len + 1,
                preset: BulletPreset::Checkbox { checked: *checked },
            }
        }
        StructuralRequest::Bookmark { anchor, len, name } => {
            let start = tracker.remap(*anchor);
            EditOperation::CreateNamedRange {
                name: name.clone(),
                start,
                end: start + len,
            }
        }
        StructuralRequest::PersonChip { anchor, len, email } => EditOperation::InsertPersonChip {
            at: tracker.remap(*anchor) + len,
            email: email.clone(),
        },
        StructuralRequest::Comment { anchor, len, text } => {
            let start = tracker.remap(*anchor);
            EditOperation::AttachComment {
                start,
                end: start + len,
                text: text.clone(),
            }
        }
        StructuralRequest::TableOfContents { anchor, depth } => {
            EditOperation::InsertTableOfContents {
                at: tracker.remap(*anchor),
                depth: *depth,
            }
        }
    }
}

/// The primary position an operation acts on, for highest-first ordering.
fn op_anchor(op: &EditOperation) -> usize {
    match op {
        EditOperation::DeleteRange { start, .. }
        | EditOperation::SetTextStyle { start, .. }
        | EditOperation::SetParagraphStyle { start, .. }
        | EditOperation::ApplyBulletPreset { start, .. }
        | EditOperation::CreateNamedRange { start, .. }
        | EditOperation::AttachComment { start, .. } => *start,
        EditOperation::InsertText { at, .. }
        | EditOperation::InsertInlineImage { at, .. }
        | EditOperation::InsertTable { at, .. }
        | EditOperation::InsertBreak { at, .. }
        | EditOperation::CreateFootnote { at }
        | EditOperation::InsertPersonChip { at, .. }
        | EditOperation::UpdateSectionColumns { at, .. }
        | EditOperation::InsertTableOfContents { at, .. } => *at,
        EditOperation::InsertTableRow { table_start, .. }
        | EditOperation::DeleteTableRow { table_start, .. }
        | EditOperation::InsertTableColumn { table_start, .. }
        | EditOperation::DeleteTableColumn { table_start, .. }
        | EditOperation::MergeCells { table_start, .. }
        | EditOperation::UnmergeCells { table_start, .. } => *table_start,
        EditOperation::ReplaceAllText { .. } => 0,
    }
}
