//! Locating matches in a snapshot.
//!
//! Walks the flattened document, finds every occurrence of a directive's
//! compiled pattern, and computes each occurrence's replacement text by
//! evaluating the template against the captures. Nth-match selection is
//! applied once across the whole document, in document order, never
//! per-paragraph.

use docsed_parser::{Axis, CellAddress, CellTarget, Directive, ImageAddress, TableRef};

use crate::document::{Document, Table, TableCell};
use crate::error::{AddressKind, Error};
use crate::walker::{ParagraphText, Walk, walk};

/// One located occurrence plus its computed replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMatch {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
}

impl TextMatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Find all matches for a directive against a snapshot, with nth-match and
/// global bounding applied.
#[tracing::instrument(level = "debug", skip(doc, directive), fields(directive = %directive.raw))]
pub fn find_matches(doc: &Document, directive: &Directive) -> Result<Vec<TextMatch>, Error> {
    let walked = walk(doc);

    // Address-driven sets (image positions, whole cells, whole tables) are
    // fixed by the address itself; nth-match and the single-match bound
    // apply only where a pattern chose the sites.
    if let Some(address) = &directive.image {
        return image_matches(&walked, directive, address);
    }
    if let Some(cell) = &directive.cell {
        let matches = cell_matches(&walked, directive, cell)?;
        return Ok(if cell.subpattern.is_some() {
            select(matches, directive)
        } else {
            matches
        });
    }
    if let Some(table) = &directive.table {
        return whole_table_matches(&walked, directive, table);
    }

    let mut all = Vec::new();
    for text in &walked.texts {
        collect_in_text(text, directive, &mut all);
        if directive.bounded_to_first() && !all.is_empty() {
            break;
        }
    }
    Ok(select(all, directive))
}

/// Apply nth-match selection (1-based, across the whole document) or the
/// single-match bound.
fn select(mut matches: Vec<TextMatch>, directive: &Directive) -> Vec<TextMatch> {
    if let Some(nth) = directive.nth_match {
        let index = (nth as usize).saturating_sub(1);
        return if index < matches.len() {
            vec![matches.swap_remove(index)]
        } else {
            Vec::new()
        };
    }
    if directive.bounded_to_first() {
        matches.truncate(1);
    }
    matches
}

fn collect_in_text(text: &ParagraphText, directive: &Directive, out: &mut Vec<TextMatch>) {
    if let Some(transliteration) = &directive.transliteration {
        for m in directive.pattern.find_iter(&text.text) {
            let start = char_at(&text.text, m.start());
            let end = char_at(&text.text, m.end());
            out.push(TextMatch {
                start: text.abs(start),
                end: text.abs(end),
                original: m.as_str().to_string(),
                replacement: transliteration.apply(m.as_str()),
            });
        }
        return;
    }
    for caps in directive.pattern.captures_iter(&text.text) {
        let Some(whole) = caps.get(0) else { continue };
        let start = char_at(&text.text, whole.start());
        let end = char_at(&text.text, whole.end());
        out.push(TextMatch {
            start: text.abs(start),
            end: text.abs(end),
            original: whole.as_str().to_string(),
            replacement: directive.template.expand(&caps),
        });
        if directive.bounded_to_first() {
            return;
        }
    }
}

/// Matches for an image-addressed directive: each selected image position
/// becomes a one-character match at its anchor.
fn image_matches(
    walked: &Walk,
    directive: &Directive,
    address: &ImageAddress,
) -> Result<Vec<TextMatch>, Error> {
    let len = walked.images.len();
    let selected: Vec<usize> = match address {
        ImageAddress::Nth(n) => vec![resolve_index(*n, false, len, AddressKind::Image)?],
        ImageAddress::FromEnd(n) => vec![resolve_index(*n, true, len, AddressKind::Image)?],
        ImageAddress::All => (0..len).collect(),
        ImageAddress::AltPattern(pattern) => {
            let re = regex::Regex::new(pattern)?;
            walked
                .images
                .iter()
                .enumerate()
                .filter(|(_, img)| re.is_match(&img.alt))
                .map(|(i, _)| i)
                .collect()
        }
    };
    Ok(selected
        .into_iter()
        .filter_map(|i| walked.images.get(i))
        .map(|img| TextMatch {
            start: img.at,
            end: img.at + 1,
            original: String::new(),
            replacement: directive.template.expand_whole(""),
        })
        .collect())
}

/// Matches inside addressed cells: a subpattern scopes a regex to the cell's
/// paragraphs; without one, the whole cell's content is the match.
fn cell_matches(
    walked: &Walk,
    directive: &Directive,
    address: &CellAddress,
) -> Result<Vec<TextMatch>, Error> {
    let CellTarget::Cell { row, col } = &address.target else {
        // Merges and row/column operations carry no text matches; the
        // operation compiler lowers them directly.
        return Ok(Vec::new());
    };

    let mut matches = Vec::new();
    for table in resolve_tables(walked, address.table)? {
        for cell in resolve_cells(table, *row, *col)? {
            if address.subpattern.is_some() {
                for text in walked.texts_in_cell(cell) {
                    collect_in_text(text, directive, &mut matches);
                }
            } else {
                matches.push(whole_cell_match(cell, walked, directive));
            }
        }
    }
    Ok(matches)
}

/// The whole-cell match keeps the cell's final paragraph marker in place:
/// deleting it would collapse the cell itself.
fn whole_cell_match(cell: &TableCell, walked: &Walk, directive: &Directive) -> TextMatch {
    let end = cell.end.saturating_sub(1).max(cell.start);
    let original: String = walked
        .texts_in_cell(cell)
        .iter()
        .map(|t| t.text.as_str())
        .collect();
    let original = original.trim_end_matches('\n').to_string();
    TextMatch {
        start: cell.start,
        end,
        replacement: directive.template.expand_whole(&original),
        original,
    }
}

fn whole_table_matches(
    walked: &Walk,
    directive: &Directive,
    table: &TableRef,
) -> Result<Vec<TextMatch>, Error> {
    Ok(resolve_tables(walked, *table)?
        .into_iter()
        .map(|t| TextMatch {
            start: t.start,
            end: t.end,
            original: String::new(),
            replacement: directive.template.expand_whole(""),
        })
        .collect())
}

/// Resolve a table reference against the walked snapshot.
pub fn resolve_tables<'a>(walked: &Walk<'a>, table: TableRef) -> Result<Vec<&'a Table>, Error> {
    let len = walked.tables.len();
    let indices: Vec<usize> = match table {
        TableRef::All => (0..len).collect(),
        TableRef::Nth(n) => vec![resolve_index(n, false, len, AddressKind::Table)?],
        TableRef::FromEnd(n) => vec![resolve_index(n, true, len, AddressKind::Table)?],
    };
    Ok(indices
        .into_iter()
        .filter_map(|i| walked.tables.get(i).copied())
        .collect())
}

/// Resolve the addressed cells of one table. Insert/append axes have no
/// existing cell to read and are rejected here; the compiler turns them into
/// structural inserts instead.
fn resolve_cells<'a>(table: &'a Table, row: Axis, col: Axis) -> Result<Vec<&'a TableCell>, Error> {
    let row_indices = resolve_axis(row, table.row_count(), AddressKind::Row)?;
    let mut cells = Vec::new();
    for r in row_indices {
        let Some(table_row) = table.rows.get(r) else {
            continue;
        };
        for c in resolve_axis(col, table_row.cells.len(), AddressKind::Column)? {
            if let Some(cell) = table_row.cells.get(c) {
                cells.push(cell);
            }
        }
    }
    Ok(cells)
}

/// Resolve one axis to concrete 0-based indices.
pub fn resolve_axis(axis: Axis, len: usize, kind: AddressKind) -> Result<Vec<usize>, Error> {
    match axis {
        Axis::Wildcard => Ok((0..len).collect()),
        Axis::Specific(n) => Ok(vec![resolve_index(n, false, len, kind)?]),
        Axis::FromEnd(n) => Ok(vec![resolve_index(n, true, len, kind)?]),
        Axis::InsertBefore(_) | Axis::Append => Err(Error::InvalidRange {
            kind,
            detail: "insert/append positions address no existing cell".to_string(),
        }),
    }
}

/// Turn a 1-based index (or 1-based distance from the end) into a 0-based
/// index, range-checked against `len`.
pub fn resolve_index(
    n: u32,
    from_end: bool,
    len: usize,
    kind: AddressKind,
) -> Result<usize, Error> {
    let n_us = n as usize;
    let out_of_range = Error::AddressOutOfRange {
        kind,
        index: if from_end { -i64::from(n) } else { i64::from(n) },
        len,
    };
    if n_us == 0 || n_us > len {
        return Err(out_of_range);
    }
    Ok(if from_end { len - n_us } else { n_us - 1 })
}

fn char_at(text: &str, byte: usize) -> usize {
    text.get(..byte).map_or(0, |prefix| prefix.chars().count())
}
