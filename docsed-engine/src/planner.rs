//! Grouping directives to minimize network round trips.
//!
//! Classification never changes what lands in the document, only how the
//! operations are batched: plain literal global substitutes lower to the
//! service's native find-replace and can share one call, simple whole-cell
//! updates against the same table coalesce into one batched cell update, and
//! everything else runs through the full compiler on its own.

use docsed_parser::{
    Axis, CellTarget, Directive, DirectiveKind, parse_image_literal, parse_table_spec, render,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionClass {
    /// Anchors at document start or end; inserts without matching content.
    Positional,
    /// Delete / append / insert / transliterate.
    Command,
    /// A single-cell or whole-table operation.
    Cell,
    /// Inserts or replaces an inline image.
    Image,
    /// The replacement is a bare `RxC` or pipe-table literal.
    TableCreate,
    /// Plain-text global substitute, eligible for the service's built-in
    /// find-replace primitive.
    Native,
    /// Needs the full operation compiler.
    Manual,
}

/// One planned network-trip grouping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub class: InstructionClass,
    /// Indices into the submitted directive slice, in submission order.
    pub indices: Vec<usize>,
}

/// Classify one directive.
#[must_use]
pub fn classify_directive(directive: &Directive) -> InstructionClass {
    if directive.image.is_some()
        || directive
            .attributes
            .as_ref()
            .is_some_and(|a| a.image.is_some())
        || directive
            .template
            .as_literal()
            .is_some_and(|lit| parse_image_literal(&lit).is_some())
    {
        return InstructionClass::Image;
    }
    if directive.kind == DirectiveKind::Substitute
        && directive.cell.is_none()
        && directive.table.is_none()
        && directive
            .template
            .as_literal()
            .is_some_and(|lit| parse_table_spec(&lit).is_some())
    {
        return InstructionClass::TableCreate;
    }
    if directive.cell.is_some() || directive.table.is_some() {
        return InstructionClass::Cell;
    }
    if matches!(directive.raw_pattern.as_str(), "^" | "$" | r"\A" | r"\z") {
        return InstructionClass::Positional;
    }
    if directive.kind != DirectiveKind::Substitute {
        return InstructionClass::Command;
    }
    if native_eligible(directive) {
        return InstructionClass::Native;
    }
    InstructionClass::Manual
}

/// Native find-replace works on literal text, globally, with no formatting:
/// anything richer needs compiled operations.
fn native_eligible(directive: &Directive) -> bool {
    if !directive.global
        || directive.nth_match.is_some()
        || directive.attributes.is_some()
        || !directive.spans.is_empty()
    {
        return false;
    }
    if !is_plain_literal(&directive.raw_pattern) {
        return false;
    }
    let Some(replacement) = directive.template.as_literal() else {
        return false;
    };
    let rendered = render(&replacement);
    !rendered.has_formatting() && rendered.text == replacement
}

/// No regex metacharacters and no escapes: the pattern means itself.
fn is_plain_literal(pattern: &str) -> bool {
    !pattern.chars().any(|c| {
        matches!(
            c,
            '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$'
        )
    })
}

/// Whether a cell directive is a simple whole-cell replacement that can join
/// a shared batch: concrete axes, no sub-pattern, no structural operation,
/// and nothing that would compile beyond a plain delete/insert pair.
fn coalescable_cell(directive: &Directive) -> Option<&docsed_parser::CellAddress> {
    if directive.attributes.is_some() || !directive.spans.is_empty() {
        return None;
    }
    let replacement = directive.template.as_literal()?;
    if render(&replacement).has_formatting() {
        return None;
    }
    let address = directive.cell.as_ref()?;
    if address.subpattern.is_some() {
        return None;
    }
    match address.target {
        CellTarget::Cell { row, col } => {
            let concrete =
                |axis: Axis| matches!(axis, Axis::Specific(_) | Axis::FromEnd(_));
            (concrete(row) && concrete(col)).then_some(address)
        }
        CellTarget::Merge { .. } | CellTarget::Unmerge { .. } | CellTarget::RowColOp { .. } => {
            None
        }
    }
}

/// Plan the execution groups for one submission, preserving submission
/// order. Only adjacent directives merge, so a later directive can never be
/// applied before an earlier one that might affect it.
#[tracing::instrument(level = "debug", skip(directives), fields(count = directives.len()))]
#[must_use]
pub fn plan(directives: &[Directive]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for (index, directive) in directives.iter().enumerate() {
        let class = classify_directive(directive);
        if let Some(last) = groups.last_mut()
            && can_merge(last, class, directives, index)
        {
            last.indices.push(index);
            continue;
        }
        groups.push(Group {
            class,
            indices: vec![index],
        });
    }
    groups
}

fn can_merge(last: &Group, class: InstructionClass, directives: &[Directive], index: usize) -> bool {
    if last.class != class {
        return false;
    }
    match class {
        InstructionClass::Native => true,
        InstructionClass::Cell => {
            let Some(current) = directives.get(index).and_then(|d| coalescable_cell(d)) else {
                return false;
            };
            last.indices
                .iter()
                .filter_map(|i| directives.get(*i))
                .all(|prev| {
                    coalescable_cell(prev).is_some_and(|p| p.table == current.table)
                })
        }
        InstructionClass::Positional
        | InstructionClass::Command
        | InstructionClass::Image
        | InstructionClass::TableCreate
        | InstructionClass::Manual => false,
    }
}
