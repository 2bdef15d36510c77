//! Table, cell, and image addressing.
//!
//! Addresses select *where* a directive applies: `|2|` names the second table
//! in the document, `|2|[A1]` its top-left cell, `!(-1)` the last inline
//! image. Parsers here return `None` for strings that don't match any
//! recognized form so callers can fall through to plain-text semantics;
//! range checking against a live document happens later, in the engine.

use serde::{Deserialize, Serialize};

/// One axis of a cell address.
///
/// Indices are 1-based. There are no sentinel integers: "every row", "second
/// from the end", "insert before row 3", and "append" are distinct variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    Specific(u32),
    FromEnd(u32),
    Wildcard,
    InsertBefore(u32),
    Append,
}

/// A reference to a table by document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableRef {
    Nth(u32),
    FromEnd(u32),
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAxis {
    Row,
    Column,
}

/// A whole-row or whole-column operation: `row:3` deletes row 3, `row:+3`
/// inserts before it, `row:$+` appends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructuralOp {
    Delete(Axis),
    Insert(u32),
    Append,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellTarget {
    Cell { row: Axis, col: Axis },
    Merge { from: (u32, u32), to: (u32, u32) },
    Unmerge { from: (u32, u32), to: (u32, u32) },
    RowColOp { axis: TableAxis, op: StructuralOp },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAddress {
    pub table: TableRef,
    pub target: CellTarget,
    /// A sub-regex scoped to the addressed cell's contents; without it the
    /// directive replaces the whole cell.
    pub subpattern: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageAddress {
    Nth(u32),
    FromEnd(u32),
    All,
    AltPattern(String),
}

/// An image-insertion literal: `![alt](url "title"){width=W height=H}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub alt: String,
    pub url: String,
    pub title: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// A table-creation literal: `|RxC|`, `|RxC:header|`, or a pipe-table block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableSpec {
    Grid { rows: u32, cols: u32, header: bool },
    Literal { rows: Vec<Vec<String>>, header: bool },
}

/// An address recognized on the pattern side of a directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternAddress {
    Table(TableRef),
    Cell(CellAddress),
    Image(ImageAddress),
}

peg::parser! {
    grammar table_grammar() for str {
        rule num() -> u32
            = n:$(['0'..='9']+) {? n.parse().or(Err("number")) }

        rule table_ref() -> TableRef
            = "*" { TableRef::All }
            / "-" n:num() { TableRef::FromEnd(n) }
            / n:num() { TableRef::Nth(n) }

        pub rule table_ref_only() -> TableRef
            = t:table_ref() ![_] { t }

        pub rule table_pattern() -> TableRef
            = "|" t:table_ref() "|" ![_] { t }

        pub rule cell_address() -> CellAddress
            = "|" table:table_ref() "|" "[" target:target() "]" subpattern:subpattern()? {
                CellAddress { table, target, subpattern }
            }

        rule subpattern() -> String
            = ":" s:$([_]+) { s.to_string() }

        // Merge ranges must be tried before plain numeric cells: once a
        // plain `R,C` succeeds the outer rule will not reconsider it when
        // the following `:` fails to parse as part of the bracket.
        rule target() -> CellTarget
            = merge_range()
            / row_col_op()
            / numeric_cell()
            / a1_cell()

        rule merge_range() -> CellTarget
            = r1:num() "," c1:num() ":" r2:num() "," c2:num() unmerge:"!"? {
                if unmerge.is_some() {
                    CellTarget::Unmerge { from: (r1, c1), to: (r2, c2) }
                } else {
                    CellTarget::Merge { from: (r1, c1), to: (r2, c2) }
                }
            }

        rule row_col_op() -> CellTarget
            = axis:axis_name() ":" op:structural_op() { CellTarget::RowColOp { axis, op } }

        rule axis_name() -> TableAxis
            = "row" { TableAxis::Row }
            / "col" { TableAxis::Column }

        rule structural_op() -> StructuralOp
            = "$+" { StructuralOp::Append }
            / "+" n:num() { StructuralOp::Insert(n) }
            / "-" n:num() { StructuralOp::Delete(Axis::FromEnd(n)) }
            / n:num() { StructuralOp::Delete(Axis::Specific(n)) }

        rule numeric_cell() -> CellTarget
            = row:axis() "," col:axis() { CellTarget::Cell { row, col } }

        rule axis() -> Axis
            = "*" { Axis::Wildcard }
            / "$+" { Axis::Append }
            / "+" n:num() { Axis::InsertBefore(n) }
            / "-" n:num() { Axis::FromEnd(n) }
            / n:num() { Axis::Specific(n) }

        rule a1_cell() -> CellTarget
            = letters:$(['A'..='Z']+) row:num() {
                CellTarget::Cell {
                    row: Axis::Specific(row),
                    col: Axis::Specific(column_number(letters)),
                }
            }

        pub rule grid_spec() -> TableSpec
            = "|" rows:num() "x" cols:num() header:(":header" { true })? "|" ![_] {
                TableSpec::Grid { rows, cols, header: header.unwrap_or(false) }
            }
    }
}

fn column_number(letters: &str) -> u32 {
    letters
        .chars()
        .fold(0u32, |acc, ch| acc * 26 + (ch as u32 - 'A' as u32 + 1))
}

/// Parse a bare table reference: `2`, `-1`, `*`, optionally wrapped in pipes.
#[must_use]
pub fn parse_table_ref(value: &str) -> Option<TableRef> {
    let inner = value
        .strip_prefix('|')
        .and_then(|v| v.strip_suffix('|'))
        .unwrap_or(value);
    table_grammar::table_ref_only(inner).ok()
}

/// Parse a whole-string bare table pattern: `|N|`.
#[must_use]
pub fn parse_table_pattern(value: &str) -> Option<TableRef> {
    table_grammar::table_pattern(value).ok()
}

/// Parse a whole-string cell address: `|N|[...]` with an optional trailing
/// `:subpattern`.
#[must_use]
pub fn parse_cell_address(value: &str) -> Option<CellAddress> {
    table_grammar::cell_address(value).ok()
}

/// Parse a whole-string image address: `!(N)`, `!(-N)`, `!(*)`, `![regex]`.
///
/// Insertion literals (`![alt](url)`) are deliberately not addresses; they
/// fail here and are picked up by [`parse_image_literal`].
#[must_use]
pub fn parse_image_address(value: &str) -> Option<ImageAddress> {
    let rest = value.strip_prefix('!')?;
    if let Some(inner) = rest.strip_prefix('(') {
        let inner = inner.strip_suffix(')')?;
        if inner == "*" {
            return Some(ImageAddress::All);
        }
        if let Some(negated) = inner.strip_prefix('-') {
            return negated.parse().ok().map(ImageAddress::FromEnd);
        }
        return inner.parse().ok().map(ImageAddress::Nth);
    }
    let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return None;
    }
    Some(ImageAddress::AltPattern(inner.to_string()))
}

static IMAGE_LITERAL: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    crate::static_regex(r#"^!\[([^\]]*)\]\(\s*(\S+?)(?:\s+"([^"]*)")?\s*\)(?:\{([^}]*)\})?$"#)
});

/// Parse an image-insertion literal: `![alt](url "title"){width=W height=H}`.
#[must_use]
pub fn parse_image_literal(value: &str) -> Option<ImageSpec> {
    let caps = IMAGE_LITERAL.captures(value.trim())?;
    let mut spec = ImageSpec {
        alt: caps.get(1).map_or_else(String::new, |m| m.as_str().to_string()),
        url: caps.get(2)?.as_str().to_string(),
        title: caps.get(3).map(|m| m.as_str().to_string()),
        width: None,
        height: None,
    };
    if let Some(dims) = caps.get(4) {
        for token in dims.as_str().split_whitespace() {
            match token.split_once('=') {
                Some(("width", v)) => spec.width = v.parse().ok(),
                Some(("height", v)) => spec.height = v.parse().ok(),
                _ => return None,
            }
        }
    }
    Some(spec)
}

/// Parse a table-creation literal.
#[must_use]
pub fn parse_table_spec(value: &str) -> Option<TableSpec> {
    let trimmed = value.trim();
    if let Ok(grid) = table_grammar::grid_spec(trimmed) {
        return Some(grid);
    }
    parse_pipe_table(trimmed)
}

fn parse_pipe_table(value: &str) -> Option<TableSpec> {
    let lines: Vec<&str> = value.lines().map(str::trim).collect();
    if lines.len() < 2 {
        return None;
    }
    let mut rows = Vec::new();
    let mut header = false;
    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with('|') || !line.ends_with('|') || line.len() < 2 {
            return None;
        }
        let cells: Vec<String> = line
            .get(1..line.len() - 1)?
            .split('|')
            .map(|c| c.trim().to_string())
            .collect();
        if i == 1 && is_separator_row(&cells) {
            header = true;
            continue;
        }
        rows.push(cells);
    }
    let width = rows.first()?.len();
    if rows.iter().any(|r| r.len() != width) {
        return None;
    }
    Some(TableSpec::Literal { rows, header })
}

fn is_separator_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|c| {
            let body = c.trim_start_matches(':').trim_end_matches(':');
            !body.is_empty() && body.chars().all(|ch| ch == '-')
        })
}

/// Recognize any pattern-side address form, trying tables, cells, then
/// images.
#[must_use]
pub fn parse_pattern_address(value: &str) -> Option<PatternAddress> {
    if let Some(table) = parse_table_pattern(value) {
        return Some(PatternAddress::Table(table));
    }
    if let Some(cell) = parse_cell_address(value) {
        return Some(PatternAddress::Cell(cell));
    }
    parse_image_address(value).map(PatternAddress::Image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn bare_table_forms() {
        assert_eq!(parse_table_pattern("|2|"), Some(TableRef::Nth(2)));
        assert_eq!(parse_table_pattern("|-1|"), Some(TableRef::FromEnd(1)));
        assert_eq!(parse_table_pattern("|*|"), Some(TableRef::All));
        assert_eq!(parse_table_pattern("|2|[1,1]"), None);
        assert_eq!(parse_table_pattern("plain text"), None);
    }

    #[test]
    fn spreadsheet_style_cell() {
        let addr = parse_cell_address("|2|[A1]").unwrap();
        assert_eq!(addr.table, TableRef::Nth(2));
        assert_eq!(
            addr.target,
            CellTarget::Cell {
                row: Axis::Specific(1),
                col: Axis::Specific(1),
            }
        );
        assert_eq!(addr.subpattern, None);
    }

    #[rstest]
    #[case("AA1", 27, 1)]
    #[case("B3", 2, 3)]
    #[case("Z10", 26, 10)]
    fn a1_column_arithmetic(#[case] cell: &str, #[case] col: u32, #[case] row: u32) {
        let addr = parse_cell_address(&format!("|1|[{cell}]")).unwrap();
        assert_eq!(
            addr.target,
            CellTarget::Cell {
                row: Axis::Specific(row),
                col: Axis::Specific(col),
            }
        );
    }

    #[test]
    fn numeric_cell_with_wildcard_and_negative() {
        let addr = parse_cell_address("|1|[*,2]").unwrap();
        assert_eq!(
            addr.target,
            CellTarget::Cell {
                row: Axis::Wildcard,
                col: Axis::Specific(2),
            }
        );

        let addr = parse_cell_address("|1|[-1,$+]").unwrap();
        assert_eq!(
            addr.target,
            CellTarget::Cell {
                row: Axis::FromEnd(1),
                col: Axis::Append,
            }
        );
    }

    #[test]
    fn merge_and_unmerge_ranges() {
        let addr = parse_cell_address("|1|[1,1:2,2]").unwrap();
        assert_eq!(
            addr.target,
            CellTarget::Merge {
                from: (1, 1),
                to: (2, 2),
            }
        );

        let addr = parse_cell_address("|1|[1,1:2,2!]").unwrap();
        assert!(matches!(addr.target, CellTarget::Unmerge { .. }));
    }

    #[rstest]
    #[case("row:3", TableAxis::Row, StructuralOp::Delete(Axis::Specific(3)))]
    #[case("row:+2", TableAxis::Row, StructuralOp::Insert(2))]
    #[case("row:$+", TableAxis::Row, StructuralOp::Append)]
    #[case("col:-1", TableAxis::Column, StructuralOp::Delete(Axis::FromEnd(1)))]
    #[case("col:$+", TableAxis::Column, StructuralOp::Append)]
    fn row_and_column_operations(
        #[case] target: &str,
        #[case] axis: TableAxis,
        #[case] op: StructuralOp,
    ) {
        let addr = parse_cell_address(&format!("|1|[{target}]")).unwrap();
        assert_eq!(addr.target, CellTarget::RowColOp { axis, op });
    }

    #[test]
    fn subpattern_scopes_the_cell() {
        let addr = parse_cell_address("|1|[2,3]:v\\d+").unwrap();
        assert_eq!(addr.subpattern.as_deref(), Some("v\\d+"));
    }

    #[test]
    fn image_addresses() {
        assert_eq!(parse_image_address("!(3)"), Some(ImageAddress::Nth(3)));
        assert_eq!(parse_image_address("!(-1)"), Some(ImageAddress::FromEnd(1)));
        assert_eq!(parse_image_address("!(*)"), Some(ImageAddress::All));
        assert_eq!(
            parse_image_address("![logo.*]"),
            Some(ImageAddress::AltPattern("logo.*".to_string()))
        );
        // An insertion literal is not an address.
        assert_eq!(parse_image_address("![alt](http://x/y.png)"), None);
        assert_eq!(parse_image_address("plain"), None);
    }

    #[test]
    fn image_literal_with_title_and_dimensions() {
        let spec =
            parse_image_literal(r#"![diagram](https://x/d.png "Fig. 1"){width=320 height=200}"#)
                .unwrap();
        assert_eq!(spec.alt, "diagram");
        assert_eq!(spec.url, "https://x/d.png");
        assert_eq!(spec.title.as_deref(), Some("Fig. 1"));
        assert_eq!(spec.width, Some(320.0));
        assert_eq!(spec.height, Some(200.0));
    }

    #[test]
    fn image_literal_minimal() {
        let spec = parse_image_literal("![](https://x/d.png)").unwrap();
        assert_eq!(spec.alt, "");
        assert_eq!(spec.width, None);
    }

    #[test]
    fn grid_table_specs() {
        assert_eq!(
            parse_table_spec("|3x4|"),
            Some(TableSpec::Grid {
                rows: 3,
                cols: 4,
                header: false,
            })
        );
        assert_eq!(
            parse_table_spec("|2x2:header|"),
            Some(TableSpec::Grid {
                rows: 2,
                cols: 2,
                header: true,
            })
        );
        assert_eq!(parse_table_spec("|3x|"), None);
    }

    #[test]
    fn pipe_table_literal() {
        let spec = parse_table_spec("| a | b |\n|---|---|\n| 1 | 2 |").unwrap();
        assert_eq!(
            spec,
            TableSpec::Literal {
                rows: vec![
                    vec!["a".to_string(), "b".to_string()],
                    vec!["1".to_string(), "2".to_string()],
                ],
                header: true,
            }
        );
    }

    #[test]
    fn ragged_pipe_table_rejected() {
        assert_eq!(parse_table_spec("| a | b |\n| 1 |"), None);
    }

    #[test]
    fn unrecognized_addresses_are_none_not_errors() {
        assert_eq!(parse_pattern_address("hello |world|!"), None);
        assert_eq!(parse_cell_address("|x|[1,1]"), None);
    }
}
