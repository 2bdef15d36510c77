//! Primitive edit operations and their wire form.
//!
//! An [`EditOperation`] is one primitive mutation sent to the document
//! service; a batch of them makes one `batchMutate` call. All offsets are
//! absolute character positions in the snapshot coordinates the batch was
//! compiled against.

use serde::{Deserialize, Serialize};

use docsed_parser::{Alignment, AttributeSet, BreakKind, TagKind, ToggleKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditOperation {
    DeleteRange {
        start: usize,
        end: usize,
    },
    InsertText {
        at: usize,
        text: String,
        /// Present when inserting into a non-body segment, e.g. a footnote.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        segment: Option<String>,
    },
    SetTextStyle {
        start: usize,
        end: usize,
        style: TextStyle,
    },
    SetParagraphStyle {
        start: usize,
        end: usize,
        style: ParagraphStyle,
    },
    InsertInlineImage {
        at: usize,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    InsertTable {
        at: usize,
        rows: u32,
        columns: u32,
    },
    InsertTableRow {
        table_start: usize,
        /// 1-based row the new row lands before; `row_count + 1` appends.
        before: u32,
    },
    DeleteTableRow {
        table_start: usize,
        row: u32,
    },
    InsertTableColumn {
        table_start: usize,
        before: u32,
    },
    DeleteTableColumn {
        table_start: usize,
        column: u32,
    },
    MergeCells {
        table_start: usize,
        row: u32,
        column: u32,
        row_span: u32,
        column_span: u32,
    },
    UnmergeCells {
        table_start: usize,
        row: u32,
        column: u32,
        row_span: u32,
        column_span: u32,
    },
    InsertBreak {
        at: usize,
        kind: BreakKind,
    },
    CreateNamedRange {
        name: String,
        start: usize,
        end: usize,
    },
    CreateFootnote {
        at: usize,
    },
    InsertPersonChip {
        at: usize,
        email: String,
    },
    ApplyBulletPreset {
        start: usize,
        end: usize,
        preset: BulletPreset,
    },
    UpdateSectionColumns {
        at: usize,
        count: u32,
    },
    InsertTableOfContents {
        at: usize,
        depth: u8,
    },
    AttachComment {
        start: usize,
        end: usize,
        text: String,
    },
    /// The service's built-in literal find-replace. Used by the batch
    /// planner's `native` class only; it touches the whole document in one
    /// server-side pass.
    ReplaceAllText {
        pattern: String,
        replacement: String,
        match_case: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulletPreset {
    Disc,
    Decimal,
    Checkbox { checked: bool },
}

/// Character-level style for a range. `None` leaves the property untouched;
/// `Some(false)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextStyle {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strike: Option<bool>,
    pub code: Option<bool>,
    pub superscript: Option<bool>,
    pub subscript: Option<bool>,
    pub small_caps: Option<bool>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub font: Option<String>,
    pub size: Option<f64>,
    pub link: Option<String>,
    pub effect: Option<String>,
}

impl TextStyle {
    #[must_use]
    pub fn from_attributes(attrs: &AttributeSet) -> Self {
        Self {
            bold: attrs.bold,
            italic: attrs.italic,
            underline: attrs.underline,
            strike: attrs.strike,
            code: attrs.code,
            superscript: attrs.superscript,
            subscript: attrs.subscript,
            small_caps: attrs.small_caps,
            foreground: attrs.foreground.clone(),
            background: attrs.background.clone(),
            font: attrs.font.clone(),
            size: attrs.size,
            link: attrs.link.clone(),
            effect: attrs.effect.clone(),
        }
    }

    #[must_use]
    pub fn from_toggles(flags: &[ToggleKind]) -> Self {
        let mut style = Self::default();
        for flag in flags {
            style.set_toggle(*flag, true);
        }
        style
    }

    pub fn set_toggle(&mut self, kind: ToggleKind, on: bool) {
        match kind {
            ToggleKind::Bold => self.bold = Some(on),
            ToggleKind::Italic => self.italic = Some(on),
            ToggleKind::Underline => self.underline = Some(on),
            ToggleKind::Strike => self.strike = Some(on),
            ToggleKind::Code => self.code = Some(on),
            ToggleKind::Superscript => self.superscript = Some(on),
            ToggleKind::Subscript => self.subscript = Some(on),
            ToggleKind::SmallCaps => self.small_caps = Some(on),
        }
    }

    /// Apply a markdown text-level tag.
    pub fn apply_tag(&mut self, tag: &TagKind) {
        match tag {
            TagKind::Bold => self.bold = Some(true),
            TagKind::Italic => self.italic = Some(true),
            TagKind::Strike => self.strike = Some(true),
            TagKind::Code | TagKind::CodeBlock(_) => self.code = Some(true),
            TagKind::Link(url) => self.link = Some(url.clone()),
            TagKind::Heading(_)
            | TagKind::Bullet(_)
            | TagKind::Numbered(_)
            | TagKind::Quote
            | TagKind::HorizontalRule
            | TagKind::Footnote => {}
        }
    }

    /// Fill every unset toggle with an explicit `false`, so the styled range
    /// comes out deterministic regardless of the document's prior formatting.
    #[must_use]
    pub fn filled_reset(mut self) -> Self {
        for kind in [
            ToggleKind::Bold,
            ToggleKind::Italic,
            ToggleKind::Underline,
            ToggleKind::Strike,
            ToggleKind::Code,
            ToggleKind::Superscript,
            ToggleKind::Subscript,
            ToggleKind::SmallCaps,
        ] {
            if self.toggle(kind).is_none() {
                self.set_toggle(kind, false);
            }
        }
        self
    }

    #[must_use]
    pub fn toggle(&self, kind: ToggleKind) -> Option<bool> {
        match kind {
            ToggleKind::Bold => self.bold,
            ToggleKind::Italic => self.italic,
            ToggleKind::Underline => self.underline,
            ToggleKind::Strike => self.strike,
            ToggleKind::Code => self.code,
            ToggleKind::Superscript => self.superscript,
            ToggleKind::Subscript => self.subscript,
            ToggleKind::SmallCaps => self.small_caps,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Paragraph-level style for a range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParagraphStyle {
    /// 0 clears the heading back to normal text.
    pub heading: Option<u8>,
    pub alignment: Option<Alignment>,
    pub indent: Option<u8>,
    pub line_spacing: Option<f64>,
    pub space_above: Option<f64>,
    pub space_below: Option<f64>,
}

impl ParagraphStyle {
    #[must_use]
    pub fn from_attributes(attrs: &AttributeSet) -> Self {
        Self {
            heading: attrs.heading,
            alignment: attrs.alignment,
            indent: attrs.indent,
            line_spacing: attrs.line_spacing,
            space_above: attrs.paragraph_spacing.map(|(above, _)| above),
            space_below: attrs.paragraph_spacing.map(|(_, below)| below),
        }
    }

    /// Apply a markdown paragraph-level tag. Quotes render as one indent
    /// level.
    pub fn apply_tag(&mut self, tag: &TagKind) {
        match tag {
            TagKind::Heading(level) => self.heading = Some(*level),
            TagKind::Quote => self.indent = Some(1),
            TagKind::Bold
            | TagKind::Italic
            | TagKind::Strike
            | TagKind::Code
            | TagKind::Link(_)
            | TagKind::Bullet(_)
            | TagKind::Numbered(_)
            | TagKind::CodeBlock(_)
            | TagKind::HorizontalRule
            | TagKind::Footnote => {}
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One reply from a `batchMutate` call, aligned index-for-index with the
/// submitted operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Reply {
    pub footnote_id: Option<String>,
    pub named_range_id: Option<String>,
    pub occurrences_changed: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operation_wire_form_is_tagged() {
        let op = EditOperation::InsertText {
            at: 5,
            text: "hi".to_string(),
            segment: None,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "insertText");
        assert_eq!(json["at"], 5);
        assert!(json.get("segment").is_none());
    }

    #[test]
    fn filled_reset_disables_unset_toggles_only() {
        let mut style = TextStyle::default();
        style.bold = Some(true);
        let filled = style.filled_reset();
        assert_eq!(filled.bold, Some(true));
        assert_eq!(filled.italic, Some(false));
        assert_eq!(filled.subscript, Some(false));
    }

    #[test]
    fn paragraph_style_from_spacing_pair() {
        let (attrs, _) = AttributeSet::parse("ps=6,12 align=right").unwrap();
        let style = ParagraphStyle::from_attributes(&attrs);
        assert_eq!(style.space_above, Some(6.0));
        assert_eq!(style.space_below, Some(12.0));
        assert_eq!(style.alignment, Some(Alignment::Right));
    }
}
