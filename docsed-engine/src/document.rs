//! The fetched document snapshot.
//!
//! A document is an ordered tree of paragraphs, tables, and section breaks,
//! each spanning an absolute `[start, end)` character range. Offsets are
//! authoritative only for the snapshot they were read from: every committed
//! mutation invalidates them, which is why the engine re-fetches between
//! phases that depend on earlier phases' edits.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub body: Vec<Node>,
}

impl Document {
    /// One past the last character of the body.
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.body.last().map_or(0, Node::end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Paragraph(Paragraph),
    Table(Table),
    SectionBreak(SectionBreak),
}

impl Node {
    #[must_use]
    pub fn start(&self) -> usize {
        match self {
            Node::Paragraph(p) => p.start,
            Node::Table(t) => t.start,
            Node::SectionBreak(s) => s.start,
        }
    }

    #[must_use]
    pub fn end(&self) -> usize {
        match self {
            Node::Paragraph(p) => p.end,
            Node::Table(t) => t.end,
            Node::SectionBreak(s) => s.end,
        }
    }
}

/// A paragraph: ordered text runs plus any inline image anchors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub runs: Vec<TextRun>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<InlineImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub start: usize,
    pub text: String,
}

/// An inline image occupies exactly one character position in its paragraph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub at: usize,
    #[serde(default)]
    pub alt: String,
    pub object_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

impl Table {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count of the widest row; merged cells can make rows ragged.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<TableCell>,
}

/// A cell recursively holds its own node list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub body: Vec<Node>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBreak {
    pub start: usize,
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_roundtrips_through_json() {
        let doc = Document {
            id: "doc-1".to_string(),
            revision: Some("r7".to_string()),
            body: vec![
                Node::Paragraph(Paragraph {
                    start: 0,
                    end: 6,
                    runs: vec![TextRun {
                        start: 0,
                        text: "hello\n".to_string(),
                    }],
                    images: Vec::new(),
                }),
                Node::SectionBreak(SectionBreak { start: 6, end: 7 }),
            ],
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.end_offset(), 7);
    }

    #[test]
    fn node_type_tags_deserialize() {
        let json = r#"{
            "id": "d",
            "body": [
                {"type": "paragraph", "start": 0, "end": 2, "runs": [{"start": 0, "text": "a\n"}]},
                {"type": "table", "start": 2, "end": 10, "rows": []}
            ]
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert!(matches!(doc.body[0], Node::Paragraph(_)));
        assert!(matches!(doc.body[1], Node::Table(_)));
    }
}
