use std::fmt;

use crate::service::ServiceError;

/// Which execution phase a failure surfaced in. A phase failure aborts the
/// remaining phases without rollback, so the phase name is what tells the
/// caller how far the document got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Images,
    Primary,
    ParagraphStyles,
    Footnotes,
    Breaks,
    Structural,
    CellUpdate,
    TableCreate,
    Native,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Fetch => "fetch",
            Phase::Images => "images",
            Phase::Primary => "primary",
            Phase::ParagraphStyles => "paragraph-styles",
            Phase::Footnotes => "footnotes",
            Phase::Breaks => "breaks",
            Phase::Structural => "structural",
            Phase::CellUpdate => "cell-update",
            Phase::TableCreate => "table-create",
            Phase::Native => "native",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressKind {
    Table,
    Row,
    Column,
    Image,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressKind::Table => "table",
            AddressKind::Row => "row",
            AddressKind::Column => "column",
            AddressKind::Image => "image",
        };
        f.write_str(name)
    }
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{kind} index {index} is out of range; the document has {len}")]
    AddressOutOfRange {
        kind: AddressKind,
        index: i64,
        len: usize,
    },

    #[error("invalid {kind} range: {detail}")]
    InvalidRange { kind: AddressKind, detail: String },

    #[error("invalid alt-text pattern: {0}")]
    AltPattern(#[from] regex::Error),

    #[error("invalid cell subpattern: {0}")]
    Subpattern(String),

    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl Error {
    pub(crate) fn phase(phase: Phase) -> impl FnOnce(ServiceError) -> Self {
        move |source| Self::Phase { phase, source }
    }

    /// The phase the failure surfaced in, if it came from a network call.
    #[must_use]
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            Self::AddressOutOfRange { .. }
            | Self::InvalidRange { .. }
            | Self::AltPattern(_)
            | Self::Subpattern(_)
            | Self::Service(_) => None,
        }
    }
}
