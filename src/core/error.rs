use serde::Serialize;
use thiserror::Error;

use super::InputKind;

/// A line that could not be used. Parsing carries on without it.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    #[error("line {line}: expected 2, 4 or 14 tokens, found {found}")]
    UnexpectedTokenCount { line: usize, found: usize },

    #[error("line {line}: node {node} has an invalid {field} value {value:?}")]
    InvalidMetric {
        line: usize,
        node: String,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: job line dropped along with rejected node {node}")]
    RejectedNodeContinuation { line: usize, node: String },

    #[error("line {line}: expected at least 6 process columns, found {found}")]
    ShortProcessLine { line: usize, found: usize },

    #[error("line {line}: invalid {field} value {value:?}")]
    InvalidProcessField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// The snapshot cannot be attributed safely and must be discarded whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("line {line}: continuation line {text:?} has no preceding node header")]
    OrphanContinuation { line: usize, text: String },
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{input} snapshot is invalid")]
    Snapshot {
        input: InputKind,
        #[source]
        source: SnapshotError,
    },
}
