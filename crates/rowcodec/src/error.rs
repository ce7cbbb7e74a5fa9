// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Protocol violation errors raised by the chunk parser

use thiserror::Error;

/// A malformed or out-of-order chunk sequence.
///
/// The parser never retries; it classifies and reports. Whether a protocol
/// error is worth another attempt is decided by the caller driving the
/// stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("out of order row key: {got} does not sort after {last}")]
    OutOfOrderRowKey { last: String, got: String },

    #[error("column family {family} introduced without a qualifier")]
    FamilyWithoutQualifier { family: String },

    #[error("missing row key at the first cell of a row")]
    MissingRowKey,

    #[error("row key changed mid-row: expected {expected}, got {got}")]
    RowKeyChanged { expected: String, got: String },

    #[error("reset_row with an unfinished cell")]
    ResetMidCell,

    #[error("bare reset_row: nothing accumulated for the current row")]
    BareReset,

    #[error("chunk sets both reset_row and commit_row")]
    ResetWithCommit,

    #[error("commit_row with an unfinished cell")]
    CommitMidCell,

    #[error("commit_row with no completed cells")]
    CommitWithoutCells,

    #[error("end of stream with an unfinished cell")]
    UnfinishedCellAtEnd,

    #[error("end of stream with uncommitted cells for row {row_key}")]
    UnfinishedRowAtEnd { row_key: String },

    #[error("chunk delivered before the previous row was taken")]
    RowPending,

    #[error("chunk delivered after end of stream")]
    ChunkAfterEndOfStream,
}

/// Printable form of a row key for error messages. Keys are arbitrary
/// bytes; non-ASCII is escaped rather than dropped.
pub(crate) fn printable(key: &[u8]) -> String {
    format!("\"{}\"", key.escape_ascii())
}
