// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Cell, row and chunk value types
//!
//! Keys, qualifiers and values are `bytes::Bytes`: row keys are arbitrary
//! byte strings ordered lexicographically, and `Bytes` lets a committed row
//! share buffers with the chunks it was assembled from.

use bytes::Bytes;

/// Row keys are arbitrary bytes, ordered byte-lexicographically.
pub type RowKey = Bytes;

/// A single cell of a row: one (family, qualifier, timestamp) coordinate
/// and its value. Immutable once constructed; built only by the parser
/// after every fragment of the cell has been consolidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    row_key: RowKey,
    family: String,
    qualifier: Bytes,
    timestamp_micros: i64,
    value: Bytes,
    labels: Vec<String>,
}

impl Cell {
    pub(crate) fn new(
        row_key: RowKey,
        family: String,
        qualifier: Bytes,
        timestamp_micros: i64,
        value: Bytes,
        labels: Vec<String>,
    ) -> Self {
        Self {
            row_key,
            family,
            qualifier,
            timestamp_micros,
            value,
            labels,
        }
    }

    pub fn row_key(&self) -> &RowKey {
        &self.row_key
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn qualifier(&self) -> &Bytes {
        &self.qualifier
    }

    /// Cell timestamp in microseconds.
    pub fn timestamp_micros(&self) -> i64 {
        self.timestamp_micros
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// A complete row: key plus cells in delivery order (family, then
/// qualifier, then timestamp descending, as the server sends them).
///
/// Invariant: every cell's row key equals the row's key. Rows are produced
/// atomically at a commit boundary and never partially exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    key: RowKey,
    cells: Vec<Cell>,
}

impl Row {
    pub(crate) fn new(key: RowKey, cells: Vec<Cell>) -> Self {
        debug_assert!(cells.iter().all(|c| *c.row_key() == key));
        Self { key, cells }
    }

    pub fn key(&self) -> &RowKey {
        &self.key
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }
}

/// One fragment of the read-rows response stream, as handed over by the
/// transport layer.
///
/// Fields other than the control flags are sent sparsely: an empty
/// `row_key` and `None` family/qualifier mean "unchanged from the previous
/// chunk". `value_size` is non-zero while more fragments of the current
/// cell follow; a chunk with `value_size == 0` completes the cell it
/// belongs to.
#[derive(Debug, Clone, Default)]
pub struct CellChunk {
    /// Row key, or empty if unchanged from the previous chunk.
    pub row_key: Bytes,
    /// Column family, set only when it changes.
    pub family: Option<String>,
    /// Column qualifier, set only when it changes.
    pub qualifier: Option<Bytes>,
    /// Cell timestamp in microseconds. Only the first fragment of a cell
    /// is authoritative; continuations are ignored.
    pub timestamp_micros: i64,
    /// Cell labels; only the first fragment of a cell is authoritative.
    pub labels: Vec<String>,
    /// Value fragment, possibly empty.
    pub value: Bytes,
    /// Total remaining value size if more fragments follow, 0 if this
    /// fragment completes the cell.
    pub value_size: usize,
    /// Discard everything accumulated for the current row.
    pub reset_row: bool,
    /// The current row is complete and ready to emit.
    pub commit_row: bool,
}
