// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The chunk-to-row reassembly state machine
//!
//! The parser is driven one chunk at a time by whoever owns the transport
//! stream. It accumulates fragments into a pending cell, finished cells
//! into the row in progress, and exposes at most one committed row at a
//! time through [`ChunkParser::take_row`].
//!
//! Invariant: row keys across the entire stream are strictly increasing in
//! byte order. Cell order within a row is trusted as delivered; the parser
//! validates only the row-key monotonicity.

use bytes::{Bytes, BytesMut};
use diagnostics::{log_debug, log_warn};

use crate::error::{ProtocolError, printable};
use crate::model::{Cell, CellChunk, Row, RowKey};

/// Accumulator for the cell currently being assembled.
///
/// Row key, family and qualifier stick across cell boundaries (chunks only
/// carry them when they change); value and labels belong to one cell and
/// are moved out when the cell completes. A single owned struct, reset in
/// place.
#[derive(Default)]
struct PendingCell {
    row_key: Bytes,
    family: String,
    qualifier: Bytes,
    timestamp_micros: i64,
    labels: Vec<String>,
    value: BytesMut,
}

impl PendingCell {
    /// Move the finished cell out, keeping the sticky coordinates for the
    /// next cell to inherit.
    fn complete(&mut self) -> Cell {
        Cell::new(
            self.row_key.clone(),
            self.family.clone(),
            self.qualifier.clone(),
            self.timestamp_micros,
            self.value.split().freeze(),
            std::mem::take(&mut self.labels),
        )
    }

    /// Drop everything, including the sticky coordinates. Used on
    /// reset_row, after which the server re-sends the row from scratch.
    fn clear(&mut self) {
        *self = PendingCell::default();
    }
}

/// Reassembles a stream of [`CellChunk`]s into complete [`Row`]s.
///
/// Single-owner, non-reentrant: one parser per in-flight stream, driven by
/// one logical thread of control. Protocol violations are reported as
/// [`ProtocolError`]; rows already marked ready stay retrievable after an
/// error.
pub struct ChunkParser {
    cell: PendingCell,
    /// True when the next chunk starts a new cell (we are at a cell
    /// boundary).
    cell_first_chunk: bool,
    /// Key the current row committed to, established when its first cell
    /// completes. Empty while no cell has completed.
    row_key: Bytes,
    /// Cells finished for the current row but not yet committed.
    cells: Vec<Cell>,
    /// Highest row key emitted so far across the whole stream.
    last_emitted_key: Bytes,
    ready: Option<Row>,
    end_of_stream: bool,
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: PendingCell::default(),
            cell_first_chunk: true,
            row_key: Bytes::new(),
            cells: Vec::new(),
            last_emitted_key: Bytes::new(),
            ready: None,
            end_of_stream: false,
        }
    }

    /// Consume one chunk of the response stream.
    ///
    /// May finish the pending cell, commit the row in progress, or discard
    /// accumulated state on reset_row. A single chunk can do several of
    /// these at once: finish a cell and commit the row, for example.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] on malformed or out-of-order input, and on
    /// driver-contract violations (a chunk delivered while a ready row is
    /// pending, or after end of stream).
    pub fn handle_chunk(&mut self, chunk: CellChunk) -> Result<(), ProtocolError> {
        if self.end_of_stream {
            return Err(ProtocolError::ChunkAfterEndOfStream);
        }
        if self.ready.is_some() {
            return Err(ProtocolError::RowPending);
        }

        if chunk.reset_row {
            return self.handle_reset(&chunk);
        }

        if !chunk.row_key.is_empty() {
            if chunk.row_key <= self.last_emitted_key {
                return Err(ProtocolError::OutOfOrderRowKey {
                    last: printable(&self.last_emitted_key),
                    got: printable(&chunk.row_key),
                });
            }
            self.cell.row_key = chunk.row_key;
        }

        if let Some(family) = chunk.family {
            if chunk.qualifier.is_none() {
                return Err(ProtocolError::FamilyWithoutQualifier { family });
            }
            self.cell.family = family;
        }
        if let Some(qualifier) = chunk.qualifier {
            self.cell.qualifier = qualifier;
        }

        // Only the first fragment of a cell carries its timestamp and
        // labels; continuations contribute value bytes and nothing else.
        if self.cell_first_chunk {
            self.cell.timestamp_micros = chunk.timestamp_micros;
            self.cell.labels = chunk.labels;
            if chunk.value_size > 0 {
                self.cell.value.reserve(chunk.value_size);
            }
        }
        self.cell.value.extend_from_slice(&chunk.value);

        if chunk.value_size > 0 {
            // More fragments of this cell follow.
            self.cell_first_chunk = false;
            if chunk.commit_row {
                return Err(ProtocolError::CommitMidCell);
            }
            return Ok(());
        }

        // This fragment completes the cell.
        if self.cells.is_empty() {
            if self.cell.row_key.is_empty() {
                return Err(ProtocolError::MissingRowKey);
            }
            self.row_key = self.cell.row_key.clone();
        } else if self.row_key != self.cell.row_key {
            return Err(ProtocolError::RowKeyChanged {
                expected: printable(&self.row_key),
                got: printable(&self.cell.row_key),
            });
        }
        self.cells.push(self.cell.complete());
        self.cell_first_chunk = true;

        if chunk.commit_row {
            self.commit_row()?;
        }
        Ok(())
    }

    /// Signal that the transport stream ended cleanly.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] if a cell is partially accumulated or the
    /// current row was never committed.
    pub fn handle_end_of_stream(&mut self) -> Result<(), ProtocolError> {
        self.end_of_stream = true;
        if !self.cell_first_chunk {
            return Err(ProtocolError::UnfinishedCellAtEnd);
        }
        if !self.cells.is_empty() {
            return Err(ProtocolError::UnfinishedRowAtEnd {
                row_key: printable(&self.row_key),
            });
        }
        Ok(())
    }

    /// True iff a committed row is waiting to be taken.
    pub fn has_next(&self) -> bool {
        self.ready.is_some()
    }

    /// Take the ready row, if any. Ownership transfers to the caller.
    pub fn take_row(&mut self) -> Option<Row> {
        self.ready.take()
    }

    /// Key of the last row emitted, empty if none yet. This is the resume
    /// point after a stream failure.
    pub fn last_emitted_key(&self) -> &RowKey {
        &self.last_emitted_key
    }

    fn handle_reset(&mut self, chunk: &CellChunk) -> Result<(), ProtocolError> {
        if chunk.commit_row {
            return Err(ProtocolError::ResetWithCommit);
        }
        if !self.cell_first_chunk {
            // Partial value accumulated; resets are only legal at cell
            // boundaries.
            return Err(ProtocolError::ResetMidCell);
        }
        if self.cells.is_empty() {
            return Err(ProtocolError::BareReset);
        }
        log_debug!(
            "discarding row in progress on reset_row: {row_key}",
            row_key: printable(&self.row_key)
        );
        if !chunk.row_key.is_empty() || chunk.family.is_some() || !chunk.value.is_empty() {
            log_warn!("reset_row chunk carries data; discarded with the row");
        }
        self.cells.clear();
        self.cell.clear();
        self.row_key = Bytes::new();
        self.cell_first_chunk = true;
        Ok(())
    }

    fn commit_row(&mut self) -> Result<(), ProtocolError> {
        if self.cells.is_empty() {
            return Err(ProtocolError::CommitWithoutCells);
        }
        let key = std::mem::take(&mut self.row_key);
        self.last_emitted_key = key.clone();
        // The next row must re-establish its key; everything else may be
        // inherited across the commit.
        self.cell.row_key = Bytes::new();
        log_debug!(
            "row committed: {row_key} with {cells} cells",
            row_key: printable(&key),
            cells: self.cells.len()
        );
        self.ready = Some(Row::new(key, std::mem::take(&mut self.cells)));
        Ok(())
    }
}
