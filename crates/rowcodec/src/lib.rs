// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! rowcodec - chunk-to-row reassembly for streaming row reads
//!
//! A tablet server delivers rows as a stream of cell chunks: fragments of
//! cell data that may be split at arbitrary points by the transport. This
//! crate reassembles those chunks into complete, ordered [`Row`] values and
//! rejects malformed streams as early as possible.
//!
//! The parser is pure state-machine code: no I/O, no retries. Resumption and
//! retry live in the `rowclient` crate, which drives this parser one chunk
//! at a time.
//!
//! Set ROWBOAT_LOG=debug for per-row parse diagnostics.

// Cell, Row and chunk value types
pub mod model;

// The reassembly state machine
pub mod parser;

// Protocol violation errors
pub mod error;

pub use error::ProtocolError;
pub use model::{Cell, CellChunk, Row, RowKey};
pub use parser::ChunkParser;
