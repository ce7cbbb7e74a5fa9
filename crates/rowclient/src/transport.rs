// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The traits the core consumes from the transport layer
//!
//! The real transport is an RPC stub owned elsewhere; everything the core
//! needs from it is "open a chunk stream", "open a mutation result
//! stream" and "close early". Tests substitute the scripted transports in
//! [`crate::testing`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use rowcodec::CellChunk;

use crate::error::TransportError;
use crate::mutation::RowMutation;
use crate::rowset::RowSet;
use crate::status::RpcStatus;

/// A streaming read request: which table, which rows, how many at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRowsRequest {
    pub table_name: String,
    /// Routing profile forwarded to the service, empty for the default.
    pub app_profile: String,
    pub rows: RowSet,
    /// Cap on rows delivered across all attempts. None means unlimited.
    pub rows_limit: Option<u64>,
}

impl ReadRowsRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            app_profile: String::new(),
            rows: RowSet::all(),
            rows_limit: None,
        }
    }

    #[must_use]
    pub fn with_rows(mut self, rows: RowSet) -> Self {
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn with_rows_limit(mut self, limit: u64) -> Self {
        self.rows_limit = Some(limit);
        self
    }
}

/// A batch mutation request: ordered per-row entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateRowsRequest {
    pub table_name: String,
    pub app_profile: String,
    pub entries: Vec<RowMutation>,
}

/// Per-entry outcome within a batch mutation response stream. `index`
/// refers to the position in the request this response answers, not to
/// the caller's original batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    pub index: usize,
    pub status: RpcStatus,
}

/// A live chunk stream for one read attempt.
///
/// `next_chunk` returning `Ok(None)` is a clean end of stream,
/// distinguished from an error. `close` must be safe at any point,
/// including mid-stream, and must release the underlying connection;
/// implementations are expected to close on drop as well.
#[async_trait]
pub trait ChunkStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<CellChunk>, TransportError>;
    async fn close(&mut self);
}

/// Opens chunk streams. One stream per attempt; the reader never shares a
/// stream between attempts.
#[async_trait]
pub trait ReadTransport: Send + Sync {
    async fn read_rows(
        &self,
        request: ReadRowsRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError>;
}

/// Per-entry results for one mutation attempt, then end of stream.
/// Dropping the stream cancels the attempt.
pub type MutationResultStream = BoxStream<'static, Result<MutationResult, TransportError>>;

/// Issues batch mutation RPCs.
#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn mutate_rows(
        &self,
        request: MutateRowsRequest,
    ) -> Result<MutationResultStream, TransportError>;
}
