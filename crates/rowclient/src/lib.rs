// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! rowclient - resumable streaming reads and batch mutations
//!
//! This crate is the retry coordinator around the `rowcodec` reassembly
//! parser. [`RowReader`] presents an uninterrupted, ordered sequence of
//! rows despite transient stream failures by resuming past the last
//! delivered row key; [`BulkMutator`] drives a multi-row mutation batch to
//! completion across RPC attempts, retrying only idempotent entries and
//! accounting for every original index exactly once.
//!
//! The transport itself (RPC stubs, credentials, wire format) is out of
//! scope; it enters through the traits in [`transport`].

/// gRPC-shaped status codes and per-entry statuses
pub mod status;

/// Transport and client error types
pub mod error;

/// Row keys addressed by a request: explicit keys plus ranges
pub mod rowset;

/// Mutations, idempotency classification, failure records
pub mod mutation;

/// The traits the core consumes from the transport layer
pub mod transport;

/// Retry admission and backoff schedule
pub mod retry;

/// The resumable streaming row reader
pub mod read;

/// The batch mutation reconciler
pub mod batch;

/// Scripted in-memory transports for tests
pub mod testing;

pub use batch::BulkMutator;
pub use error::{ClientError, TransportError};
pub use mutation::{FailedMutation, IdempotencyPolicy, Mutation, RowMutation, SafeIdempotencyPolicy};
pub use read::RowReader;
pub use retry::{LimitedErrorCountRetryPolicy, RetryConfig, RetryPolicy};
pub use rowset::{RowRange, RowSet};
pub use status::{RpcStatus, StatusCode};
pub use transport::{
    ChunkStream, MutateRowsRequest, MutationResult, MutationTransport, ReadRowsRequest,
    ReadTransport,
};

// Re-export the codec types callers handle directly.
pub use rowcodec::{Cell, CellChunk, ChunkParser, ProtocolError, Row, RowKey};
