// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory transports for tests
//!
//! Each transport replays a fixed script: one entry per attempt, consumed
//! in order. The requests actually issued are recorded so tests can
//! assert on resume narrowing and retry counts.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use rowcodec::CellChunk;

use crate::error::TransportError;
use crate::status::{RpcStatus, StatusCode};
use crate::transport::{
    ChunkStream, MutateRowsRequest, MutationResult, MutationResultStream, MutationTransport,
    ReadRowsRequest, ReadTransport,
};

/// One scripted event on a chunk stream.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    Chunk(CellChunk),
    /// The stream fails after the preceding chunks were delivered.
    Error(TransportError),
}

/// Replays scripted read attempts: each `read_rows` call consumes the
/// next script. Running off the end of a script is a clean end of
/// stream; running out of scripts fails the open.
#[derive(Default)]
pub struct ScriptedReadTransport {
    attempts: Mutex<VecDeque<Vec<ChunkEvent>>>,
    requests: Mutex<Vec<ReadRowsRequest>>,
}

impl ScriptedReadTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_attempt(&self, events: Vec<ChunkEvent>) {
        self.attempts.lock().expect("lock poisoned").push_back(events);
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<ReadRowsRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ReadTransport for ScriptedReadTransport {
    async fn read_rows(
        &self,
        request: ReadRowsRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError> {
        self.requests.lock().expect("lock poisoned").push(request);
        let Some(events) = self.attempts.lock().expect("lock poisoned").pop_front() else {
            return Err(TransportError::ConnectionClosed {
                reason: "no scripted attempt remains".to_string(),
            });
        };
        Ok(Box::new(ScriptedChunkStream {
            events: events.into(),
            closed: false,
        }))
    }
}

struct ScriptedChunkStream {
    events: VecDeque<ChunkEvent>,
    closed: bool,
}

#[async_trait]
impl ChunkStream for ScriptedChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<CellChunk>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        match self.events.pop_front() {
            Some(ChunkEvent::Chunk(chunk)) => Ok(Some(chunk)),
            Some(ChunkEvent::Error(err)) => Err(err),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// One scripted mutation round.
#[derive(Debug, Clone)]
pub enum MutationRound {
    /// The RPC fails before any result is streamed.
    OpenError(TransportError),
    /// Streamed per-entry results, optionally ending with an error.
    Results(Vec<Result<MutationResult, TransportError>>),
}

/// Replays scripted mutation rounds: each `mutate_rows` call consumes
/// the next round.
#[derive(Default)]
pub struct ScriptedMutationTransport {
    rounds: Mutex<VecDeque<MutationRound>>,
    requests: Mutex<Vec<MutateRowsRequest>>,
}

impl ScriptedMutationTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_round(&self, round: MutationRound) {
        self.rounds.lock().expect("lock poisoned").push_back(round);
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<MutateRowsRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl MutationTransport for ScriptedMutationTransport {
    async fn mutate_rows(
        &self,
        request: MutateRowsRequest,
    ) -> Result<MutationResultStream, TransportError> {
        self.requests.lock().expect("lock poisoned").push(request);
        match self.rounds.lock().expect("lock poisoned").pop_front() {
            Some(MutationRound::OpenError(err)) => Err(err),
            Some(MutationRound::Results(items)) => Ok(stream::iter(items).boxed()),
            None => Err(TransportError::ConnectionClosed {
                reason: "no scripted round remains".to_string(),
            }),
        }
    }
}

/// A complete one-cell row delivered and committed in a single chunk.
pub fn committed_row_chunk(key: &str, value: &str) -> CellChunk {
    CellChunk {
        row_key: Bytes::copy_from_slice(key.as_bytes()),
        family: Some("cf".to_string()),
        qualifier: Some(Bytes::from_static(b"col")),
        timestamp_micros: 0,
        labels: Vec::new(),
        value: Bytes::copy_from_slice(value.as_bytes()),
        value_size: 0,
        reset_row: false,
        commit_row: true,
    }
}

/// The classic transient failure.
pub fn unavailable() -> TransportError {
    TransportError::Status(RpcStatus::new(StatusCode::Unavailable, "scripted failure"))
}

pub fn ok_result(index: usize) -> Result<MutationResult, TransportError> {
    Ok(MutationResult {
        index,
        status: RpcStatus::ok(),
    })
}

pub fn failed_result(index: usize, code: StatusCode) -> Result<MutationResult, TransportError> {
    Ok(MutationResult {
        index,
        status: RpcStatus::new(code, "scripted failure"),
    })
}
