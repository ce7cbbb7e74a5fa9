// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The resumable streaming row reader
//!
//! [`RowReader`] presents one uninterrupted, ordered sequence of rows per
//! request, surviving transient stream failures by re-issuing the request
//! for the keys still outstanding. Resumption is what makes replay safe:
//! the narrowed request excludes every key already delivered, so a row is
//! observed at most once no matter how many attempts it takes.
//!
//! One reader owns one transport stream at a time. Chunks from a new
//! attempt are never processed before the previous attempt's stream has
//! been closed.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use log::{debug, warn};
use rowcodec::{ChunkParser, Row, RowKey};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::{ChunkStream, ReadRowsRequest, ReadTransport};

enum State {
    /// No attempt in flight.
    Idle,
    /// Pulling chunks from a live stream into the attempt's parser.
    Streaming {
        source: Box<dyn ChunkStream>,
        parser: ChunkParser,
    },
    /// Terminal, by completion, cancellation or permanent failure.
    Finished,
}

/// Outcome of pulling one chunk.
enum Step {
    Continue,
    Row(Row),
    CleanEnd,
    Failure(ClientError),
    Cancelled,
}

/// A retrying, resumable streaming row iterator.
///
/// Single-pass: `advance` yields each row exactly once, in strictly
/// increasing key order, and `Ok(None)` marks the end of the sequence.
/// Rows already delivered are never affected by later failures.
pub struct RowReader {
    transport: Arc<dyn ReadTransport>,
    /// The outstanding request; its row set is narrowed in place as rows
    /// are delivered and attempts fail.
    request: ReadRowsRequest,
    /// The caller's original row cap, fixed at construction.
    rows_limit: Option<u64>,
    retry: Box<dyn RetryPolicy>,
    backoff: Box<dyn Iterator<Item = Duration> + Send>,
    cancel_token: CancellationToken,
    rows_read: u64,
    last_emitted: Option<RowKey>,
    state: State,
}

impl RowReader {
    pub fn new(
        transport: Arc<dyn ReadTransport>,
        request: ReadRowsRequest,
        config: &RetryConfig,
    ) -> Self {
        Self::with_policy(
            transport,
            request,
            Box::new(config.policy()),
            Box::new(config.backoff()),
        )
    }

    /// Construct with explicit retry and backoff capabilities instead of
    /// the ones `RetryConfig` builds.
    pub fn with_policy(
        transport: Arc<dyn ReadTransport>,
        request: ReadRowsRequest,
        retry: Box<dyn RetryPolicy>,
        backoff: Box<dyn Iterator<Item = Duration> + Send>,
    ) -> Self {
        let rows_limit = request.rows_limit;
        Self {
            transport,
            request,
            rows_limit,
            retry,
            backoff,
            cancel_token: CancellationToken::new(),
            rows_read: 0,
            last_emitted: None,
            state: State::Idle,
        }
    }

    /// Pull chunks until the next row is ready or the sequence ends.
    ///
    /// Suspends on network reads and on backoff delays between attempts.
    /// Returns `Ok(None)` once the request is satisfied, the row limit is
    /// reached, or the reader was cancelled.
    ///
    /// # Errors
    /// The last failure, once the retry policy declines another attempt.
    /// Rows delivered before the failure remain valid.
    pub async fn advance(&mut self) -> Result<Option<Row>, ClientError> {
        loop {
            if self.cancel_token.is_cancelled() {
                self.shutdown().await;
                return Ok(None);
            }
            if self.limit_reached() {
                self.shutdown().await;
                return Ok(None);
            }
            match self.state {
                State::Finished => return Ok(None),
                State::Idle => {
                    let request = self.outstanding_request();
                    debug!(
                        "issuing read_rows for {} (rows_read={})",
                        request.table_name, self.rows_read
                    );
                    match self.transport.read_rows(request).await {
                        Ok(source) => {
                            self.state = State::Streaming {
                                source,
                                parser: ChunkParser::new(),
                            };
                        }
                        Err(err) => {
                            if let Some(final_err) = self.recover(err.into()).await {
                                return Err(final_err);
                            }
                        }
                    }
                }
                State::Streaming { .. } => match self.pull().await {
                    Step::Continue => {}
                    Step::Row(row) => {
                        self.rows_read += 1;
                        self.last_emitted = Some(row.key().clone());
                        return Ok(Some(row));
                    }
                    Step::CleanEnd => {
                        self.shutdown().await;
                        return Ok(None);
                    }
                    Step::Cancelled => {
                        self.shutdown().await;
                        return Ok(None);
                    }
                    Step::Failure(err) => {
                        if let Some(final_err) = self.recover(err).await {
                            return Err(final_err);
                        }
                    }
                },
            }
        }
    }

    /// End the sequence now. Idempotent; safe from another task via
    /// [`RowReader::cancellation_token`], and invoked on drop. The
    /// in-flight stream is closed on the next `advance` step, or by drop
    /// of the stream itself if `advance` is never called again.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// A handle for cancelling this reader from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Rows delivered so far across all attempts.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Key of the last row delivered, if any. This is the resume point.
    pub fn last_emitted_key(&self) -> Option<&RowKey> {
        self.last_emitted.as_ref()
    }

    /// Adapt the reader into a `futures::Stream` of rows.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Row, ClientError>> + Send {
        async_stream::try_stream! {
            while let Some(row) = self.advance().await? {
                yield row;
            }
        }
    }

    fn limit_reached(&self) -> bool {
        self.rows_limit.is_some_and(|limit| self.rows_read >= limit)
    }

    /// The request for the rows still outstanding: the narrowed row set,
    /// and the original limit minus what was already delivered.
    fn outstanding_request(&self) -> ReadRowsRequest {
        let mut request = self.request.clone();
        request.rows_limit = self
            .rows_limit
            .map(|limit| limit.saturating_sub(self.rows_read));
        request
    }

    /// Pull one chunk from the live stream and feed the parser.
    async fn pull(&mut self) -> Step {
        let State::Streaming { source, parser } = &mut self.state else {
            return Step::Continue;
        };
        let next = tokio::select! {
            _ = self.cancel_token.cancelled() => return Step::Cancelled,
            next = source.next_chunk() => next,
        };
        match next {
            Ok(Some(chunk)) => match parser.handle_chunk(chunk) {
                Ok(()) => match parser.take_row() {
                    Some(row) => Step::Row(row),
                    None => Step::Continue,
                },
                Err(err) => Step::Failure(err.into()),
            },
            Ok(None) => match parser.handle_end_of_stream() {
                Ok(()) => Step::CleanEnd,
                Err(err) => Step::Failure(err.into()),
            },
            Err(err) => Step::Failure(err.into()),
        }
    }

    /// Decide what a failed attempt means: nothing outstanding, another
    /// attempt after a delay, or surfacing the failure. Returning `Some`
    /// ends the sequence with that error.
    async fn recover(&mut self, err: ClientError) -> Option<ClientError> {
        // Attempt N's stream is closed before anything of attempt N+1
        // starts.
        self.close_source().await;

        if self.limit_reached() {
            self.state = State::Finished;
            return None;
        }
        if let Some(last) = self.last_emitted.clone() {
            self.request.rows.narrow_after(&last);
            if self.request.rows.is_empty() {
                debug!("stream failed with nothing outstanding; ending cleanly");
                self.state = State::Finished;
                return None;
            }
        }
        if !self.retry.on_failure(&err) {
            warn!("read failed permanently: {err}");
            self.state = State::Finished;
            return Some(err);
        }
        let Some(delay) = self.backoff.next() else {
            self.state = State::Finished;
            return Some(err);
        };
        debug!("read attempt failed ({err}); retrying in {delay:?}");
        tokio::select! {
            _ = self.cancel_token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        self.state = State::Idle;
        None
    }

    async fn close_source(&mut self) {
        if let State::Streaming { mut source, .. } =
            std::mem::replace(&mut self.state, State::Idle)
        {
            source.close().await;
        }
    }

    async fn shutdown(&mut self) {
        self.close_source().await;
        self.state = State::Finished;
    }
}

impl Drop for RowReader {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
