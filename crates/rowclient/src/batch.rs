// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The batch mutation reconciler
//!
//! A logical mutation batch is driven to completion across several RPC
//! attempts. Each round sends the still-pending entries, reconciles the
//! per-entry statuses the server streams back, and re-pends only entries
//! that are both idempotent and transiently failed. Every original index
//! ends up in exactly one of: succeeded, permanently failed, or still
//! pending when reconciliation stops early.
//!
//! One reconciler per logical batch; never reused.

use futures::StreamExt;
use log::{debug, warn};

use crate::error::{ClientError, TransportError};
use crate::mutation::{FailedMutation, IdempotencyPolicy, RowMutation};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::status::{RpcStatus, StatusCode};
use crate::transport::{MutateRowsRequest, MutationResult, MutationTransport};

/// One entry's bookkeeping across rounds.
#[derive(Debug, Clone)]
struct TrackedMutation {
    original_index: usize,
    idempotent: bool,
    row: RowMutation,
    /// Last failure status the server reported for this entry, if any.
    last_status: Option<RpcStatus>,
}

/// A tracked entry within the request currently in flight.
#[derive(Debug)]
struct CurrentEntry {
    tracked: TrackedMutation,
    /// Set when the response stream carried a result for this entry.
    observed: bool,
}

/// Drives one multi-row mutation batch across retry rounds.
pub struct BulkMutator {
    table_name: String,
    app_profile: String,
    /// Entries waiting for the next round, in discovery order.
    pending: Vec<TrackedMutation>,
    /// Entries of the request in flight, indexed as sent.
    current: Vec<CurrentEntry>,
    /// Permanent failures in the order they were determined.
    failures: Vec<FailedMutation>,
}

impl BulkMutator {
    /// The idempotency policy is evaluated once per row, here; the
    /// verdict sticks for the lifetime of the batch.
    pub fn new(
        table_name: impl Into<String>,
        policy: &dyn IdempotencyPolicy,
        batch: Vec<RowMutation>,
    ) -> Self {
        let pending = batch
            .into_iter()
            .enumerate()
            .map(|(original_index, row)| TrackedMutation {
                original_index,
                idempotent: policy.is_idempotent(&row),
                row,
                last_status: None,
            })
            .collect();
        Self {
            table_name: table_name.into(),
            app_profile: String::new(),
            pending,
            current: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move the pending entries into the current request and return the
    /// request to send. Clears the per-entry observed flags.
    ///
    /// Exposed for fine-grained driving; [`BulkMutator::make_one_request`]
    /// calls it itself.
    pub fn prepare_request(&mut self) -> MutateRowsRequest {
        self.current = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|tracked| CurrentEntry {
                tracked,
                observed: false,
            })
            .collect();
        MutateRowsRequest {
            table_name: self.table_name.clone(),
            app_profile: self.app_profile.clone(),
            entries: self.current.iter().map(|e| e.tracked.row.clone()).collect(),
        }
    }

    /// Issue one round: send everything pending, reconcile the streamed
    /// per-entry results.
    ///
    /// # Errors
    /// The outer RPC failure, if the attempt died before or during the
    /// response stream. Entries the server never confirmed are re-pended
    /// (idempotent) or failed with a not-confirmed status
    /// (non-idempotent) either way, so the batch accounting stays exact.
    pub async fn make_one_request(
        &mut self,
        transport: &dyn MutationTransport,
    ) -> Result<(), TransportError> {
        let request = self.prepare_request();
        debug!(
            "mutate_rows round: {} entries for {}",
            request.entries.len(),
            request.table_name
        );
        let mut stream = match transport.mutate_rows(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.finish_round();
                return Err(err);
            }
        };
        let mut outer = Ok(());
        while let Some(item) = stream.next().await {
            match item {
                Ok(result) => self.record_result(result),
                Err(err) => {
                    outer = Err(err);
                    break;
                }
            }
        }
        drop(stream);
        self.finish_round();
        outer
    }

    /// Call once no more rounds will be made. Entries still pending are
    /// moved into the failure list, tagged with their last-known status
    /// or an explicit gave-up status, and the complete list is returned
    /// in discovery order.
    pub fn extract_final_failures(&mut self) -> Vec<FailedMutation> {
        for tracked in self.pending.drain(..) {
            let status = tracked.last_status.unwrap_or_else(|| {
                RpcStatus::new(
                    StatusCode::Unknown,
                    "retry budget exhausted before the mutation was confirmed",
                )
            });
            self.failures.push(FailedMutation {
                original_index: tracked.original_index,
                mutation: tracked.row,
                status,
            });
        }
        std::mem::take(&mut self.failures)
    }

    /// Run the whole batch: round-trip while entries are pending and the
    /// retry policy permits, then extract the final failures. Rows not in
    /// the returned list succeeded.
    pub async fn apply(
        mut self,
        transport: &dyn MutationTransport,
        config: &RetryConfig,
    ) -> Vec<FailedMutation> {
        let mut retry = config.policy();
        let mut backoff = config.backoff();
        while self.has_pending_mutations() {
            let round = self.make_one_request(transport).await;
            if !self.has_pending_mutations() {
                break;
            }
            // A round that leaves entries pending failed for them, even
            // when the RPC itself completed; the first pending entry's
            // status stands in for the round. Entries pending without a
            // status were truncated off the response stream.
            let err = match round {
                Err(outer) => ClientError::Transport(outer),
                Ok(()) => match self.pending.iter().find_map(|t| t.last_status.clone()) {
                    Some(status) => ClientError::Transport(TransportError::Status(status)),
                    None => ClientError::Transport(TransportError::ConnectionClosed {
                        reason: "mutation response stream ended before all entries were confirmed"
                            .to_string(),
                    }),
                },
            };
            if !retry.on_failure(&err) {
                debug!("bulk apply giving up: {err}");
                break;
            }
            let Some(delay) = backoff.next() else { break };
            tokio::time::sleep(delay).await;
        }
        self.extract_final_failures()
    }

    /// Reconcile one streamed per-entry result.
    fn record_result(&mut self, result: MutationResult) {
        let Some(entry) = self.current.get_mut(result.index) else {
            warn!(
                "mutation result index {} out of range ({} entries in flight), ignored",
                result.index,
                self.current.len()
            );
            return;
        };
        if entry.observed {
            warn!("duplicate mutation result for index {}, ignored", result.index);
            return;
        }
        entry.observed = true;
        if result.status.is_ok() {
            return;
        }
        if result.status.is_transient() && entry.tracked.idempotent {
            let mut tracked = entry.tracked.clone();
            tracked.last_status = Some(result.status);
            self.pending.push(tracked);
        } else {
            // Non-idempotent entries are never retried, even on a
            // transient code.
            self.failures.push(FailedMutation {
                original_index: entry.tracked.original_index,
                mutation: entry.tracked.row.clone(),
                status: result.status,
            });
        }
    }

    /// Account for entries the response stream never mentioned: a
    /// truncated stream leaves their outcome unknown, which is retryable
    /// only for idempotent entries.
    fn finish_round(&mut self) {
        for entry in self.current.drain(..) {
            if entry.observed {
                continue;
            }
            if entry.tracked.idempotent {
                self.pending.push(entry.tracked);
            } else {
                self.failures.push(FailedMutation {
                    original_index: entry.tracked.original_index,
                    mutation: entry.tracked.row,
                    status: RpcStatus::new(
                        StatusCode::Unknown,
                        "no result received and the mutation is not idempotent; not retried",
                    ),
                });
            }
        }
    }
}
