// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Mutations, idempotency classification and failure records

use bytes::Bytes;
use rowcodec::RowKey;

use crate::status::RpcStatus;

/// A single change to one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Write one cell. A `None` timestamp asks the server to assign the
    /// current time, which makes the write non-idempotent: replaying it
    /// produces a second cell at a different timestamp.
    SetCell {
        family: String,
        qualifier: Bytes,
        timestamp_micros: Option<i64>,
        value: Bytes,
    },
    /// Delete all cells of one column.
    DeleteFromColumn { family: String, qualifier: Bytes },
    /// Delete all cells of one family.
    DeleteFromFamily { family: String },
    /// Delete the whole row.
    DeleteFromRow,
}

impl Mutation {
    /// Whether replaying this mutation yields the same end state.
    pub fn is_idempotent(&self) -> bool {
        !matches!(
            self,
            Mutation::SetCell {
                timestamp_micros: None,
                ..
            }
        )
    }
}

/// All mutations for one row, applied atomically by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMutation {
    pub row_key: RowKey,
    pub mutations: Vec<Mutation>,
}

impl RowMutation {
    pub fn new(row_key: RowKey, mutations: Vec<Mutation>) -> Self {
        Self { row_key, mutations }
    }
}

/// Decides whether a row's mutations are safe to retry as a whole.
///
/// Evaluated once per row when a batch is handed to the reconciler; the
/// verdict sticks for the lifetime of that batch.
pub trait IdempotencyPolicy: Send + Sync {
    fn is_idempotent(&self, row: &RowMutation) -> bool;
}

/// The conservative default: a row is retried only if every one of its
/// mutations is idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeIdempotencyPolicy;

impl IdempotencyPolicy for SafeIdempotencyPolicy {
    fn is_idempotent(&self, row: &RowMutation) -> bool {
        row.mutations.iter().all(Mutation::is_idempotent)
    }
}

/// Opt-in policy treating every row as retryable. For callers that accept
/// duplicate effects in exchange for fewer surfaced failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetryIdempotencyPolicy;

impl IdempotencyPolicy for AlwaysRetryIdempotencyPolicy {
    fn is_idempotent(&self, _row: &RowMutation) -> bool {
        true
    }
}

/// A permanently failed row mutation: its position in the original batch,
/// the mutation itself, and the last status the server reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMutation {
    pub original_index: usize,
    pub mutation: RowMutation,
    pub status: RpcStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cell(timestamp_micros: Option<i64>) -> Mutation {
        Mutation::SetCell {
            family: "cf".to_string(),
            qualifier: Bytes::from_static(b"col"),
            timestamp_micros,
            value: Bytes::from_static(b"v"),
        }
    }

    #[test]
    fn server_assigned_timestamps_are_not_idempotent() {
        assert!(set_cell(Some(1000)).is_idempotent());
        assert!(!set_cell(None).is_idempotent());
        assert!(Mutation::DeleteFromRow.is_idempotent());
    }

    #[test]
    fn a_row_is_idempotent_only_if_all_its_mutations_are() {
        let policy = SafeIdempotencyPolicy;
        let key = Bytes::from_static(b"r1");

        let safe = RowMutation::new(key.clone(), vec![set_cell(Some(1)), Mutation::DeleteFromRow]);
        assert!(policy.is_idempotent(&safe));

        let unsafe_row = RowMutation::new(key, vec![set_cell(Some(1)), set_cell(None)]);
        assert!(!policy.is_idempotent(&unsafe_row));
        assert!(AlwaysRetryIdempotencyPolicy.is_idempotent(&unsafe_row));
    }
}
