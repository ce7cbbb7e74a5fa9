// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the bulk mutation reconciler: idempotency
//! gating, truncated response streams, and exact batch accounting.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use rowclient::testing::{
    MutationRound, ScriptedMutationTransport, failed_result, ok_result, unavailable,
};
use rowclient::{
    BulkMutator, Mutation, RetryConfig, RowMutation, SafeIdempotencyPolicy, StatusCode,
};

fn fast_config(max_failures: usize) -> RetryConfig {
    RetryConfig {
        max_failures,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// A row whose single mutation carries an explicit timestamp: safe to
/// retry.
fn idempotent_row(key: &str) -> RowMutation {
    RowMutation::new(
        Bytes::copy_from_slice(key.as_bytes()),
        vec![Mutation::SetCell {
            family: "cf".to_string(),
            qualifier: Bytes::from_static(b"col"),
            timestamp_micros: Some(1_000),
            value: Bytes::from_static(b"v"),
        }],
    )
}

/// A row asking for a server-assigned timestamp: never retried.
fn non_idempotent_row(key: &str) -> RowMutation {
    RowMutation::new(
        Bytes::copy_from_slice(key.as_bytes()),
        vec![Mutation::SetCell {
            family: "cf".to_string(),
            qualifier: Bytes::from_static(b"col"),
            timestamp_micros: None,
            value: Bytes::from_static(b"v"),
        }],
    )
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    diagnostics::init();
    let transport = ScriptedMutationTransport::new();
    // Round 1: "foo" is unavailable, "bar" succeeds. Round 2 carries
    // only "foo" and succeeds.
    transport.push_round(MutationRound::Results(vec![
        failed_result(0, StatusCode::Unavailable),
        ok_result(1),
    ]));
    transport.push_round(MutationRound::Results(vec![ok_result(0)]));

    let batch = vec![idempotent_row("foo"), idempotent_row("bar")];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    let failures = mutator.apply(&transport, &fast_config(3)).await;
    assert!(failures.is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].entries.len(), 2);
    assert_eq!(requests[1].entries.len(), 1);
    assert_eq!(requests[1].entries[0].row_key.as_ref(), b"foo");
}

#[tokio::test]
async fn non_idempotent_rows_are_never_retried() {
    let transport = ScriptedMutationTransport::new();
    // Round 1 fails rows 0 and 1 transiently and omits row 2 entirely.
    transport.push_round(MutationRound::Results(vec![
        failed_result(0, StatusCode::Unavailable),
        failed_result(1, StatusCode::Unavailable),
    ]));
    // Round 2: row 0 still unavailable, row 1 succeeds.
    transport.push_round(MutationRound::Results(vec![
        failed_result(0, StatusCode::Unavailable),
        ok_result(1),
    ]));

    let batch = vec![
        idempotent_row("r0"),
        idempotent_row("r1"),
        non_idempotent_row("r2"),
    ];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    // One retryable failure allowed: rounds 1 and 2 run, then we give up
    // with row 0 still pending.
    let failures = mutator.apply(&transport, &fast_config(1)).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    // The retry carries only the idempotent rows; row 2 is never re-sent.
    assert_eq!(requests[1].entries.len(), 2);
    assert!(
        requests[1]
            .entries
            .iter()
            .all(|e| e.row_key.as_ref() != b"r2")
    );

    assert_eq!(failures.len(), 2);
    // Discovery order: row 2 failed (unconfirmed, not retryable) during
    // round 1; row 0 only became permanent when the budget ran out.
    assert_eq!(failures[0].original_index, 2);
    assert_eq!(failures[0].status.code(), StatusCode::Unknown);
    assert_eq!(failures[1].original_index, 0);
    assert_eq!(failures[1].status.code(), StatusCode::Unavailable);
}

#[tokio::test]
async fn open_failure_retries_the_whole_request() {
    let transport = ScriptedMutationTransport::new();
    transport.push_round(MutationRound::OpenError(unavailable()));
    transport.push_round(MutationRound::Results(vec![ok_result(0), ok_result(1)]));

    let batch = vec![idempotent_row("a"), idempotent_row("b")];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    let failures = mutator.apply(&transport, &fast_config(3)).await;
    assert!(failures.is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].entries.len(), 2);
}

#[tokio::test]
async fn permanent_entry_failures_are_not_retried() {
    let transport = ScriptedMutationTransport::new();
    transport.push_round(MutationRound::Results(vec![
        failed_result(0, StatusCode::InvalidArgument),
        ok_result(1),
    ]));

    let batch = vec![idempotent_row("a"), idempotent_row("b")];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    let failures = mutator.apply(&transport, &fast_config(3)).await;

    assert_eq!(transport.requests().len(), 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].original_index, 0);
    assert_eq!(failures[0].status.code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn every_original_index_is_accounted_for_exactly_once() {
    let transport = ScriptedMutationTransport::new();
    // Round 1: index 0 ok, 1 transient, 2 permanent, 3 (non-idempotent)
    // omitted from the response.
    transport.push_round(MutationRound::Results(vec![
        ok_result(0),
        failed_result(1, StatusCode::Unavailable),
        failed_result(2, StatusCode::Internal),
    ]));
    // Round 2: the lone retried entry (original index 1) succeeds.
    transport.push_round(MutationRound::Results(vec![ok_result(0)]));

    let batch = vec![
        idempotent_row("a"),
        idempotent_row("b"),
        idempotent_row("c"),
        non_idempotent_row("d"),
    ];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    let failures = mutator.apply(&transport, &fast_config(3)).await;

    let failed: HashSet<usize> = failures.iter().map(|f| f.original_index).collect();
    assert_eq!(failed.len(), failures.len(), "no duplicate indices");
    assert_eq!(failed, HashSet::from([2, 3]));
    // Successes are exactly the complement: 0 and 1.
}

#[tokio::test]
async fn manual_driving_and_late_extraction() {
    let transport = ScriptedMutationTransport::new();
    transport.push_round(MutationRound::Results(vec![failed_result(
        0,
        StatusCode::Unavailable,
    )]));

    let batch = vec![idempotent_row("a")];
    let mut mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    assert!(mutator.has_pending_mutations());

    mutator
        .make_one_request(&transport)
        .await
        .expect("rpc itself succeeded");
    assert!(mutator.has_pending_mutations(), "entry re-pended");

    // Reconciliation stops early; the pending entry surfaces with its
    // last-known status.
    let failures = mutator.extract_final_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].original_index, 0);
    assert_eq!(failures[0].status.code(), StatusCode::Unavailable);
    assert!(!mutator.has_pending_mutations());
    assert!(mutator.extract_final_failures().is_empty());
}

#[tokio::test]
async fn truncated_stream_with_no_results_retries_idempotent_entries() {
    let transport = ScriptedMutationTransport::new();
    // The response stream ends before any entry is confirmed.
    transport.push_round(MutationRound::Results(vec![]));
    transport.push_round(MutationRound::Results(vec![ok_result(0)]));

    let batch = vec![idempotent_row("a")];
    let mutator = BulkMutator::new("t", &SafeIdempotencyPolicy, batch);
    let failures = mutator.apply(&transport, &fast_config(3)).await;
    assert!(failures.is_empty());
    assert_eq!(transport.requests().len(), 2);
}
