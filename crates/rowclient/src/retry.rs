// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Retry admission and backoff schedule
//!
//! Two injected capabilities, kept separate on purpose: a [`RetryPolicy`]
//! decides whether a failure is worth another attempt (and spends the
//! attempt budget), while the backoff schedule decides how long to wait
//! before it. The schedule is a plain `Iterator<Item = Duration>` built
//! with `backon`.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Decides whether another attempt may be made after a failure.
///
/// `on_failure` consumes one unit of the attempt budget when it returns
/// true; returning false is final for the operation.
pub trait RetryPolicy: Send {
    fn on_failure(&mut self, error: &ClientError) -> bool;
}

/// Permits up to `max_failures` retryable failures, then declines.
/// Non-retryable failures decline immediately without spending budget.
#[derive(Debug, Clone)]
pub struct LimitedErrorCountRetryPolicy {
    remaining: usize,
}

impl LimitedErrorCountRetryPolicy {
    #[must_use]
    pub fn new(max_failures: usize) -> Self {
        Self {
            remaining: max_failures,
        }
    }
}

impl RetryPolicy for LimitedErrorCountRetryPolicy {
    fn on_failure(&mut self, error: &ClientError) -> bool {
        if !error.is_retryable() {
            return false;
        }
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Retry limits and backoff bounds for one operation family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retryable failures tolerated before giving up.
    pub max_failures: usize,
    /// First backoff delay; later delays grow exponentially with jitter.
    pub initial_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> LimitedErrorCountRetryPolicy {
        LimitedErrorCountRetryPolicy::new(self.max_failures)
    }

    /// The delay schedule for one operation. Unbounded in length; the
    /// retry policy owns the attempt budget.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_jitter()
            .without_max_times()
            .build()
    }
}
