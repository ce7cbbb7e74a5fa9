// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Transport and client error types

use thiserror::Error;

use crate::status::RpcStatus;
use rowcodec::ProtocolError;

/// Connection-level failure from a chunk source or mutation channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rpc failed: {0}")]
    Status(RpcStatus),

    #[error("connection closed unexpectedly: {reason}")]
    ConnectionClosed { reason: String },

    #[error("transport deadline exceeded after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed. Status-carrying
    /// failures defer to the status code; losing the connection or a
    /// deadline is always worth asking the retry policy about.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status(status) => status.is_transient(),
            TransportError::ConnectionClosed { .. } => true,
            TransportError::Timeout { .. } => true,
        }
    }
}

/// Umbrella error surfaced to callers of the reader and the bulk mutator.
///
/// Protocol errors are retryable signals here: resuming past the last
/// emitted row key makes replay safe, so a malformed stream is worth one
/// more attempt if the retry policy agrees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Protocol(_) => true,
            ClientError::Transport(err) => err.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn transience_follows_the_status_code() {
        let unavailable = TransportError::Status(RpcStatus::new(StatusCode::Unavailable, "try again"));
        assert!(unavailable.is_transient());

        let invalid = TransportError::Status(RpcStatus::new(StatusCode::InvalidArgument, "bad table"));
        assert!(!invalid.is_transient());

        assert!(TransportError::ConnectionClosed { reason: "reset by peer".into() }.is_transient());
    }

    #[test]
    fn protocol_errors_are_retryable_signals() {
        let err = ClientError::Protocol(ProtocolError::MissingRowKey);
        assert!(err.is_retryable());
    }
}
