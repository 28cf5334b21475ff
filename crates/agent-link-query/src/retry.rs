//! Error classification and per-query attempt bookkeeping.

use agent_link_core::{RpcError, RpcErrorKind};
use tokio::time::Instant;

/// Message fragments that mean the agent is not reachable yet.
///
/// Only consulted when the transport reports no structured error kind.
const UNAVAILABLE_MARKERS: [&str; 3] = ["unavailable", "connecting", "not connected"];

/// Classification of a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Agent not reachable yet; worth retrying.
    Unavailable,
    /// Anything else; surfaced immediately.
    Other,
}

/// Classify an RPC error.
///
/// A structured kind always wins. Message matching is a fallback for
/// transports that only report free text.
#[must_use]
pub fn classify(error: &RpcError) -> ErrorClass {
    match error.kind {
        Some(RpcErrorKind::Unavailable) => ErrorClass::Unavailable,
        Some(_) => ErrorClass::Other,
        None => {
            let message = error.message.to_lowercase();
            if UNAVAILABLE_MARKERS.iter().any(|m| message.contains(m)) {
                ErrorClass::Unavailable
            } else {
                ErrorClass::Other
            }
        }
    }
}

/// Retry bookkeeping for one logical query.
///
/// Lives only as long as the query it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    /// Retries scheduled so far.
    pub count: u32,
    /// Classification of the most recent failure.
    pub last_error: Option<ErrorClass>,
    /// When the pending retry fires, if one is scheduled.
    pub retry_at: Option<Instant>,
}

impl ConnectionAttempt {
    pub(crate) const fn new() -> Self {
        Self {
            count: 0,
            last_error: None,
            retry_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_kind_wins() {
        assert_eq!(classify(&RpcError::unavailable("boom")), ErrorClass::Unavailable);
        assert_eq!(
            classify(&RpcError::new(RpcErrorKind::Internal, "service unavailable")),
            ErrorClass::Other
        );
    }

    #[test]
    fn test_message_fallback() {
        for message in [
            "Agent UNAVAILABLE",
            "agent is connecting, try later",
            "device agent not connected",
        ] {
            assert_eq!(classify(&RpcError::message(message)), ErrorClass::Unavailable);
        }
        assert_eq!(classify(&RpcError::message("path does not exist")), ErrorClass::Other);
        assert_eq!(classify(&RpcError::message("")), ErrorClass::Other);
    }
}
