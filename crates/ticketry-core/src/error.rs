//! The typed error enum returned by Registry and store operations.
//!
//! `PermissionDenied` is deliberately not a variant here: the close-ticket
//! permission check is advisory text returned to the calling LLM, never a
//! thrown error (see `ticketry-agent::tools::ticket::close_ticket`).

use thiserror::Error;

/// Broker-level error kinds, as distinguished by callers that need to branch
/// on failure class rather than just log a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_include_detail() {
        let err = BrokerError::NotFound("ticket abc123".into());
        assert_eq!(err.to_string(), "not found: ticket abc123");
    }

    #[test]
    fn cancelled_has_no_payload() {
        assert_eq!(BrokerError::Cancelled.to_string(), "cancelled");
    }
}
