//! Client error types.

use lyskom_protocol::{Call, ErrorCode};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] lyskom_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection lost")]
    ConnectionLost,

    #[error("connect timeout")]
    Timeout,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("server error: {code} (detail {detail})")]
    Server { code: ErrorCode, detail: u32 },

    #[error("unexpected reply to {call}")]
    UnexpectedReply { call: Call },

    #[error("not logged in")]
    NotLoggedIn,

    #[error("request reference numbers exhausted")]
    RefNoExhausted,
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionLost => true,
            ClientError::Server { code, .. } => code.is_retryable(),
            _ => false,
        }
    }

    /// Returns the server error code, if this is a server error.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ClientError::Server {
            code: ErrorCode::NoSuchText,
            detail: 1001,
        };
        assert_eq!(err.to_string(), "server error: no-such-text (detail 1001)");
        assert_eq!(err.error_code(), Some(ErrorCode::NoSuchText));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::ConnectionLost.is_retryable());
        assert!(ClientError::Server {
            code: ErrorCode::TemporaryFailure,
            detail: 0
        }
        .is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
        assert_eq!(ClientError::NotLoggedIn.error_code(), None);
    }
}
