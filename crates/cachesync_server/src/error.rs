//! Error types for the sync server.

use cachesync_protocol::WireError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Framing or message decoding failure on a session's stream. The
    /// session is terminated; there is no recoverable boundary to resume
    /// from.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A client sent a message type only the server may send. Terminating
    /// the session instead of ignoring it keeps protocol bugs visible.
    #[error("unexpected message type from client: {message_type}")]
    UnexpectedMessage {
        /// Wire name of the offending message type.
        message_type: &'static str,
    },

    /// I/O error on the listener or a session stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ServerError::UnexpectedMessage {
            message_type: "changes_response",
        };
        assert!(err.to_string().contains("changes_response"));
    }
}
