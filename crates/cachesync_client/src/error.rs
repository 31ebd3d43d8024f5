//! Error types for the sync client.

use cachesync_protocol::ItemId;
use thiserror::Error;

/// Result type for client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync client.
///
/// Everything except [`SyncError::NotFound`] is treated as a connection
/// failure: the engine marks the mirror degraded and reconnects with
/// backoff, resuming from its last committed cursor.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The requested item id is absent from the server's store. Surfaced
    /// to the caller of the affected fetch; the connection stays open.
    #[error("item {0} not found")]
    NotFound(ItemId),

    /// The connection failed or closed with work in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A request exceeded the caller-imposed timeout. The connection is
    /// treated as failed.
    #[error("request timed out")]
    Timeout,

    /// The server sent something the protocol does not allow here.
    /// Terminated, never ignored.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O failure while connecting or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
