//! Error types for framing and message decoding.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised by the framing layer.
///
/// Any of these terminates the connection: a stream whose framing is
/// broken has no recoverable message boundary to resume from.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A frame declared a length above [`crate::MAX_FRAME_LEN`].
    #[error("frame length {len} exceeds maximum {max}")]
    Oversized {
        /// Declared payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream truncated mid-frame")]
    Truncated,

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when decoding or encoding a framed message.
#[derive(Error, Debug)]
pub enum WireError {
    /// Framing failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Payload was not a valid message: bad JSON, unknown `type`, or a
    /// missing required field. Treated as a protocol violation: the
    /// connection is terminated, never silently skipped.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
