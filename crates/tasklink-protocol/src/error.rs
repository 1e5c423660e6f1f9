//! Error types for the tasklink client stack.

use thiserror::Error;

/// Errors surfaced by decoding, streaming, and dispatch operations.
///
/// Decode-level variants (`MalformedFrame`, `UnknownEventShape`) never end a
/// stream; a session converts them into an `error` event. `Connection` always
/// ends the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown event shape: {0}")]
    UnknownEventShape(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),
    #[error("invalid stream locator: {0}")]
    InvalidLocator(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TaskError {
    /// True for errors that concern a single frame rather than the channel.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::UnknownEventShape(_))
    }
}

/// Convenience result type for tasklink operations.
pub type TaskResult<T> = Result<T, TaskError>;
