//! Protocol error types.

use thiserror::Error;

/// Errors raised while deriving topics or decoding shadow payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("topic is {len} bytes, limit is {max}")]
    TopicTooLong { len: usize, max: usize },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("partial payload: received {received} of {total} bytes")]
    PartialPayload { received: usize, total: usize },
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
