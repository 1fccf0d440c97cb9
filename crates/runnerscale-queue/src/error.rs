//! Queue snapshot error types.

use thiserror::Error;

/// Result type alias for queue snapshot operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised while obtaining the queue snapshot.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode row {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<QueueError> },
}
