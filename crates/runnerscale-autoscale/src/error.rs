//! Autoscaler error types.

use thiserror::Error;

use runnerscale_queue::QueueError;

/// Errors that abort evaluation of a single pool. Other pools in the same
/// tick are still evaluated.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("pool {pool_id}: invalid queue counts: {reason}")]
    Validation { pool_id: String, reason: String },

    #[error("pool {pool_id}: expected exactly one worker group, found {matches}")]
    Resolution { pool_id: String, matches: usize },

    #[error("pool {pool_id}: inventory lookup failed: {message}")]
    Inventory { pool_id: String, message: String },
}

/// Errors that abort a whole control-loop tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("queue snapshot unavailable: {0}")]
    Upstream(#[from] QueueError),
}
