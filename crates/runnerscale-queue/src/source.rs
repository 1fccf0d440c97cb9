//! The seam between the control loop and wherever queue data lives.

use std::future::Future;
use std::pin::Pin;

use runnerscale_core::QueueRecord;

use crate::error::QueueResult;

/// Boxed future alias used by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies the per-(labels, status) job counts for one control-loop tick.
///
/// Implementations own their retry policy; an `Err` from
/// [`fetch_snapshot`](QueueSource::fetch_snapshot) means they gave up.
pub trait QueueSource: Send + Sync {
    /// Fetch the current queue snapshot.
    fn fetch_snapshot(&self) -> BoxFuture<'_, QueueResult<Vec<QueueRecord>>>;

    /// Reload credentials or rebuild the connection after a failed fetch.
    fn refresh_credentials(&self) -> BoxFuture<'_, QueueResult<()>>;
}
