//! runnerscale-queue: where the autoscaler's view of the job queue
//! comes from.
//!
//! Fetches the latest status of every recent self-hosted job from the job
//! analytics store, then re-partitions the rows by known pool label.
//!
//! # Architecture
//!
//! ```text
//! QueueSource (trait)
//!   └── ClickHouseSource
//!       ├── CredentialSource → QueueCredentials (refreshable)
//!       ├── RetryPolicy / Backoff between attempts
//!       └── JSONEachRow → Vec<QueueRecord>
//!
//! aggregate(records, known_pools) → Vec<PoolCounts>
//! ```

pub mod aggregator;
pub mod backoff;
pub mod clickhouse;
pub mod credentials;
pub mod error;
pub mod query;
pub mod source;

pub use aggregator::{aggregate, PoolCounts};
pub use backoff::{Backoff, RetryPolicy};
pub use clickhouse::ClickHouseSource;
pub use credentials::{CredentialSource, EnvCredentials, QueueCredentials, StaticCredentials};
pub use error::{QueueError, QueueResult};
pub use query::build_queue_query;
pub use source::{BoxFuture, QueueSource};
