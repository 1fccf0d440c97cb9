//! Domain types shared by the queue aggregator and the capacity controller.
//!
//! Everything here is rebuilt from external data on every control-loop
//! tick; nothing is persisted between ticks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a worker pool, e.g. `"builder"`. Matches a runner label.
pub type PoolId = String;

// ── Queue ─────────────────────────────────────────────────────────

/// The two job states the autoscaler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// A runner has picked the job up.
    #[serde(rename = "in_progress")]
    Running,
    /// The job is waiting for a runner.
    #[serde(rename = "queued")]
    Queued,
}

impl JobStatus {
    /// Status string as reported by the job analytics store.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "in_progress",
            JobStatus::Queued => "queued",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is neither `in_progress` nor `queued`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job status {0:?} is not one of [\"in_progress\", \"queued\"]")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(JobStatus::Running),
            "queued" => Ok(JobStatus::Queued),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One row of the queue snapshot: how many jobs with exactly this label
/// set are currently in `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Latest status of the jobs, as reported upstream. Not validated here.
    pub status: String,
    /// Number of jobs in this bucket.
    pub length: u32,
    /// Full runner label set requested by the jobs.
    pub labels: Vec<String>,
}

/// Count of jobs in one status bucket for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusCount {
    pub pool_id: PoolId,
    /// Status as reported upstream; validated by the controller.
    pub status: String,
    pub count: u32,
}

/// Validated per-pool load: at most one running and one queued count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLoad {
    pub running: u32,
    pub queued: u32,
}

// ── Pool ──────────────────────────────────────────────────────────

/// Snapshot of one worker group as described by the pool inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub pool_id: PoolId,
    /// Provider-side name of the group; capacity changes are addressed to it.
    pub group_name: String,
    pub current_capacity: u32,
    pub min_capacity: u32,
    pub max_capacity: u32,
}

impl PoolState {
    /// Whether `min <= current <= max` holds.
    pub fn is_consistent(&self) -> bool {
        self.min_capacity <= self.current_capacity && self.current_capacity <= self.max_capacity
    }
}
