//! Re-partitions queue rows by known pool label.

use runnerscale_core::{JobStatusCount, PoolId, QueueRecord};

/// Status counts routed to one known pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCounts {
    pub pool_id: PoolId,
    pub counts: Vec<JobStatusCount>,
}

/// Route every record to each known pool whose label it carries.
///
/// Output follows the order of `known_pools`, and a pool with no matching
/// rows still appears with an empty `counts`. A row whose labels name two
/// known pools contributes its full count to both. Statuses are passed
/// through unvalidated.
pub fn aggregate(records: &[QueueRecord], known_pools: &[String]) -> Vec<PoolCounts> {
    known_pools
        .iter()
        .map(|pool_id| PoolCounts {
            pool_id: pool_id.clone(),
            counts: records
                .iter()
                .filter(|r| r.labels.iter().any(|l| l == pool_id))
                .map(|r| JobStatusCount {
                    pool_id: pool_id.clone(),
                    status: r.status.clone(),
                    count: r.length,
                })
                .collect(),
        })
        .collect()
}
