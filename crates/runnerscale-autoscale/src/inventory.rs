//! Worker group inventory: where pool capacity comes from and goes to.

use tokio::sync::RwLock;
use tracing::info;

use runnerscale_core::config::{GroupConfig, InventoryConfig};
use runnerscale_core::PoolState;
use runnerscale_queue::BoxFuture;

/// Lists the worker groups serving a pool.
///
/// Returns every match; the autoscaler insists on exactly one.
pub trait PoolInventory: Send + Sync {
    fn describe_pools<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<PoolState>>>;
}

/// Submits a new desired capacity for a worker group.
///
/// Completes once the request is accepted; convergence is not awaited.
pub trait CapacitySetter: Send + Sync {
    fn set_desired_capacity<'a>(
        &'a self,
        group_name: &'a str,
        capacity: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// In-memory group table seeded from `[[inventory.groups]]`.
///
/// Capacity changes update the stored desired value, so successive ticks
/// see the effect of earlier decisions.
#[derive(Debug, Default)]
pub struct StaticInventory {
    groups: RwLock<Vec<GroupConfig>>,
}

impl StaticInventory {
    pub fn new(groups: Vec<GroupConfig>) -> Self {
        Self {
            groups: RwLock::new(groups),
        }
    }

    pub fn from_config(config: &InventoryConfig) -> Self {
        Self::new(config.groups.clone())
    }

    /// Current desired capacity of a group, if it exists.
    pub async fn desired(&self, group_name: &str) -> Option<u32> {
        self.groups
            .read()
            .await
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.desired)
    }
}

impl PoolInventory for StaticInventory {
    fn describe_pools<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<PoolState>>> {
        Box::pin(async move {
            let groups = self.groups.read().await;
            Ok(groups
                .iter()
                .filter(|g| g.pool == pool_id)
                .map(|g| PoolState {
                    pool_id: g.pool.clone(),
                    group_name: g.name.clone(),
                    current_capacity: g.desired,
                    min_capacity: g.min,
                    max_capacity: g.max,
                })
                .collect())
        })
    }
}

impl CapacitySetter for StaticInventory {
    fn set_desired_capacity<'a>(
        &'a self,
        group_name: &'a str,
        capacity: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut groups = self.groups.write().await;
            let group = groups
                .iter_mut()
                .find(|g| g.name == group_name)
                .ok_or_else(|| anyhow::anyhow!("unknown worker group {group_name:?}"))?;
            let previous = group.desired;
            group.desired = capacity;
            info!(group = %group_name, from = previous, to = capacity, "desired capacity set");
            Ok(())
        })
    }
}
