//! Autoscaler: queue-driven desired-capacity control.
//!
//! Reads the queue snapshot once per tick, routes the per-status counts to
//! each known pool, and asks the [`ScalingPolicy`] for a decision. The
//! actual capacity change is submitted through a [`CapacitySetter`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use runnerscale_core::{JobStatusCount, PoolId, PoolState, QueueRecord};
use runnerscale_queue::{aggregate, PoolCounts, QueueSource};

use crate::error::{ScaleError, TickError};
use crate::inventory::{CapacitySetter, PoolInventory};
use crate::policy::{queue_load, Action, Outcome, ScalingPolicy};

/// Shortest period `run` will tick at.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one pool's evaluation within a tick.
#[derive(Debug)]
pub struct PoolDecision {
    pub pool_id: PoolId,
    pub outcome: Result<Action, ScaleError>,
}

/// Per-pool outcomes of a tick, in known-pool order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub decisions: Vec<PoolDecision>,
}

#[derive(Serialize)]
struct DecisionSummary<'a> {
    pool: &'a str,
    #[serde(flatten)]
    action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TickReport {
    /// Pools whose evaluation failed.
    pub fn failures(&self) -> impl Iterator<Item = &PoolDecision> {
        self.decisions.iter().filter(|d| d.outcome.is_err())
    }

    /// The decision for a pool, if it was evaluated successfully.
    pub fn action(&self, pool_id: &str) -> Option<Action> {
        self.decisions
            .iter()
            .find(|d| d.pool_id == pool_id)
            .and_then(|d| d.outcome.as_ref().ok().copied())
    }

    /// JSON rendering: one object per pool with its action or error.
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<DecisionSummary<'_>> = self
            .decisions
            .iter()
            .map(|d| DecisionSummary {
                pool: &d.pool_id,
                action: d.outcome.as_ref().ok().copied(),
                error: d.outcome.as_ref().err().map(|e| e.to_string()),
            })
            .collect();
        serde_json::json!(rows)
    }
}

/// The autoscaler evaluates the queue and decides whether to grow or
/// shrink each known pool.
pub struct Autoscaler {
    queue: Arc<dyn QueueSource>,
    inventory: Arc<dyn PoolInventory>,
    setter: Arc<dyn CapacitySetter>,
    /// Pools evaluated every tick, in this order.
    known_pools: Vec<PoolId>,
    policy: ScalingPolicy,
}

impl Autoscaler {
    /// Create a new autoscaler with the default policy.
    pub fn new(
        queue: Arc<dyn QueueSource>,
        inventory: Arc<dyn PoolInventory>,
        setter: Arc<dyn CapacitySetter>,
        known_pools: Vec<PoolId>,
    ) -> Self {
        Self {
            queue,
            inventory,
            setter,
            known_pools,
            policy: ScalingPolicy::default(),
        }
    }

    /// Override the scaling policy.
    pub fn with_policy(mut self, policy: ScalingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn known_pools(&self) -> &[PoolId] {
        &self.known_pools
    }

    /// Resolve the single worker group serving `pool_id`.
    pub async fn resolve_pool(&self, pool_id: &str) -> Result<PoolState, ScaleError> {
        let mut matches = self
            .inventory
            .describe_pools(pool_id)
            .await
            .map_err(|e| ScaleError::Inventory {
                pool_id: pool_id.to_string(),
                message: format!("{e:#}"),
            })?;

        if matches.len() != 1 {
            return Err(ScaleError::Resolution {
                pool_id: pool_id.to_string(),
                matches: matches.len(),
            });
        }
        Ok(matches.remove(0))
    }

    /// Decide, log, and (outside dry-run) apply the capacity for one pool.
    ///
    /// The returned action does not depend on `dry_run`. A rejected
    /// capacity submission is logged and does not change the result.
    pub async fn decide(
        &self,
        pool_id: &str,
        counts: &[JobStatusCount],
        pool: &PoolState,
        dry_run: bool,
    ) -> Result<Action, ScaleError> {
        let load = queue_load(pool_id, counts)?;

        if !pool.is_consistent() {
            warn!(
                pool = %pool_id,
                group = %pool.group_name,
                desired = pool.current_capacity,
                min = pool.min_capacity,
                max = pool.max_capacity,
                "group capacity outside its own min/max"
            );
        }

        let outcome = self.policy.evaluate(load, pool);
        match outcome {
            Outcome::ScaleUp(to) => info!(
                pool = %pool_id,
                group = %pool.group_name,
                from = pool.current_capacity,
                to,
                max = pool.max_capacity,
                running = load.running,
                queued = load.queued,
                dry_run,
                "capacity will be increased"
            ),
            Outcome::ScaleDown(to) => info!(
                pool = %pool_id,
                group = %pool.group_name,
                from = pool.current_capacity,
                to,
                min = pool.min_capacity,
                running = load.running,
                queued = load.queued,
                dry_run,
                "capacity will be decreased"
            ),
            Outcome::Suppressed(reason) => debug!(
                pool = %pool_id,
                group = %pool.group_name,
                desired = pool.current_capacity,
                min = pool.min_capacity,
                max = pool.max_capacity,
                running = load.running,
                queued = load.queued,
                %reason,
                "no capacity change"
            ),
        }

        let action = outcome.action();
        if let Action::SetCapacity(capacity) = action
            && !dry_run
            && let Err(e) = self
                .setter
                .set_desired_capacity(&pool.group_name, capacity)
                .await
        {
            warn!(
                pool = %pool_id,
                group = %pool.group_name,
                capacity,
                error = %e,
                "capacity change failed"
            );
        }

        Ok(action)
    }

    /// Fetch the queue snapshot, refreshing credentials and retrying once
    /// if the first attempt fails.
    pub async fn fetch_snapshot(&self) -> Result<Vec<QueueRecord>, TickError> {
        match self.queue.fetch_snapshot().await {
            Ok(records) => Ok(records),
            Err(e) => {
                error!(error = %e, "queue snapshot failed, refreshing credentials and retrying");
                self.queue.refresh_credentials().await?;
                Ok(self.queue.fetch_snapshot().await?)
            }
        }
    }

    /// Run one control-loop tick over every known pool.
    ///
    /// Without a snapshot nothing is evaluated. A failing pool is logged
    /// and recorded, and the remaining pools are still evaluated.
    pub async fn run_tick(&self, dry_run: bool) -> Result<TickReport, TickError> {
        let records = self.fetch_snapshot().await?;
        info!(rows = records.len(), "received queue snapshot");
        debug!(?records, "queue snapshot rows");

        let mut report = TickReport::default();
        for PoolCounts { pool_id, counts } in aggregate(&records, &self.known_pools) {
            let outcome = self.evaluate_pool(&pool_id, &counts, dry_run).await;
            if let Err(e) = &outcome {
                error!(pool = %pool_id, error = %e, "pool evaluation failed");
            }
            report.decisions.push(PoolDecision { pool_id, outcome });
        }
        Ok(report)
    }

    async fn evaluate_pool(
        &self,
        pool_id: &str,
        counts: &[JobStatusCount],
        dry_run: bool,
    ) -> Result<Action, ScaleError> {
        let pool = self.resolve_pool(pool_id).await?;
        self.decide(pool_id, counts, &pool, dry_run).await
    }

    /// Run the autoscaler loop until `shutdown` fires.
    ///
    /// An `interval` below [`MIN_TICK_INTERVAL`] is raised to it.
    pub async fn run(
        &self,
        interval: Duration,
        dry_run: bool,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        if interval < MIN_TICK_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "tick interval too short, using the minimum"
            );
        }
        let interval = interval.max(MIN_TICK_INTERVAL);
        info!(
            interval_secs = interval.as_secs(),
            pools = self.known_pools.len(),
            dry_run,
            "autoscaler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_tick(dry_run).await {
                        Ok(report) => {
                            let failed = report.failures().count();
                            debug!(pools = report.decisions.len(), failed, "tick complete");
                        }
                        Err(e) => error!(error = %e, "autoscaler tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
