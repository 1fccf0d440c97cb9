//! Capacity policy: turns a pool's queue load into a new desired capacity.
//!
//! Pure functions only; logging and applying decisions live in
//! [`crate::scaler`].

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use runnerscale_core::config::ControllerConfig;
use runnerscale_core::{JobStatus, JobStatusCount, PoolState, QueueLoad};

use crate::error::ScaleError;

/// What the controller asks the pool inventory to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "capacity", rename_all = "snake_case")]
pub enum Action {
    NoOp,
    SetCapacity(u32),
}

/// Why a change was not made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Idle capacity already exceeds the queue.
    ReserveCoversQueue,
    /// Desired capacity is already at the group maximum.
    AtMaximum,
    /// Desired capacity is already at the group minimum.
    AtMinimum,
    /// Every instance is busy with a running job.
    FullyUtilized,
    /// The damped, clamped target equals the current capacity.
    Unchanged,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Suppression::ReserveCoversQueue => "reserve covers queue",
            Suppression::AtMaximum => "at maximum capacity",
            Suppression::AtMinimum => "at minimum capacity",
            Suppression::FullyUtilized => "all capacity in use",
            Suppression::Unchanged => "no effective change",
        })
    }
}

/// Result of evaluating the policy for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ScaleUp(u32),
    ScaleDown(u32),
    Suppressed(Suppression),
}

impl Outcome {
    pub fn action(&self) -> Action {
        match *self {
            Outcome::ScaleUp(n) | Outcome::ScaleDown(n) => Action::SetCapacity(n),
            Outcome::Suppressed(_) => Action::NoOp,
        }
    }
}

/// Damping divisors for the two scaling directions.
///
/// Scale-up adds `floor(unmet_queue / scale_up_divisor)` instances per tick;
/// scale-down removes `floor(idle / scale_down_divisor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    pub scale_up_divisor: u32,
    pub scale_down_divisor: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            scale_up_divisor: 5,
            scale_down_divisor: 3,
        }
    }
}

impl ScalingPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            scale_up_divisor: config.scale_up_divisor.max(1),
            scale_down_divisor: config.scale_down_divisor.max(1),
        }
    }

    /// Decide the new desired capacity for a pool.
    ///
    /// Any queued job puts the pool in the scale-up branch; scale-down is
    /// only considered with an empty queue. Targets are clamped to
    /// `[min, max]`, with `max` winning if the group's range is inverted.
    pub fn evaluate(&self, load: QueueLoad, pool: &PoolState) -> Outcome {
        let running = i64::from(load.running);
        let queued = i64::from(load.queued);
        let desired = i64::from(pool.current_capacity);
        let min = i64::from(pool.min_capacity);
        let max = i64::from(pool.max_capacity);

        let reserve = (desired - running).max(0);

        if queued > 0 {
            if desired - running - queued > 0 {
                return Outcome::Suppressed(Suppression::ReserveCoversQueue);
            }
            if max <= desired {
                return Outcome::Suppressed(Suppression::AtMaximum);
            }
            let step = (queued - reserve).div_euclid(i64::from(self.scale_up_divisor.max(1)));
            let target = clamp(desired + step, min, max);
            if target == desired {
                return Outcome::Suppressed(Suppression::Unchanged);
            }
            return Outcome::ScaleUp(to_capacity(target));
        }

        if desired <= min {
            return Outcome::Suppressed(Suppression::AtMinimum);
        }
        if desired <= running {
            return Outcome::Suppressed(Suppression::FullyUtilized);
        }
        let step = reserve.div_euclid(i64::from(self.scale_down_divisor.max(1)));
        let target = clamp(desired - step, min, max);
        if target == desired {
            return Outcome::Suppressed(Suppression::Unchanged);
        }
        Outcome::ScaleDown(to_capacity(target))
    }
}

/// Validate the 0–2 status counts routed to `pool_id` into a [`QueueLoad`].
///
/// Rejects counts addressed to another pool, statuses other than
/// `in_progress`/`queued`, and a status appearing twice.
pub fn queue_load(pool_id: &str, counts: &[JobStatusCount]) -> Result<QueueLoad, ScaleError> {
    let invalid = |reason: String| ScaleError::Validation {
        pool_id: pool_id.to_string(),
        reason,
    };

    let mut load = QueueLoad::default();
    let mut seen = HashSet::new();
    for count in counts {
        if count.pool_id != pool_id {
            return Err(invalid(format!(
                "count for pool {:?} routed here",
                count.pool_id
            )));
        }
        let status = count
            .status
            .parse::<JobStatus>()
            .map_err(|e| invalid(e.to_string()))?;
        if !seen.insert(status) {
            return Err(invalid(format!("duplicate {status} count")));
        }
        match status {
            JobStatus::Running => load.running = count.count,
            JobStatus::Queued => load.queued = count.count,
        }
    }
    Ok(load)
}

fn clamp(value: i64, min: i64, max: i64) -> i64 {
    value.max(min).min(max)
}

// Callers only pass values already clamped into [0, max_capacity].
fn to_capacity(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(current: u32, min: u32, max: u32) -> PoolState {
        PoolState {
            pool_id: "builder".to_string(),
            group_name: "builder-asg".to_string(),
            current_capacity: current,
            min_capacity: min,
            max_capacity: max,
        }
    }

    fn load(running: u32, queued: u32) -> QueueLoad {
        QueueLoad { running, queued }
    }

    fn count(status: &str, n: u32) -> JobStatusCount {
        JobStatusCount {
            pool_id: "builder".to_string(),
            status: status.to_string(),
            count: n,
        }
    }

    #[test]
    fn busy_pool_without_queue_stays_put() {
        // running=10, queued=0, desired=10 in [5, 20]: nothing idle to release.
        let outcome = ScalingPolicy::default().evaluate(load(10, 0), &pool(10, 5, 20));
        assert_eq!(outcome, Outcome::Suppressed(Suppression::FullyUtilized));
        assert_eq!(outcome.action(), Action::NoOp);
    }

    #[test]
    fn backlog_scales_up_gradually() {
        // reserve = 3, step = (20 - 3) / 5 = 3.
        let outcome = ScalingPolicy::default().evaluate(load(2, 20), &pool(5, 1, 30));
        assert_eq!(outcome, Outcome::ScaleUp(8));
        assert_eq!(outcome.action(), Action::SetCapacity(8));
    }

    #[test]
    fn idle_capacity_scales_down() {
        // reserve = 10, step = 10 / 3 = 3.
        let outcome = ScalingPolicy::default().evaluate(load(5, 0), &pool(15, 5, 30));
        assert_eq!(outcome, Outcome::ScaleDown(12));
    }

    #[test]
    fn reserve_covering_queue_suppresses_scale_up() {
        let outcome = ScalingPolicy::default().evaluate(load(2, 3), &pool(10, 1, 30));
        assert_eq!(outcome, Outcome::Suppressed(Suppression::ReserveCoversQueue));
    }

    #[test]
    fn exact_reserve_match_still_evaluates_step() {
        // desired - running - queued == 0 is not "covered"; the step floors to 0.
        let outcome = ScalingPolicy::default().evaluate(load(2, 8), &pool(10, 1, 30));
        assert_eq!(outcome, Outcome::Suppressed(Suppression::Unchanged));
    }

    #[test]
    fn small_queue_flooring_to_zero_is_unchanged() {
        // reserve = 1, step = (2 - 1) / 5 = 0: caught by the final equality check.
        let outcome = ScalingPolicy::default().evaluate(load(0, 2), &pool(1, 0, 10));
        assert_eq!(outcome, Outcome::Suppressed(Suppression::Unchanged));
    }

    #[test]
    fn saturated_pool_never_scales_up() {
        let policy = ScalingPolicy::default();
        for running in 0..15 {
            for queued in 1..40 {
                let outcome = policy.evaluate(load(running, queued), &pool(10, 2, 10));
                assert_eq!(outcome.action(), Action::NoOp, "running={running} queued={queued}");
            }
        }
    }

    #[test]
    fn pool_at_floor_never_scales_down() {
        let policy = ScalingPolicy::default();
        for running in 0..15 {
            let outcome = policy.evaluate(load(running, 0), &pool(3, 3, 20));
            assert_eq!(outcome, Outcome::Suppressed(Suppression::AtMinimum));
        }
    }

    #[test]
    fn queued_work_never_scales_down() {
        // Even with nothing running and lots of idle capacity.
        let policy = ScalingPolicy::default();
        for queued in 1..30 {
            let outcome = policy.evaluate(load(0, queued), &pool(20, 1, 40));
            assert!(!matches!(outcome, Outcome::ScaleDown(_)), "queued={queued}");
        }
    }

    #[test]
    fn targets_stay_within_bounds() {
        let policy = ScalingPolicy::default();
        for current in 0..=12 {
            for running in 0..=15 {
                for queued in [0, 1, 4, 9, 30, 200] {
                    let state = pool(current, 2, 12);
                    let action = policy.evaluate(load(running, queued), &state).action();
                    if let Action::SetCapacity(n) = action {
                        assert!(
                            (2..=12).contains(&n),
                            "current={current} running={running} queued={queued} -> {n}"
                        );
                        assert_ne!(n, current);
                    }
                }
            }
        }
    }

    #[test]
    fn large_backlog_is_clamped_to_max() {
        let outcome = ScalingPolicy::default().evaluate(load(4, 500), &pool(4, 1, 20));
        assert_eq!(outcome, Outcome::ScaleUp(20));
    }

    #[test]
    fn scale_down_is_clamped_to_min() {
        // reserve = 30, step = 10, but min is 25.
        let outcome = ScalingPolicy::default().evaluate(load(0, 0), &pool(30, 25, 40));
        assert_eq!(outcome, Outcome::ScaleDown(25));
    }

    #[test]
    fn below_min_with_queue_is_raised_to_min() {
        let outcome = ScalingPolicy::default().evaluate(load(0, 1), &pool(0, 2, 10));
        assert_eq!(outcome, Outcome::ScaleUp(2));
    }

    #[test]
    fn inverted_range_does_not_panic() {
        let outcome = ScalingPolicy::default().evaluate(load(0, 50), &pool(1, 8, 4));
        assert_eq!(outcome, Outcome::ScaleUp(4));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let policy = ScalingPolicy::default();
        let state = pool(6, 1, 30);
        assert_eq!(
            policy.evaluate(load(3, 17), &state),
            policy.evaluate(load(3, 17), &state)
        );
    }

    #[test]
    fn custom_divisors() {
        let policy = ScalingPolicy {
            scale_up_divisor: 1,
            scale_down_divisor: 1,
        };
        assert_eq!(policy.evaluate(load(2, 20), &pool(5, 1, 30)), Outcome::ScaleUp(22));
        assert_eq!(policy.evaluate(load(5, 0), &pool(15, 1, 30)), Outcome::ScaleDown(5));
    }

    #[test]
    fn policy_from_config() {
        let config = ControllerConfig {
            scale_up_divisor: 7,
            ..ControllerConfig::default()
        };
        let policy = ScalingPolicy::from_config(&config);
        assert_eq!(policy.scale_up_divisor, 7);
        assert_eq!(policy.scale_down_divisor, 3);
    }

    #[test]
    fn queue_load_defaults_missing_statuses() {
        assert_eq!(queue_load("builder", &[]).unwrap(), load(0, 0));
        assert_eq!(queue_load("builder", &[count("queued", 4)]).unwrap(), load(0, 4));
        assert_eq!(
            queue_load("builder", &[count("queued", 4), count("in_progress", 9)]).unwrap(),
            load(9, 4)
        );
    }

    #[test]
    fn queue_load_rejects_unknown_status() {
        let err = queue_load("builder", &[count("cancelled", 1)]).unwrap_err();
        assert!(matches!(err, ScaleError::Validation { ref pool_id, .. } if pool_id == "builder"));
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn queue_load_rejects_duplicate_status() {
        let err = queue_load("builder", &[count("queued", 1), count("queued", 2)]).unwrap_err();
        assert!(err.to_string().contains("duplicate queued"));
    }

    #[test]
    fn queue_load_rejects_foreign_pool() {
        let mut foreign = count("queued", 1);
        foreign.pool_id = "style-checker".to_string();
        assert!(queue_load("builder", &[foreign]).is_err());
    }

    #[test]
    fn action_serializes_tagged() {
        assert_eq!(
            serde_json::to_string(&Action::SetCapacity(8)).unwrap(),
            r#"{"action":"set_capacity","capacity":8}"#
        );
        assert_eq!(serde_json::to_string(&Action::NoOp).unwrap(), r#"{"action":"no_op"}"#);
    }
}
