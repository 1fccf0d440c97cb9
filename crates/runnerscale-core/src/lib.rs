//! runnerscale-core: shared types and configuration for the runner
//! autoscaler.
//!
//! The queue crate produces [`QueueRecord`]s and [`JobStatusCount`]s, the
//! autoscale crate consumes them together with a [`PoolState`] and turns
//! them into capacity decisions. Both read their settings from
//! [`RunnerscaleConfig`].

pub mod config;
pub mod duration;
pub mod types;

pub use config::RunnerscaleConfig;
pub use duration::parse_duration;
pub use types::*;
