//! runnerscale-autoscale: queue-driven capacity control for runner groups.
//!
//! Every tick reads the queue snapshot, splits it per known pool, and for
//! each pool compares running and queued jobs against the group's current
//! desired capacity.
//!
//! # Scaling Algorithm
//!
//! ```text
//! reserve = max(0, desired - running)
//!
//! if queued > 0:
//!     skip if desired - running - queued > 0   // idle runners cover the queue
//!     skip if max <= desired
//!     target = clamp(desired + (queued - reserve) / 5, min, max)
//!
//! else:
//!     skip if desired <= min or desired <= running
//!     target = clamp(desired - reserve / 3, min, max)
//!
//! SetCapacity(target) unless target == desired
//! ```
//!
//! Scale-up is damped more than scale-down, so idle runners are released
//! faster than new ones are requested. Decisions are always logged; they
//! are only applied outside dry-run mode.

pub mod error;
pub mod inventory;
pub mod policy;
pub mod scaler;

pub use error::{ScaleError, TickError};
pub use inventory::{CapacitySetter, PoolInventory, StaticInventory};
pub use policy::{Action, Outcome, ScalingPolicy, Suppression};
pub use scaler::{Autoscaler, PoolDecision, TickReport, MIN_TICK_INTERVAL};
