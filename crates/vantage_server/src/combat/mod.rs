//! Battle simulation: the pure resolver and the concurrent coordinator.
//!
//! [`resolver`] turns (attackers, defenders, multiplier) into a terminal
//! outcome and tick schedule with no side effects. [`coordinator`] owns the
//! per-target exclusivity invariant, drives the schedule over time, and
//! applies the resulting world mutations.

pub mod coordinator;
pub mod resolver;

pub use coordinator::BattleCoordinator;
pub use resolver::{resolve, BattleOutcome};
