//! Equivocation detection and the bounded pool of evidence awaiting block inclusion.
//!
//! Detection and queuing are split the way the pool/fork-choice pair is: `EquivocationDetector`
//! is a pure "have I seen this before" oracle, `SlashingPool` is what the coordinator drains into
//! blocks. Each gets its own `parking_lot::RwLock` at the `beacon_node` level.

pub mod detector;
pub mod slashing_pool;

pub use detector::{Error as DetectorError, Evidence, EquivocationDetector};
pub use slashing_pool::{compute_penalty, Error as SlashingPoolError, Penalty, SlashingPool, SlashingRecord};
