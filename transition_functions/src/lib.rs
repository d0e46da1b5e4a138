//! State transitions that run outside the per-operation components: per-slot state-root/
//! block-root caching and the per-epoch justification/finalization/rewards/registry pipeline.
//!
//! Block-level signature/body verification is out of scope (see the top-level Non-goals); these
//! functions operate purely on `BeaconState` plus whatever a caller (the `beacon_node`
//! coordinator) has already validated and selected from `attestation_pool`.

pub mod epoch_transition;
pub mod process_slot;
