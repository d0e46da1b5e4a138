//! Per-slot (not per-epoch) state bookkeeping: caches the pre-advance state root into the
//! `state_roots` ring buffer before the slot counter moves on. Distinct from `epoch_transition`,
//! which only runs at epoch boundaries.

use types::{beacon_state::BeaconState, config::Config};

/// Caches `state`'s current root at `state.slot`'s ring-buffer slot, ahead of advancing.
pub fn cache_state_root(config: &Config, state: &mut BeaconState) {
    let root = state.state_root(config);
    let len = state.state_roots.len() as u64;
    let index = (state.slot % len) as usize;
    state.state_roots[index] = root;
}

/// Advances `state.slot` by one, caching the state root first. Callers drive the loop (stepping
/// one slot at a time so `beacon_node` can interleave `epoch_transition::process_epoch` at
/// boundaries) rather than jumping straight to a target slot.
pub fn advance_slot(config: &Config, state: &mut BeaconState) {
    cache_state_root(config, state);
    state.slot += 1;
}
