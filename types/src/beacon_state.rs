use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::Config,
    primitives::{Epoch, Slot, ValidatorIndex, H256},
    types::{Checkpoint, Validator},
};

/// Ring buffer sizes. Mainnet values; see `BeaconState::new`.
pub const EPOCHS_PER_HISTORICAL_VECTOR: u64 = 65_536;
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8_192;

/// Per-epoch participation flags: did this validator have a timely source/target/head vote.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct ParticipationFlags {
    pub source: bool,
    pub target: bool,
    pub head: bool,
}

/// The canonical beacon state. Owned by a single logical writer (the epoch-transition or block
/// processor) at a time; readers are expected to work off a cloned snapshot (see `BeaconState::snapshot`).
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BeaconState {
    pub genesis_time: u64,
    pub slot: Slot,

    pub validators: Vec<Validator>,
    pub balances: Vec<u64>,

    pub randao_mixes: Vec<H256>,
    pub slashings: Vec<u64>,
    pub block_roots: Vec<H256>,
    pub state_roots: Vec<H256>,

    /// Bits `[0..4)`, most-recent epoch first. See `EpochTransition::process_justification`.
    pub justification_bits: [bool; 4],
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    pub previous_epoch_participation: Vec<ParticipationFlags>,
    pub current_epoch_participation: Vec<ParticipationFlags>,
    pub inactivity_scores: Vec<u64>,
}

impl BeaconState {
    pub fn new(genesis_time: u64) -> Self {
        Self {
            genesis_time,
            slot: 0,
            validators: Vec::new(),
            balances: Vec::new(),
            randao_mixes: vec![H256::zero(); EPOCHS_PER_HISTORICAL_VECTOR as usize],
            slashings: vec![0; SLOTS_PER_HISTORICAL_ROOT as usize],
            block_roots: vec![H256::zero(); SLOTS_PER_HISTORICAL_ROOT as usize],
            state_roots: vec![H256::zero(); SLOTS_PER_HISTORICAL_ROOT as usize],
            justification_bits: [false; 4],
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            previous_epoch_participation: Vec::new(),
            current_epoch_participation: Vec::new(),
            inactivity_scores: Vec::new(),
        }
    }

    pub fn current_epoch(&self, config: &Config) -> Epoch {
        self.slot / config.slots_per_epoch
    }

    pub fn randao_mix(&self, epoch: Epoch) -> H256 {
        self.randao_mixes[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize]
    }

    pub fn set_randao_mix(&mut self, epoch: Epoch, mix: H256) {
        let len = self.randao_mixes.len() as u64;
        self.randao_mixes[(epoch % len) as usize] = mix;
    }

    pub fn block_root_at_slot(&self, slot: Slot) -> H256 {
        let len = self.block_roots.len() as u64;
        self.block_roots[(slot % len) as usize]
    }

    pub fn set_block_root(&mut self, slot: Slot, root: H256) {
        let len = self.block_roots.len() as u64;
        self.block_roots[(slot % len) as usize] = root;
    }

    pub fn slashings_at(&self, epoch: Epoch) -> u64 {
        let len = self.slashings.len() as u64;
        self.slashings[(epoch % len) as usize]
    }

    pub fn set_slashings_at(&mut self, epoch: Epoch, value: u64) {
        let len = self.slashings.len() as u64;
        self.slashings[(epoch % len) as usize] = value;
    }

    pub fn validator(&self, index: ValidatorIndex) -> Option<&Validator> {
        self.validators.get(index as usize)
    }

    /// A deterministic hash over the fields enumerated by the state-root specification: genesis
    /// time, slot/epoch, validator count, per-validator tuple, and the finalized checkpoint.
    /// Recomputing this on an unchanged state always yields the same 32 bytes.
    pub fn state_root(&self, config: &Config) -> H256 {
        let mut hasher = Sha256::new();
        hasher.update(self.genesis_time.to_le_bytes());
        hasher.update(self.slot.to_le_bytes());
        hasher.update(self.current_epoch(config).to_le_bytes());
        hasher.update((self.validators.len() as u64).to_le_bytes());
        for validator in &self.validators {
            hasher.update(validator.pubkey.0);
            hasher.update(validator.effective_balance.to_le_bytes());
            hasher.update(validator.balance.to_le_bytes());
            hasher.update([validator.slashed as u8]);
            hasher.update(validator.activation_epoch.to_le_bytes());
            hasher.update(validator.exit_epoch.to_le_bytes());
        }
        hasher.update(self.finalized_checkpoint.epoch.to_le_bytes());
        hasher.update(self.finalized_checkpoint.root.as_bytes());
        H256::from_slice(&hasher.finalize())
    }

    /// A read-only copy for concurrent readers while a writer continues mutating the original.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_root_is_deterministic() {
        let config = Config::minimal();
        let state = BeaconState::new(0);
        assert_eq!(state.state_root(&config), state.state_root(&config));
    }

    #[test]
    fn state_root_changes_with_finalized_checkpoint() {
        let config = Config::minimal();
        let mut state = BeaconState::new(0);
        let before = state.state_root(&config);
        state.finalized_checkpoint = Checkpoint::new(3, H256::repeat_byte(7));
        assert_ne!(before, state.state_root(&config));
    }

    #[test]
    fn randao_mix_ring_buffer_wraps() {
        let mut state = BeaconState::new(0);
        state.set_randao_mix(0, H256::repeat_byte(1));
        state.set_randao_mix(EPOCHS_PER_HISTORICAL_VECTOR, H256::repeat_byte(2));
        assert_eq!(state.randao_mix(0), H256::repeat_byte(2));
    }
}
