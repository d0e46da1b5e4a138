//! Validator bookkeeping: registration, activation/exit queues, effective-balance hysteresis,
//! ejections, and per-epoch committee shuffling.
//!
//! This is a plain struct, not internally locked — the coordinator (`beacon_node`) wraps it in a
//! `parking_lot::RwLock` per the single-lock-per-component rule and holds the write half only
//! across the duration of one call, never across a call into another component.

use std::collections::HashMap;

use crypto::Keccak256Hasher;
use helper_functions::{beacon_state_accessors, beacon_state_mutators, misc};
use thiserror::Error;
use types::{
    config::Config,
    primitives::{CommitteeIndex, Epoch, Gwei, PublicKeyBytes, Slot, ValidatorIndex, FAR_FUTURE_EPOCH, H256},
    types::Validator,
    BeaconState,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("validator index out of range")]
    IndexOutOfRange,
    #[error("no validator registered under that public key")]
    UnknownPubkey,
}

/// Committees for one epoch, indexed `[slot_within_epoch][committee_index]`.
type EpochCommittees = Vec<Vec<Vec<ValidatorIndex>>>;

pub struct ValidatorRegistry {
    config: Config,
    pubkey_index: HashMap<PublicKeyBytes, ValidatorIndex>,
    committee_cache: HashMap<Epoch, EpochCommittees>,
}

impl ValidatorRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pubkey_index: HashMap::new(),
            committee_cache: HashMap::new(),
        }
    }

    /// Registers a new validator in `state` and returns its freshly assigned index.
    pub fn register(
        &mut self,
        state: &mut BeaconState,
        pubkey: PublicKeyBytes,
        withdrawal_credentials: types::primitives::H256,
        effective_balance: Gwei,
        balance: Gwei,
    ) -> ValidatorIndex {
        let index = state.validators.len() as ValidatorIndex;
        let validator = Validator::new(index, pubkey, withdrawal_credentials, balance, effective_balance);
        self.pubkey_index.insert(pubkey, index);
        state.validators.push(validator);
        state.balances.push(balance);
        index
    }

    pub fn get<'a>(&self, state: &'a BeaconState, index: ValidatorIndex) -> Result<&'a Validator, Error> {
        state.validator(index).ok_or(Error::IndexOutOfRange)
    }

    pub fn get_by_pubkey<'a>(
        &self,
        state: &'a BeaconState,
        pubkey: &PublicKeyBytes,
    ) -> Result<&'a Validator, Error> {
        let index = *self.pubkey_index.get(pubkey).ok_or(Error::UnknownPubkey)?;
        self.get(state, index)
    }

    pub fn active_indices(&self, state: &BeaconState, epoch: Epoch) -> Vec<ValidatorIndex> {
        beacon_state_accessors::active_validator_indices(state, epoch)
    }

    pub fn total_active_balance(&self, state: &BeaconState, epoch: Epoch) -> Gwei {
        beacon_state_accessors::total_active_balance(&self.config, state, epoch)
    }

    pub fn churn_limit(&self, state: &BeaconState, epoch: Epoch) -> u64 {
        beacon_state_accessors::validator_churn_limit(&self.config, state, epoch)
    }

    /// Activates up to `churn_limit` eligible candidates, sorted by `(eligibility_epoch, index)`.
    /// Returns the indices actually activated.
    pub fn process_activation_queue(
        &mut self,
        state: &mut BeaconState,
        current_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Vec<ValidatorIndex> {
        let limit = self.churn_limit(state, current_epoch) as usize;

        let mut candidates: Vec<ValidatorIndex> = state
            .validators
            .iter()
            .filter(|v| {
                v.activation_eligibility_epoch != FAR_FUTURE_EPOCH
                    && v.activation_epoch == FAR_FUTURE_EPOCH
                    && v.activation_eligibility_epoch <= finalized_epoch
                    && !v.slashed
                    && v.effective_balance >= self.config.min_activation_balance
            })
            .map(|v| v.index)
            .collect();
        candidates.sort_by_key(|&index| {
            (state.validators[index as usize].activation_eligibility_epoch, index)
        });

        let activated: Vec<ValidatorIndex> = candidates.into_iter().take(limit).collect();
        for &index in &activated {
            state.validators[index as usize].activation_epoch =
                current_epoch + 1 + self.config.max_seed_lookahead;
        }
        activated
    }

    pub fn process_exit(
        &mut self,
        state: &mut BeaconState,
        indices: &[ValidatorIndex],
        current_epoch: Epoch,
    ) -> Result<(), helper_functions::error::Error> {
        for &index in indices {
            beacon_state_mutators::initiate_validator_exit(&self.config, state, index, current_epoch)?;
        }
        Ok(())
    }

    /// Ejects active validators whose effective balance has fallen to or below
    /// `ejection_balance` and who have not already been scheduled for exit.
    pub fn process_ejections(&mut self, state: &mut BeaconState, epoch: Epoch) {
        let candidates: Vec<ValidatorIndex> = state
            .validators
            .iter()
            .filter(|v| {
                v.is_active_at(epoch)
                    && v.effective_balance <= self.config.ejection_balance
                    && v.exit_epoch == FAR_FUTURE_EPOCH
            })
            .map(|v| v.index)
            .collect();
        for index in candidates {
            // Ejection races registry-driven voluntary exits; either can win so errors are ignored.
            let _ = beacon_state_mutators::initiate_validator_exit(&self.config, state, index, epoch);
        }
    }

    /// Applies the hysteresis rule from the configuration keys table: effective balance only
    /// moves when the raw balance has drifted outside the `[eff-down, eff+up)` band.
    pub fn update_effective_balances(&mut self, state: &mut BeaconState) {
        let increment = self.config.effective_balance_increment;
        let half = increment / self.config.hysteresis_quotient;
        let down = half * self.config.hysteresis_downward_multiplier;
        let up = half * self.config.hysteresis_upward_multiplier;

        for validator in &mut state.validators {
            let balance = validator.balance;
            let effective = validator.effective_balance;
            if balance + down < effective || effective + up < balance {
                validator.effective_balance =
                    (balance - balance % increment).min(self.config.max_effective_balance);
            }
        }
    }

    fn committees_per_slot(&self, active_count: u64) -> u64 {
        let raw = active_count / (self.config.slots_per_epoch * self.config.target_committee_size);
        raw.clamp(1, self.config.max_committees_per_slot)
    }

    /// Computes (and caches) committees for `epoch`, shuffled with `seed`. Returned structure is
    /// `[slot_within_epoch][committee_index] -> members`.
    pub fn compute_committees(
        &mut self,
        state: &BeaconState,
        epoch: Epoch,
        seed: H256,
        hasher: &dyn Keccak256Hasher,
    ) -> &EpochCommittees {
        if !self.committee_cache.contains_key(&epoch) {
            let mut active = self.active_indices(state, epoch);
            misc::shuffle_indices(&mut active, seed, hasher);

            let committees_per_slot = self.committees_per_slot(active.len() as u64);
            let total_committees = (committees_per_slot * self.config.slots_per_epoch) as usize;
            let flat = misc::partition_into_committees(&active, total_committees);

            let per_slot = flat
                .chunks(committees_per_slot as usize)
                .map(<[Vec<ValidatorIndex>]>::to_vec)
                .collect();
            self.committee_cache.insert(epoch, per_slot);
        }
        self.committee_cache.get(&epoch).expect("just inserted")
    }

    pub fn get_committee(
        &mut self,
        state: &BeaconState,
        epoch: Epoch,
        slot: Slot,
        committee_index: CommitteeIndex,
        seed: H256,
        hasher: &dyn Keccak256Hasher,
    ) -> Option<Vec<ValidatorIndex>> {
        let slot_within_epoch = (slot % self.config.slots_per_epoch) as usize;
        self.compute_committees(state, epoch, seed, hasher)
            .get(slot_within_epoch)?
            .get(committee_index as usize)
            .cloned()
    }

    pub fn invalidate_committee_cache(&mut self, epoch: Epoch) {
        self.committee_cache.remove(&epoch);
    }

    /// Marks newly-eligible validators for the activation queue: `activation_eligibility_epoch`
    /// starts at `current_epoch + 1`, one epoch after the balance first clears the threshold.
    pub fn process_eligibility(&mut self, state: &mut BeaconState, current_epoch: Epoch) {
        for validator in &mut state.validators {
            if validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
                && validator.effective_balance >= self.config.min_activation_balance
            {
                validator.activation_eligibility_epoch = current_epoch + 1;
            }
        }
    }
}
