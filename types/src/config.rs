//! Runtime-configurable protocol parameters.
//!
//! The original specification fixed most of these as compile-time type-level constants
//! (`typenum::Unsigned`) so that SSZ list bounds could be encoded in the type system. This
//! implementation has no SSZ encoding layer and slots-per-epoch itself changes at forks (see
//! `SlotClock`), so every parameter here is a plain runtime value carried by `Config`.

use crate::primitives::{Epoch, Gwei, Slot};

/// Protocol-wide configuration, analogous to a chain spec. Cheap to clone; components hold an
/// `Arc<Config>` or a copy rather than a generic type parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub slots_per_epoch: u64,
    pub min_seed_lookahead: u64,
    pub max_seed_lookahead: u64,
    pub min_validator_withdrawability_delay: u64,
    pub shuffle_round_count: u64,
    pub target_committee_size: u64,
    pub max_committees_per_slot: u64,
    pub max_validators_per_committee: u64,

    pub min_activation_balance: Gwei,
    pub max_effective_balance: Gwei,
    pub effective_balance_increment: Gwei,
    pub ejection_balance: Gwei,
    pub hysteresis_quotient: u64,
    pub hysteresis_downward_multiplier: u64,
    pub hysteresis_upward_multiplier: u64,

    pub churn_limit_quotient: u64,
    pub min_per_epoch_churn_limit: u64,

    pub base_reward_factor: u64,
    pub inactivity_penalty_quotient: u64,
    pub inactivity_score_bias: u64,
    pub inactivity_score_recovery_rate: u64,
    pub min_epochs_to_inactivity_penalty: Epoch,

    pub min_slashing_penalty_quotient: u64,
    pub whistleblower_reward_quotient: u64,
    pub proposer_reward_quotient: u64,
    pub epochs_per_slashings_vector: u64,
    pub proportional_slashing_multiplier: u64,

    pub weak_subjectivity_period: Epoch,

    pub max_attestations_per_block: u64,
    pub max_inclusion_delay: Slot,
    pub max_pool_size: usize,
    pub max_slashings_per_block: usize,
    pub max_pending_slashings: usize,
    pub attestation_window_epochs: Epoch,
    pub proposal_retention_slots: Slot,

    pub sync_committee_size: u64,
    pub epochs_per_sync_committee_period: Epoch,
    pub subcommittee_count: u64,
}

impl Config {
    /// Mainnet-shaped defaults (Altair-era inactivity quotient, 32 slots/epoch).
    pub fn mainnet() -> Self {
        Self {
            slots_per_epoch: 32,
            min_seed_lookahead: 1,
            max_seed_lookahead: 4,
            min_validator_withdrawability_delay: 256,
            shuffle_round_count: 90,
            target_committee_size: 128,
            max_committees_per_slot: 64,
            max_validators_per_committee: 2048,

            min_activation_balance: 32_000_000_000,
            max_effective_balance: 32_000_000_000,
            effective_balance_increment: 1_000_000_000,
            ejection_balance: 16_000_000_000,
            hysteresis_quotient: 4,
            hysteresis_downward_multiplier: 1,
            hysteresis_upward_multiplier: 5,

            churn_limit_quotient: 65_536,
            min_per_epoch_churn_limit: 4,

            base_reward_factor: 64,
            inactivity_penalty_quotient: 1 << 26,
            inactivity_score_bias: 4,
            inactivity_score_recovery_rate: 16,
            min_epochs_to_inactivity_penalty: 4,

            min_slashing_penalty_quotient: 128,
            whistleblower_reward_quotient: 512,
            proposer_reward_quotient: 8,
            epochs_per_slashings_vector: 8_192,
            proportional_slashing_multiplier: 3,

            weak_subjectivity_period: 256,

            max_attestations_per_block: 128,
            max_inclusion_delay: 32,
            max_pool_size: 16_384,
            max_slashings_per_block: 16,
            max_pending_slashings: 1_024,
            attestation_window_epochs: 256,
            proposal_retention_slots: 32 * 64,

            sync_committee_size: 512,
            epochs_per_sync_committee_period: 256,
            subcommittee_count: 4,
        }
    }

    /// Bellatrix-era inactivity penalty quotient (`3 * 2^24`), otherwise mainnet shaped.
    pub fn bellatrix() -> Self {
        Self {
            inactivity_penalty_quotient: 3 * (1 << 24),
            ..Self::mainnet()
        }
    }

    /// Small-parameter configuration for fast-iterating tests.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
            max_seed_lookahead: 1,
            min_validator_withdrawability_delay: 4,
            target_committee_size: 4,
            max_committees_per_slot: 4,
            max_validators_per_committee: 64,
            min_per_epoch_churn_limit: 2,
            max_pool_size: 256,
            max_pending_slashings: 64,
            attestation_window_epochs: 16,
            proposal_retention_slots: 64,
            sync_committee_size: 32,
            epochs_per_sync_committee_period: 8,
            ..Self::mainnet()
        }
    }

    pub fn churn_limit(&self, active_validator_count: u64) -> u64 {
        (active_validator_count / self.churn_limit_quotient).max(self.min_per_epoch_churn_limit)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}
