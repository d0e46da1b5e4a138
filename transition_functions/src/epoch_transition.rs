//! The per-epoch pipeline: justification/finalization, inactivity scoring, rewards and
//! penalties, registry churn, slashings-vector processing, effective-balance hysteresis, and
//! participation rotation, run in that order at every epoch boundary (spec §4.7).
//!
//! Validator-lifecycle mutations (eligibility, ejection, activation, effective-balance
//! hysteresis) delegate to `validator_registry`, which already owns those state transitions;
//! this module owns the pieces that belong to no other component.

use helper_functions::{
    beacon_state_accessors::total_active_balance,
    beacon_state_mutators::{decrease_balance, increase_balance},
    math::isqrt,
    misc::compute_start_slot_at_epoch,
};
use types::{
    beacon_state::{BeaconState, ParticipationFlags},
    config::Config,
    consts::{TIMELY_HEAD_WEIGHT, TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_WEIGHT, WEIGHT_DENOMINATOR},
    primitives::{Epoch, Gwei, ValidatorIndex, GENESIS_EPOCH},
    types::Checkpoint,
};
use validator_registry::ValidatorRegistry;

/// Runs the full per-epoch pipeline. Callers invoke this once, at the last slot of an epoch,
/// before `transition_functions::process_slot::advance_slot` crosses the boundary.
pub fn process_epoch(config: &Config, state: &mut BeaconState, registry: &mut ValidatorRegistry) {
    sync_participation_lengths(state);

    let current_epoch = state.current_epoch(config);
    let previous_epoch = current_epoch.saturating_sub(1);

    process_justification_and_finalization(state, config, current_epoch, previous_epoch);
    process_inactivity_updates(config, state, previous_epoch);
    if current_epoch > GENESIS_EPOCH {
        process_rewards_and_penalties(config, state, previous_epoch);
    }
    process_registry_updates(state, registry, current_epoch);
    process_slashings(config, state, current_epoch);
    registry.update_effective_balances(state);
    process_participation_rotation(state);
}

/// `validators`/`balances` are kept in lockstep by `ValidatorRegistry::register`; the
/// participation and inactivity vectors are grown here rather than at registration so a
/// validator that joins mid-epoch starts with a clean slate rather than stale flags.
fn sync_participation_lengths(state: &mut BeaconState) {
    let n = state.validators.len();
    state.previous_epoch_participation.resize(n, ParticipationFlags::default());
    state.current_epoch_participation.resize(n, ParticipationFlags::default());
    state.inactivity_scores.resize(n, 0);
}

fn matching_target_balance(state: &BeaconState, epoch: Epoch, flags: &[ParticipationFlags]) -> Gwei {
    state
        .validators
        .iter()
        .zip(flags.iter())
        .filter(|(v, f)| !v.slashed && v.is_active_at(epoch) && f.target)
        .map(|(v, _)| v.effective_balance)
        .fold(0u64, Gwei::saturating_add)
}

/// Casper-FFG justification and the four finalization rules. Early-exits before epoch 2: with
/// fewer than two prior epochs there is no `old_previous_justified` checkpoint for the
/// finalization rules to reference, so nothing can finalize yet.
fn process_justification_and_finalization(
    state: &mut BeaconState,
    config: &Config,
    current_epoch: Epoch,
    previous_epoch: Epoch,
) {
    if current_epoch <= GENESIS_EPOCH + 1 {
        return;
    }

    let total_active = total_active_balance(config, state, current_epoch);
    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    for i in (1..4).rev() {
        state.justification_bits[i] = state.justification_bits[i - 1];
    }
    state.justification_bits[0] = false;

    let previous_target_balance =
        matching_target_balance(state, previous_epoch, &state.previous_epoch_participation);
    if previous_target_balance.saturating_mul(3) >= total_active.saturating_mul(2) {
        let root = state.block_root_at_slot(compute_start_slot_at_epoch(config, previous_epoch));
        state.current_justified_checkpoint = Checkpoint::new(previous_epoch, root);
        state.justification_bits[1] = true;
    }

    let current_target_balance =
        matching_target_balance(state, current_epoch, &state.current_epoch_participation);
    if current_target_balance.saturating_mul(3) >= total_active.saturating_mul(2) {
        let root = state.block_root_at_slot(compute_start_slot_at_epoch(config, current_epoch));
        state.current_justified_checkpoint = Checkpoint::new(current_epoch, root);
        state.justification_bits[0] = true;
    }

    let bits = state.justification_bits;
    if bits[1] && bits[2] && bits[3] && old_previous_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    if bits[1] && bits[2] && old_previous_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    if bits[0] && bits[1] && bits[2] && old_current_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
    if bits[0] && bits[1] && old_current_justified.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
}

fn finality_delay(state: &BeaconState, previous_epoch: Epoch) -> Epoch {
    previous_epoch.saturating_sub(state.finalized_checkpoint.epoch)
}

fn process_inactivity_updates(config: &Config, state: &mut BeaconState, previous_epoch: Epoch) {
    let leak = finality_delay(state, previous_epoch) > config.min_epochs_to_inactivity_penalty;
    for index in 0..state.validators.len() {
        if !state.validators[index].is_active_at(previous_epoch) {
            continue;
        }
        let attested_target = state.previous_epoch_participation[index].target;
        let slashed = state.validators[index].slashed;
        if attested_target && !slashed {
            state.inactivity_scores[index] =
                state.inactivity_scores[index].saturating_sub(config.inactivity_score_recovery_rate);
        } else if leak {
            state.inactivity_scores[index] =
                state.inactivity_scores[index].saturating_add(config.inactivity_score_bias);
        }
    }
}

struct Component {
    weight: u64,
    selector: fn(&ParticipationFlags) -> bool,
    penalizes_absence: bool,
}

const COMPONENTS: [Component; 3] = [
    Component { weight: TIMELY_SOURCE_WEIGHT, selector: |f| f.source, penalizes_absence: true },
    Component { weight: TIMELY_TARGET_WEIGHT, selector: |f| f.target, penalizes_absence: true },
    Component { weight: TIMELY_HEAD_WEIGHT, selector: |f| f.head, penalizes_absence: false },
];

fn base_reward(config: &Config, effective_balance: Gwei, total_active_balance: Gwei) -> Gwei {
    let numerator = u128::from(effective_balance) * u128::from(config.base_reward_factor);
    (numerator / u128::from(isqrt(total_active_balance).max(1))) as Gwei
}

/// Source/target/head micro-rewards (weighted 14/26/14 out of 64) plus the leak-mode inactivity
/// penalty, applied against the previous epoch's participation record.
fn process_rewards_and_penalties(config: &Config, state: &mut BeaconState, previous_epoch: Epoch) {
    let total_active = total_active_balance(config, state, previous_epoch);
    let leak = finality_delay(state, previous_epoch) > config.min_epochs_to_inactivity_penalty;

    let eligible: Vec<ValidatorIndex> = state
        .validators
        .iter()
        .filter(|v| {
            v.is_active_at(previous_epoch) || (v.slashed && previous_epoch + 1 < v.withdrawable_epoch)
        })
        .map(|v| v.index)
        .collect();

    let mut rewards = vec![0u64; state.validators.len()];
    let mut penalties = vec![0u64; state.validators.len()];

    for component in &COMPONENTS {
        let attesting_balance: Gwei = state
            .validators
            .iter()
            .zip(state.previous_epoch_participation.iter())
            .filter(|(v, f)| !v.slashed && v.is_active_at(previous_epoch) && (component.selector)(f))
            .map(|(v, _)| v.effective_balance)
            .fold(0u64, Gwei::saturating_add);

        for &index in &eligible {
            let i = index as usize;
            let base = base_reward(config, state.validators[i].effective_balance, total_active);
            let component_reward =
                (u128::from(base) * u128::from(component.weight) / u128::from(WEIGHT_DENOMINATOR)) as Gwei;
            let attested = !state.validators[i].slashed
                && (component.selector)(&state.previous_epoch_participation[i]);
            if attested {
                let amount = if leak {
                    component_reward
                } else {
                    (u128::from(component_reward) * u128::from(attesting_balance) / u128::from(total_active.max(1)))
                        as Gwei
                };
                rewards[i] = rewards[i].saturating_add(amount);
            } else if component.penalizes_absence {
                penalties[i] = penalties[i].saturating_add(component_reward);
            }
        }
    }

    if leak {
        for &index in &eligible {
            let i = index as usize;
            if !state.previous_epoch_participation[i].target {
                let penalty = (u128::from(state.validators[i].effective_balance)
                    * u128::from(state.inactivity_scores[i])
                    / u128::from(config.inactivity_penalty_quotient.max(1))) as Gwei;
                penalties[i] = penalties[i].saturating_add(penalty);
            }
        }
    }

    for index in 0..state.validators.len() {
        increase_balance(state, index as ValidatorIndex, rewards[index])
            .expect("index is within validators/balances, which are kept the same length");
        decrease_balance(state, index as ValidatorIndex, penalties[index])
            .expect("index is within validators/balances, which are kept the same length");
    }
}

fn process_registry_updates(state: &mut BeaconState, registry: &mut ValidatorRegistry, current_epoch: Epoch) {
    registry.process_eligibility(state, current_epoch);
    registry.process_ejections(state, current_epoch);
    let finalized_epoch = state.finalized_checkpoint.epoch;
    let _activated = registry.process_activation_queue(state, current_epoch, finalized_epoch);
}

/// Slashings-vector processing: proportionally penalizes validators whose slashing was recorded
/// half an `epochs_per_slashings_vector` ago, i.e. whose ring-buffer entry is about to be
/// overwritten by a fresh epoch's slashed-balance accumulation.
fn process_slashings(config: &Config, state: &mut BeaconState, current_epoch: Epoch) {
    let total_balance = total_active_balance(config, state, current_epoch);
    let total_slashed: u128 = state.slashings.iter().map(|&v| u128::from(v)).sum();
    let adjusted = u128::from(config.proportional_slashing_multiplier)
        .saturating_mul(total_slashed)
        .min(u128::from(total_balance)) as u64;
    let increment = config.effective_balance_increment;
    let half_vector = config.epochs_per_slashings_vector / 2;

    for index in 0..state.validators.len() {
        let validator = &state.validators[index];
        if validator.slashed && validator.withdrawable_epoch == current_epoch + half_vector {
            let penalty = (validator.effective_balance / increment) * adjusted / total_balance * increment;
            decrease_balance(state, index as ValidatorIndex, penalty)
                .expect("index is within validators/balances, which are kept the same length");
        }
    }
}

fn process_participation_rotation(state: &mut BeaconState) {
    state.previous_epoch_participation = std::mem::take(&mut state.current_epoch_participation);
    state.current_epoch_participation = vec![ParticipationFlags::default(); state.validators.len()];
}

/// Marks `attesting_indices` as having timely-source/target (and, if `matches_head`, timely-head)
/// votes for `epoch`'s participation record. Called by the block processor (owned by the
/// `beacon_node` coordinator) as attestations selected from `attestation_pool` are included;
/// `epoch_transition` itself never reads raw attestations, only these flags.
pub fn record_attestation_participation(
    state: &mut BeaconState,
    current_epoch: Epoch,
    target_epoch: Epoch,
    attesting_indices: &[ValidatorIndex],
    matches_head: bool,
) {
    let flags = if target_epoch == current_epoch {
        &mut state.current_epoch_participation
    } else {
        &mut state.previous_epoch_participation
    };
    for &index in attesting_indices {
        if let Some(flag) = flags.get_mut(index as usize) {
            flag.source = true;
            flag.target = true;
            if matches_head {
                flag.head = true;
            }
        }
    }
}
