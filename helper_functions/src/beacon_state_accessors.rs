use types::{config::Config, primitives::{Epoch, Gwei, ValidatorIndex}, BeaconState};

pub fn active_validator_indices(state: &BeaconState, epoch: Epoch) -> Vec<ValidatorIndex> {
    state
        .validators
        .iter()
        .filter(|v| v.is_active_at(epoch))
        .map(|v| v.index)
        .collect()
}

/// Sum of effective balances of active validators, floored at `effective_balance_increment` to
/// avoid downstream divide-by-zero in reward computation.
pub fn total_active_balance(config: &Config, state: &BeaconState, epoch: Epoch) -> Gwei {
    let total: Gwei = state
        .validators
        .iter()
        .filter(|v| v.is_active_at(epoch))
        .map(|v| v.effective_balance)
        .sum();
    total.max(config.effective_balance_increment)
}

pub fn validator_churn_limit(config: &Config, state: &BeaconState, epoch: Epoch) -> u64 {
    config.churn_limit(active_validator_indices(state, epoch).len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::types::Validator;

    fn active_validator(index: ValidatorIndex, effective_balance: Gwei) -> Validator {
        let mut v = Validator::new(index, Default::default(), Default::default(), 0, effective_balance);
        v.activation_epoch = 0;
        v.exit_epoch = u64::MAX;
        v
    }

    #[test]
    fn total_active_balance_floors_at_increment() {
        let config = Config::minimal();
        let state = BeaconState::new(0);
        assert_eq!(total_active_balance(&config, &state, 0), config.effective_balance_increment);
    }

    #[test]
    fn total_active_balance_sums_active_only() {
        let config = Config::minimal();
        let mut state = BeaconState::new(0);
        state.validators.push(active_validator(0, 32_000_000_000));
        state.validators.push(active_validator(1, 32_000_000_000));
        let mut pending = active_validator(2, 32_000_000_000);
        pending.activation_epoch = u64::MAX;
        state.validators.push(pending);
        assert_eq!(total_active_balance(&config, &state, 0), 64_000_000_000);
    }
}
