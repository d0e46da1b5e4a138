use crate::error::Error;
use types::{
    config::Config,
    primitives::{Epoch, Gwei, ValidatorIndex},
    BeaconState,
};

pub fn increase_balance(state: &mut BeaconState, index: ValidatorIndex, delta: Gwei) -> Result<(), Error> {
    let validator = state
        .validators
        .get_mut(index as usize)
        .ok_or(Error::ValidatorIndexOutOfRange)?;
    validator.balance = validator.balance.saturating_add(delta);
    state.balances[index as usize] = validator.balance;
    Ok(())
}

pub fn decrease_balance(state: &mut BeaconState, index: ValidatorIndex, delta: Gwei) -> Result<(), Error> {
    let validator = state
        .validators
        .get_mut(index as usize)
        .ok_or(Error::ValidatorIndexOutOfRange)?;
    validator.balance = validator.balance.saturating_sub(delta);
    state.balances[index as usize] = validator.balance;
    Ok(())
}

/// Schedules a validator for exit at the first epoch whose exit-queue occupancy is under churn.
pub fn initiate_validator_exit(
    config: &Config,
    state: &mut BeaconState,
    index: ValidatorIndex,
    current_epoch: Epoch,
) -> Result<(), Error> {
    let already_exiting = state
        .validators
        .get(index as usize)
        .ok_or(Error::ValidatorIndexOutOfRange)?
        .exit_epoch
        != u64::MAX;
    if already_exiting {
        return Err(Error::ValidatorExitAlreadyInitiated);
    }

    let activation_exit_epoch = crate::misc::compute_activation_exit_epoch(config, current_epoch);
    let mut exit_queue_epoch = state
        .validators
        .iter()
        .map(|v| v.exit_epoch)
        .filter(|&e| e != u64::MAX)
        .max()
        .unwrap_or(activation_exit_epoch)
        .max(activation_exit_epoch);

    let exit_queue_churn = state
        .validators
        .iter()
        .filter(|v| v.exit_epoch == exit_queue_epoch)
        .count() as u64;
    if exit_queue_churn >= config.churn_limit(state.validators.len() as u64) {
        exit_queue_epoch += 1;
    }

    let validator = &mut state.validators[index as usize];
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + config.min_validator_withdrawability_delay;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::types::Validator;

    fn validator(index: ValidatorIndex) -> Validator {
        let mut v = Validator::new(index, Default::default(), Default::default(), 32_000_000_000, 32_000_000_000);
        v.activation_epoch = 0;
        v.exit_epoch = u64::MAX;
        v
    }

    #[test]
    fn decrease_balance_saturates_at_zero() {
        let mut state = BeaconState::new(0);
        state.validators.push(validator(0));
        state.balances.push(32_000_000_000);
        decrease_balance(&mut state, 0, 40_000_000_000).unwrap();
        assert_eq!(state.validators[0].balance, 0);
    }

    #[test]
    fn initiate_exit_twice_errors() {
        let config = Config::minimal();
        let mut state = BeaconState::new(0);
        state.validators.push(validator(0));
        state.balances.push(32_000_000_000);
        initiate_validator_exit(&config, &mut state, 0, 5).unwrap();
        assert_eq!(
            initiate_validator_exit(&config, &mut state, 0, 5),
            Err(Error::ValidatorExitAlreadyInitiated)
        );
    }
}
