//! Effective-balance-weighted sampling used to draw the rotating sync committee.

use crypto::{Keccak256Hasher, Sha256Hasher};
use helper_functions::misc::shuffle_indices;
use types::{
    config::Config,
    primitives::{Gwei, PublicKeyBytes, ValidatorIndex, H256},
};

/// Draws `config.sync_committee_size` members from `active` with replacement: a shuffled
/// permutation of the active set is walked round-robin, and each candidate is accepted with
/// probability proportional to its effective balance. Bounded at `100 * sync_committee_size`
/// draws; any still-unfilled seats fall back to the first shuffled member.
pub fn select_committee(
    config: &Config,
    active: &[ValidatorIndex],
    effective_balance_of: impl Fn(ValidatorIndex) -> Gwei,
    seed: H256,
    keccak: &dyn Keccak256Hasher,
    sha256: &dyn Sha256Hasher,
) -> Vec<ValidatorIndex> {
    if active.is_empty() {
        return Vec::new();
    }

    let mut shuffled = active.to_vec();
    shuffle_indices(&mut shuffled, seed, keccak);

    let target = config.sync_committee_size;
    let bound = 100 * target;
    let mut members = Vec::with_capacity(target as usize);
    let mut i: u64 = 0;
    while (members.len() as u64) < target && i < bound {
        let candidate = shuffled[(i % shuffled.len() as u64) as usize];

        let mut preimage = Vec::with_capacity(40);
        preimage.extend_from_slice(seed.as_bytes());
        preimage.extend_from_slice(&i.to_le_bytes());
        let random_byte = sha256.sha256(&preimage).as_bytes()[0];

        let effective_balance = effective_balance_of(candidate);
        if effective_balance.saturating_mul(255) >= config.max_effective_balance.saturating_mul(u64::from(random_byte)) {
            members.push(candidate);
        }
        i += 1;
    }
    while (members.len() as u64) < target {
        members.push(shuffled[0]);
    }
    members
}

/// `hash(concat(member_pubkeys))`, the committee's single aggregate public key.
pub fn aggregate_pubkey(members: &[PublicKeyBytes], sha256: &dyn Sha256Hasher) -> H256 {
    let mut preimage = Vec::with_capacity(members.len() * 48);
    for pubkey in members {
        preimage.extend_from_slice(&pubkey.0);
    }
    sha256.sha256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::{Keccak256, Sha256};

    #[test]
    fn selection_fills_the_configured_committee_size() {
        let config = Config::minimal();
        let active: Vec<ValidatorIndex> = (0..64).collect();
        let members = select_committee(
            &config,
            &active,
            |_| config.max_effective_balance,
            H256::repeat_byte(5),
            &Keccak256,
            &Sha256,
        );
        assert_eq!(members.len(), config.sync_committee_size as usize);
        assert!(members.iter().all(|m| active.contains(m)));
    }

    #[test]
    fn selection_is_deterministic_for_the_same_seed() {
        let config = Config::minimal();
        let active: Vec<ValidatorIndex> = (0..64).collect();
        let balances = |_: ValidatorIndex| config.max_effective_balance;
        let a = select_committee(&config, &active, balances, H256::repeat_byte(5), &Keccak256, &Sha256);
        let b = select_committee(&config, &active, balances, H256::repeat_byte(5), &Keccak256, &Sha256);
        assert_eq!(a, b);
    }

    #[test]
    fn aggregate_pubkey_changes_with_membership() {
        let a = aggregate_pubkey(&[PublicKeyBytes([1; 48])], &Sha256);
        let b = aggregate_pubkey(&[PublicKeyBytes([2; 48])], &Sha256);
        assert_ne!(a, b);
    }
}
