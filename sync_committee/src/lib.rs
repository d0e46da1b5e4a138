//! Rotating sync committee membership and per-`(slot, subcommittee)` contribution aggregation.
//!
//! Not internally locked; the coordinator wraps one instance in a `parking_lot::RwLock` per the
//! single-lock-per-component rule.

pub mod selection;

pub use selection::{aggregate_pubkey, select_committee};

use std::collections::{HashMap, HashSet};

use crypto::SignatureScheme;
use thiserror::Error;
use types::{
    primitives::{Epoch, SignatureBytes, Slot, SubcommitteeIndex, ValidatorIndex},
    types::{bits_overlap, merge_bits, AggregationBits},
    Config,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("validator is not a member of the current sync committee")]
    NotMember,
    #[error("validator already submitted a contribution for this slot")]
    DuplicateMessage,
    #[error("contribution bits overlap an already-aggregated contribution")]
    Overlapping,
}

struct Contribution {
    bits: AggregationBits,
    signature: SignatureBytes,
}

pub struct SyncCommitteeManager {
    config: Config,
    members: Vec<ValidatorIndex>,
    member_set: HashSet<ValidatorIndex>,
    contributions: HashMap<(Slot, SubcommitteeIndex), Contribution>,
    seen_messages: HashSet<(Slot, ValidatorIndex)>,
}

impl SyncCommitteeManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            members: Vec::new(),
            member_set: HashSet::new(),
            contributions: HashMap::new(),
            seen_messages: HashSet::new(),
        }
    }

    pub fn should_rotate(&self, epoch: Epoch) -> bool {
        epoch > 0 && epoch % self.config.epochs_per_sync_committee_period == 0
    }

    pub fn members(&self) -> &[ValidatorIndex] {
        &self.members
    }

    pub fn is_member(&self, validator: ValidatorIndex) -> bool {
        self.member_set.contains(&validator)
    }

    /// Installs a freshly drawn committee, discarding any in-flight contributions from the prior
    /// period — they were keyed to a membership that no longer applies.
    pub fn rotate(&mut self, members: Vec<ValidatorIndex>) {
        self.member_set = members.iter().copied().collect();
        self.members = members;
        self.contributions.clear();
        self.seen_messages.clear();
    }

    /// Folds one member's contribution into the `(slot, subcommittee_index)` aggregate. Rejects
    /// non-members, a second message from the same validator at the same slot, and bitfields
    /// that overlap what has already been aggregated.
    pub fn add_contribution(
        &mut self,
        slot: Slot,
        subcommittee_index: SubcommitteeIndex,
        validator: ValidatorIndex,
        bits: AggregationBits,
        signature: SignatureBytes,
        signatures: &dyn SignatureScheme,
    ) -> Result<(), Error> {
        if !self.is_member(validator) {
            return Err(Error::NotMember);
        }
        if !self.seen_messages.insert((slot, validator)) {
            return Err(Error::DuplicateMessage);
        }

        let entry = self
            .contributions
            .entry((slot, subcommittee_index))
            .or_insert_with(|| Contribution {
                bits: AggregationBits::new(),
                signature: SignatureBytes::empty(),
            });
        if bits_overlap(&entry.bits, &bits) {
            return Err(Error::Overlapping);
        }
        merge_bits(&mut entry.bits, &bits);
        entry.signature = signatures.aggregate(&[entry.signature.clone(), signature]);
        Ok(())
    }

    pub fn get_contribution(
        &self,
        slot: Slot,
        subcommittee_index: SubcommitteeIndex,
    ) -> Option<(AggregationBits, SignatureBytes)> {
        self.contributions
            .get(&(slot, subcommittee_index))
            .map(|contribution| (contribution.bits.clone(), contribution.signature.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::NullSignatureScheme;
    use types::types::AggregationBits as Bits;

    fn manager_with_member(validator: ValidatorIndex) -> SyncCommitteeManager {
        let mut manager = SyncCommitteeManager::new(Config::minimal());
        manager.rotate(vec![validator, validator + 1]);
        manager
    }

    #[test]
    fn should_rotate_fires_on_period_boundaries_only() {
        let manager = SyncCommitteeManager::new(Config::minimal());
        assert!(!manager.should_rotate(0));
        assert!(manager.should_rotate(manager.config.epochs_per_sync_committee_period));
        assert!(!manager.should_rotate(manager.config.epochs_per_sync_committee_period - 1));
    }

    #[test]
    fn non_member_contribution_is_rejected() {
        let mut manager = manager_with_member(1);
        let result = manager.add_contribution(
            10,
            0,
            99,
            Bits::from_vec(vec![0b0000_0001]),
            SignatureBytes(vec![1]),
            &NullSignatureScheme,
        );
        assert_eq!(result, Err(Error::NotMember));
    }

    #[test]
    fn duplicate_message_from_same_validator_rejected() {
        let mut manager = manager_with_member(1);
        manager
            .add_contribution(10, 0, 1, Bits::from_vec(vec![0b0000_0001]), SignatureBytes(vec![1]), &NullSignatureScheme)
            .unwrap();
        let result = manager.add_contribution(
            10,
            0,
            1,
            Bits::from_vec(vec![0b0000_0010]),
            SignatureBytes(vec![2]),
            &NullSignatureScheme,
        );
        assert_eq!(result, Err(Error::DuplicateMessage));
    }

    #[test]
    fn overlapping_bits_are_rejected() {
        let mut manager = manager_with_member(1);
        manager
            .add_contribution(10, 0, 1, Bits::from_vec(vec![0b0000_0011]), SignatureBytes(vec![1]), &NullSignatureScheme)
            .unwrap();
        let result = manager.add_contribution(
            10,
            0,
            2,
            Bits::from_vec(vec![0b0000_0010]),
            SignatureBytes(vec![2]),
            &NullSignatureScheme,
        );
        assert_eq!(result, Err(Error::Overlapping));
    }

    #[test]
    fn non_overlapping_contributions_merge() {
        let mut manager = manager_with_member(1);
        manager
            .add_contribution(10, 0, 1, Bits::from_vec(vec![0b0000_0001]), SignatureBytes(vec![1]), &NullSignatureScheme)
            .unwrap();
        manager
            .add_contribution(10, 0, 2, Bits::from_vec(vec![0b0000_0010]), SignatureBytes(vec![2]), &NullSignatureScheme)
            .unwrap();
        let (bits, _) = manager.get_contribution(10, 0).unwrap();
        assert_eq!(bits.count_ones(), 2);
    }

    #[test]
    fn rotation_clears_stale_contributions() {
        let mut manager = manager_with_member(1);
        manager
            .add_contribution(10, 0, 1, Bits::from_vec(vec![0b0000_0001]), SignatureBytes(vec![1]), &NullSignatureScheme)
            .unwrap();
        manager.rotate(vec![5, 6]);
        assert!(manager.get_contribution(10, 0).is_none());
        assert!(!manager.is_member(1));
    }
}
