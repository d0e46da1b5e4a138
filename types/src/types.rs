use bitvec::prelude::{BitVec, Lsb0};
use serde::{Deserialize, Serialize};

use crate::primitives::{
    CommitteeIndex, Epoch, Gwei, PublicKeyBytes, SignatureBytes, Slot, ValidatorIndex, H256,
    FAR_FUTURE_EPOCH,
};

/// `(epoch, block_root_at_epoch_boundary)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: H256,
}

impl Checkpoint {
    pub const fn new(epoch: Epoch, root: H256) -> Self {
        Self { epoch, root }
    }

    /// A zeroed checkpoint is indistinguishable from "genesis" and, per the viability filter,
    /// must be treated as "none" rather than a real finalized epoch 0.
    pub fn is_none(&self) -> bool {
        self.epoch == 0 && self.root == H256::zero()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Validator {
    pub index: ValidatorIndex,
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub balance: Gwei,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    pub fn new(
        index: ValidatorIndex,
        pubkey: PublicKeyBytes,
        withdrawal_credentials: H256,
        balance: Gwei,
        effective_balance: Gwei,
    ) -> Self {
        Self {
            index,
            pubkey,
            withdrawal_credentials,
            balance,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.activation_epoch == FAR_FUTURE_EPOCH
    }

    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn is_slashable_at(&self, epoch: Epoch) -> bool {
        !self.slashed && self.activation_epoch <= epoch && epoch < self.withdrawable_epoch
    }

    pub fn is_eligible_for_activation_queue(&self, min_activation_balance: Gwei) -> bool {
        self.activation_eligibility_epoch == FAR_FUTURE_EPOCH
            && self.activation_epoch == FAR_FUTURE_EPOCH
            && self.effective_balance >= min_activation_balance
    }
}

pub type AggregationBits = BitVec<u8, Lsb0>;

#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct AttestationData {
    pub slot: Slot,
    pub committee_index: CommitteeIndex,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl AttestationData {
    /// Two attestations share a data key, and thus may be aggregated, iff every field here
    /// matches. `committee_index` is part of the key because committees are disjoint per slot.
    pub fn data_key(&self) -> AttestationDataKey {
        AttestationDataKey {
            slot: self.slot,
            committee_index: self.committee_index,
            beacon_block_root: self.beacon_block_root,
            source: self.source,
            target: self.target,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AttestationDataKey {
    pub slot: Slot,
    pub committee_index: CommitteeIndex,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Attestation {
    pub data: AttestationData,
    #[serde(with = "aggregation_bits_serde")]
    pub aggregation_bits: AggregationBits,
    pub signature: SignatureBytes,
}

impl Attestation {
    pub fn bit_count(&self) -> usize {
        self.aggregation_bits.count_ones()
    }

    /// Two attestations may be merged iff their bitfields share no set bit.
    pub fn overlaps(&self, other: &Attestation) -> bool {
        bits_overlap(&self.aggregation_bits, &other.aggregation_bits)
    }
}

pub fn bits_overlap(a: &AggregationBits, b: &AggregationBits) -> bool {
    a.iter().by_vals().zip(b.iter().by_vals()).any(|(x, y)| x && y)
}

/// OR two same-length aggregation bitfields in place, extending the shorter with zeros.
pub fn merge_bits(a: &mut AggregationBits, b: &AggregationBits) {
    if b.len() > a.len() {
        a.resize(b.len(), false);
    }
    for (i, bit) in b.iter().by_vals().enumerate() {
        if bit {
            a.set(i, true);
        }
    }
}

mod aggregation_bits_serde {
    use super::AggregationBits;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bits: &AggregationBits, s: S) -> Result<S::Ok, S::Error> {
        bits.clone().into_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AggregationBits, D::Error> {
        let bytes = Vec::<u8>::deserialize(d)?;
        Ok(AggregationBits::from_vec(bytes))
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: SignatureBytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_zero_is_none() {
        assert!(Checkpoint::new(0, H256::zero()).is_none());
        assert!(!Checkpoint::new(0, H256::repeat_byte(1)).is_none());
        assert!(!Checkpoint::new(1, H256::zero()).is_none());
    }

    #[test]
    fn merge_bits_unions_and_extends() {
        let mut a = AggregationBits::from_vec(vec![0b0000_0001]);
        let b = AggregationBits::from_vec(vec![0b0000_0010]);
        merge_bits(&mut a, &b);
        assert_eq!(a.count_ones(), 2);
    }

    #[test]
    fn overlap_detects_shared_bit() {
        let a = AggregationBits::from_vec(vec![0b0000_0011]);
        let b = AggregationBits::from_vec(vec![0b0000_0010]);
        assert!(bits_overlap(&a, &b));
        let c = AggregationBits::from_vec(vec![0b0000_0100]);
        assert!(!bits_overlap(&a, &c));
    }

    #[test]
    fn validator_lifecycle_predicates() {
        let v = Validator::new(0, PublicKeyBytes::default(), H256::zero(), 0, 32_000_000_000);
        assert!(v.is_pending());
        let active = Validator {
            activation_epoch: 1,
            exit_epoch: 10,
            ..v.clone()
        };
        assert!(active.is_active_at(5));
        assert!(!active.is_active_at(10));
        assert!(active.is_slashable_at(5));
    }
}
