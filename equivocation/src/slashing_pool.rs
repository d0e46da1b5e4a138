//! Bounded queue of slashing evidence awaiting block inclusion, plus the slashing penalty split.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;
use types::{
    config::Config,
    primitives::{Gwei, Slot, ValidatorIndex},
};

use crate::detector::Evidence;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("offender already has a pending slashing record")]
    DuplicateOffender,
}

#[derive(Clone, Debug)]
pub struct SlashingRecord {
    pub evidence: Evidence,
    pub detected_at_slot: Slot,
}

/// Split of a slashing penalty between the protocol burn and the whistleblower/proposer reward,
/// computed from the offender's effective balance at detection time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Penalty {
    pub initial_penalty: Gwei,
    pub proposer_reward: Gwei,
    pub whistleblower_reward: Gwei,
}

pub fn compute_penalty(effective_balance: Gwei, config: &Config) -> Penalty {
    let initial_penalty = effective_balance / config.min_slashing_penalty_quotient;
    let whistleblower_reward = effective_balance / config.whistleblower_reward_quotient;
    let proposer_reward = whistleblower_reward / config.proposer_reward_quotient;
    Penalty {
        initial_penalty,
        proposer_reward,
        whistleblower_reward: whistleblower_reward - proposer_reward,
    }
}

/// Not internally locked; the coordinator wraps one instance in a `parking_lot::RwLock` per the
/// single-lock-per-component rule.
pub struct SlashingPool {
    config: Config,
    records: VecDeque<SlashingRecord>,
    offenders: HashSet<ValidatorIndex>,
}

impl SlashingPool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            records: VecDeque::new(),
            offenders: HashSet::new(),
        }
    }

    /// Admits one record per offender; evicts the oldest record (and frees its offender slot)
    /// when the pool is at `max_pending_slashings`.
    pub fn insert(&mut self, evidence: Evidence, detected_at_slot: Slot) -> Result<(), Error> {
        let offender = evidence.offender();
        if self.offenders.contains(&offender) {
            return Err(Error::DuplicateOffender);
        }
        if self.records.len() >= self.config.max_pending_slashings {
            if let Some(evicted) = self.records.pop_front() {
                self.offenders.remove(&evicted.evidence.offender());
            }
        }
        self.offenders.insert(offender);
        self.records.push_back(SlashingRecord { evidence, detected_at_slot });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Up to `max_slashings_per_block` records, oldest detection slot first.
    pub fn records_for_block(&self) -> Vec<&SlashingRecord> {
        let mut records: Vec<&SlashingRecord> = self.records.iter().collect();
        records.sort_by_key(|record| record.detected_at_slot);
        records.truncate(self.config.max_slashings_per_block);
        records
    }

    pub fn mark_included(&mut self, offender: ValidatorIndex) {
        self.records.retain(|record| record.evidence.offender() != offender);
        self.offenders.remove(&offender);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Evidence;
    use types::{primitives::H256, types::{AttestationData, Checkpoint}};

    fn vote_evidence(validator: ValidatorIndex) -> Evidence {
        Evidence::DoubleVote {
            validator,
            first: AttestationData {
                slot: 8,
                committee_index: 0,
                beacon_block_root: H256::zero(),
                source: Checkpoint::new(0, H256::zero()),
                target: Checkpoint::new(1, H256::zero()),
            },
            second: AttestationData {
                slot: 8,
                committee_index: 0,
                beacon_block_root: H256::repeat_byte(1),
                source: Checkpoint::new(0, H256::zero()),
                target: Checkpoint::new(1, H256::zero()),
            },
        }
    }

    #[test]
    fn duplicate_offender_is_rejected() {
        let mut pool = SlashingPool::new(Config::minimal());
        pool.insert(vote_evidence(1), 10).unwrap();
        assert_eq!(pool.insert(vote_evidence(1), 11), Err(Error::DuplicateOffender));
    }

    #[test]
    fn records_for_block_are_sorted_by_detection_slot() {
        let mut pool = SlashingPool::new(Config::minimal());
        pool.insert(vote_evidence(2), 20).unwrap();
        pool.insert(vote_evidence(1), 5).unwrap();
        let records = pool.records_for_block();
        assert_eq!(records[0].detected_at_slot, 5);
        assert_eq!(records[1].detected_at_slot, 20);
    }

    #[test]
    fn mark_included_removes_offenders_record() {
        let mut pool = SlashingPool::new(Config::minimal());
        pool.insert(vote_evidence(1), 10).unwrap();
        pool.mark_included(1);
        assert!(pool.is_empty());
        pool.insert(vote_evidence(1), 11).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn overflow_evicts_oldest_record() {
        let mut config = Config::minimal();
        config.max_pending_slashings = 1;
        let mut pool = SlashingPool::new(config);
        pool.insert(vote_evidence(1), 1).unwrap();
        pool.insert(vote_evidence(2), 2).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.records_for_block()[0].evidence.offender(), 2);
    }

    #[test]
    fn penalty_splits_whistleblower_reward_with_proposer() {
        let config = Config::minimal();
        let penalty = compute_penalty(32_000_000_000, &config);
        assert_eq!(
            penalty.whistleblower_reward + penalty.proposer_reward,
            32_000_000_000 / config.whistleblower_reward_quotient
        );
    }
}
