//! Deduplicating, aggregating attestation pool.
//!
//! Not internally locked; the coordinator wraps one instance in a `parking_lot::RwLock` and takes
//! the write half for `add`/`mark_included`/`set_current_slot`, the read half for `size` and
//! `get_for_block`, per the single-RW-lock-per-component rule.

use std::collections::{HashMap, HashSet};

use crypto::{Keccak256Hasher, SignatureScheme};
use error_utils::{Classified, ErrorClass};
use helper_functions::misc::compute_epoch_at_slot;
use thiserror::Error;
use types::{
    config::Config,
    primitives::{CommitteeIndex, Slot},
    types::{Attestation, AttestationDataKey, Checkpoint},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("aggregation bits are nil or empty")]
    EmptyBits,
    #[error("attestation slot is in the future")]
    FutureSlot,
    #[error("attestation slot is too old to include")]
    TooOld,
    #[error("attestation source checkpoint does not match justified checkpoint")]
    SourceEpoch,
    #[error("attestation target epoch does not match the slot's epoch")]
    TargetEpoch,
    #[error("pool is at capacity")]
    Full,
}

impl Classified for Error {
    fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyBits | Self::SourceEpoch | Self::TargetEpoch => ErrorClass::Validation,
            Self::FutureSlot | Self::TooOld | Self::Full => ErrorClass::Admission,
        }
    }
}

struct PoolEntry {
    attestation: Attestation,
    included: bool,
}

pub struct AttestationPool {
    config: Config,
    current_slot: Slot,
    justified: Checkpoint,
    entries: Vec<PoolEntry>,
    by_data_key: HashMap<AttestationDataKey, Vec<usize>>,
    by_slot_committee: HashMap<(Slot, CommitteeIndex), Vec<usize>>,
    seen: HashSet<[u8; 32]>,
}

impl AttestationPool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            current_slot: 0,
            justified: Checkpoint::default(),
            entries: Vec::new(),
            by_data_key: HashMap::new(),
            by_slot_committee: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.included).count()
    }

    pub fn set_justified(&mut self, checkpoint: Checkpoint) {
        self.justified = checkpoint;
    }

    /// Advances the pool's notion of "now" and prunes entries that can no longer be included.
    pub fn set_current_slot(&mut self, slot: Slot) {
        self.current_slot = slot;
        let floor = slot.saturating_sub(self.config.max_inclusion_delay);
        self.prune_before(floor);
        if self.seen.len() > 2 * self.config.max_pool_size {
            self.seen.clear();
        }
    }

    fn prune_before(&mut self, floor: Slot) {
        let keep: Vec<bool> = self
            .entries
            .iter()
            .map(|entry| entry.attestation.data.slot >= floor && !entry.included)
            .collect();
        self.rebuild_after_prune(&keep);
    }

    fn rebuild_after_prune(&mut self, keep: &[bool]) {
        let mut new_entries = Vec::new();
        let mut remap = vec![None; self.entries.len()];
        for (old_index, entry) in self.entries.drain(..).enumerate() {
            if keep[old_index] {
                remap[old_index] = Some(new_entries.len());
                new_entries.push(entry);
            }
        }
        self.entries = new_entries;

        let remap_ids = |ids: &Vec<usize>| -> Vec<usize> {
            ids.iter().filter_map(|&id| remap[id]).collect()
        };
        self.by_data_key = self
            .by_data_key
            .iter()
            .map(|(key, ids)| (*key, remap_ids(ids)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        self.by_slot_committee = self
            .by_slot_committee
            .iter()
            .map(|(key, ids)| (*key, remap_ids(ids)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
    }

    fn fingerprint(&self, attestation: &Attestation, hasher: &dyn Keccak256Hasher) -> [u8; 32] {
        let key = attestation.data.data_key();
        let mut preimage = Vec::new();
        preimage.extend_from_slice(key.beacon_block_root.as_bytes());
        preimage.extend_from_slice(&key.slot.to_le_bytes());
        preimage.extend_from_slice(&key.committee_index.to_le_bytes());
        preimage.extend_from_slice(key.source.root.as_bytes());
        preimage.extend_from_slice(key.target.root.as_bytes());
        preimage.extend_from_slice(attestation.aggregation_bits.clone().into_vec().as_slice());
        *hasher.keccak256(&preimage).as_fixed_bytes()
    }

    pub fn add(
        &mut self,
        attestation: Attestation,
        hasher: &dyn Keccak256Hasher,
        signatures: &dyn SignatureScheme,
    ) -> Result<(), Error> {
        if attestation.aggregation_bits.is_empty() || attestation.bit_count() == 0 {
            return Err(Error::EmptyBits);
        }
        if attestation.data.slot > self.current_slot {
            return Err(Error::FutureSlot);
        }
        if attestation.data.slot + self.config.max_inclusion_delay < self.current_slot {
            return Err(Error::TooOld);
        }
        if attestation.data.source.epoch != self.justified.epoch {
            return Err(Error::SourceEpoch);
        }
        if attestation.data.target.epoch != compute_epoch_at_slot(&self.config, attestation.data.slot) {
            return Err(Error::TargetEpoch);
        }

        let fingerprint = self.fingerprint(&attestation, hasher);
        if self.seen.contains(&fingerprint) {
            return Ok(());
        }

        let data_key = attestation.data.data_key();
        if let Some(candidates) = self.by_data_key.get(&data_key).cloned() {
            if candidates.iter().any(|&index| self.entries[index].included) {
                // Data key already made it into a block; a late-arriving duplicate is dropped
                // rather than re-admitted as a fresh pending entry.
                self.seen.insert(fingerprint);
                return Ok(());
            }
            for &index in &candidates {
                let entry = &mut self.entries[index];
                if !entry.attestation.overlaps(&attestation) {
                    types::types::merge_bits(&mut entry.attestation.aggregation_bits, &attestation.aggregation_bits);
                    entry.attestation.signature =
                        signatures.aggregate(&[entry.attestation.signature.clone(), attestation.signature]);
                    self.seen.insert(fingerprint);
                    return Ok(());
                }
            }
        }

        if self.size() >= self.config.max_pool_size {
            return Err(Error::Full);
        }

        let slot = attestation.data.slot;
        let committee_index = attestation.data.committee_index;
        let index = self.entries.len();
        self.entries.push(PoolEntry {
            attestation,
            included: false,
        });
        self.by_data_key.entry(data_key).or_default().push(index);
        self.by_slot_committee
            .entry((slot, committee_index))
            .or_default()
            .push(index);
        self.seen.insert(fingerprint);
        Ok(())
    }

    /// Inclusion-delay-gated, score-sorted attestations ready for a block at `slot`.
    pub fn get_for_block(&self, slot: Slot, max: usize) -> Vec<Attestation> {
        const DECAY: i64 = 1;
        let min_delay = 1i64;
        let max_delay = self.config.max_inclusion_delay as i64;

        let mut scored: Vec<(i64, i64, &Attestation)> = self
            .entries
            .iter()
            .filter(|entry| !entry.included)
            .filter_map(|entry| {
                let delay = slot as i64 - entry.attestation.data.slot as i64;
                if delay < min_delay || delay > max_delay {
                    return None;
                }
                let score = (entry.attestation.bit_count() as i64 * 100 - delay * DECAY).max(0);
                Some((score, delay, &entry.attestation))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let limit = max.min(self.config.max_attestations_per_block as usize);
        scored.into_iter().take(limit).map(|(_, _, att)| att.clone()).collect()
    }

    pub fn get_best_for_committee(&self, slot: Slot, committee_index: CommitteeIndex) -> Option<Attestation> {
        self.by_slot_committee
            .get(&(slot, committee_index))?
            .iter()
            .filter_map(|&index| {
                let entry = &self.entries[index];
                (!entry.included).then_some(&entry.attestation)
            })
            .max_by_key(|att| att.bit_count())
            .cloned()
    }

    /// Marks every pool entry sharing `attestation`'s data key as included, following the
    /// including block's reference into a slot (ring-buffer rotations key off it elsewhere).
    pub fn mark_included(&mut self, attestation: &Attestation, _slot: Slot) {
        let data_key = attestation.data.data_key();
        if let Some(indices) = self.by_data_key.get(&data_key) {
            for &index in indices {
                self.entries[index].included = true;
            }
        }
    }
}
