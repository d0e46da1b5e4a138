use crypto::Keccak256Hasher;
use types::{
    config::Config,
    primitives::{Epoch, Slot, ValidatorIndex, H256},
};

pub fn compute_epoch_at_slot(config: &Config, slot: Slot) -> Epoch {
    slot / config.slots_per_epoch
}

pub fn compute_start_slot_at_epoch(config: &Config, epoch: Epoch) -> Slot {
    epoch * config.slots_per_epoch
}

pub fn compute_activation_exit_epoch(config: &Config, epoch: Epoch) -> Epoch {
    epoch + 1 + config.max_seed_lookahead
}

/// In-place Fisher-Yates shuffle. Step `i` draws its swap partner from
/// `Keccak256(seed ∥ i)`, so the permutation is a pure function of `(seed, len)`.
pub fn shuffle_indices(
    indices: &mut [ValidatorIndex],
    seed: H256,
    hasher: &dyn Keccak256Hasher,
) {
    let n = indices.len();
    if n < 2 {
        return;
    }
    for i in (1..n).rev() {
        let mut preimage = Vec::with_capacity(40);
        preimage.extend_from_slice(seed.as_bytes());
        preimage.extend_from_slice(&(i as u64).to_le_bytes());
        let digest = hasher.keccak256(&preimage);
        let random = u64::from_le_bytes(digest.as_bytes()[0..8].try_into().unwrap());
        let j = (random % (i as u64 + 1)) as usize;
        indices.swap(i, j);
    }
}

/// Split `n` items into `count` near-equal groups, remainder distributed to the earlier groups.
pub fn partition_sizes(n: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let base = n / count;
    let remainder = n % count;
    (0..count)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Partition shuffled `indices` into `count` committees using `partition_sizes`.
pub fn partition_into_committees(
    indices: &[ValidatorIndex],
    count: usize,
) -> Vec<Vec<ValidatorIndex>> {
    let sizes = partition_sizes(indices.len(), count);
    let mut committees = Vec::with_capacity(count);
    let mut offset = 0;
    for size in sizes {
        committees.push(indices[offset..offset + size].to_vec());
        offset += size;
    }
    committees
}
