//! Multi-threaded attestation aggregation for a single data key.
//!
//! Input is split into contiguous ranges pulled by workers through an atomic counter
//! (work-stealing); each worker folds its range sequentially, then partial results tree-reduce on
//! the caller thread. Workers never share mutable state beyond their own pre-allocated output
//! slot, so there is nothing here for a lock to protect except the bloom filter.

use std::sync::atomic::{AtomicUsize, Ordering};

use crypto::{Keccak256Hasher, SignatureScheme};
use parking_lot::Mutex;
use types::{
    primitives::{Slot, H256},
    types::{merge_bits, Attestation},
};

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            batch_size: 4_096,
            max_buffer_size: 2_000_000,
            min_workers: 4,
            max_workers: 64,
        }
    }
}

pub struct AggregateOutcome {
    pub aggregate: Option<Attestation>,
    pub duplicate_count: usize,
    pub merge_depth: usize,
}

pub struct ParallelAggregator {
    config: AggregatorConfig,
}

impl ParallelAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Aggregates `attestations`, which must already share one data key — the caller (the pool)
    /// is responsible for grouping by data key before dispatch.
    pub fn aggregate(&self, attestations: &[Attestation], signatures: &dyn SignatureScheme) -> AggregateOutcome {
        if attestations.is_empty() {
            return AggregateOutcome {
                aggregate: None,
                duplicate_count: 0,
                merge_depth: 0,
            };
        }

        let capped_len = attestations.len().min(self.config.max_buffer_size);
        if capped_len < attestations.len() {
            log::warn!(
                "aggregator input {} exceeds max_buffer_size {}, dropping the overflow",
                attestations.len(),
                self.config.max_buffer_size
            );
        }
        let input = &attestations[..capped_len];

        let worker_count = self.config.workers.clamp(self.config.min_workers, self.config.max_workers).min(input.len()).max(1);
        let range_size = input.len().div_ceil(worker_count);
        let ranges: Vec<(usize, usize)> = (0..worker_count)
            .map(|w| (w * range_size, ((w + 1) * range_size).min(input.len())))
            .filter(|(start, end)| start < end)
            .collect();

        let next_range = AtomicUsize::new(0);
        let partials: Vec<Mutex<Option<(Attestation, usize)>>> = ranges.iter().map(|_| Mutex::new(None)).collect();

        rayon::scope(|scope| {
            for _ in 0..ranges.len() {
                scope.spawn(|_| loop {
                    let claimed = next_range.fetch_add(1, Ordering::Relaxed);
                    if claimed >= ranges.len() {
                        break;
                    }
                    let (start, end) = ranges[claimed];
                    *partials[claimed].lock() = Self::fold_range(&input[start..end], signatures);
                });
            }
        });

        let mut results: Vec<(Attestation, usize)> = partials.into_iter().filter_map(Mutex::into_inner).collect();
        let mut merge_depth = 0;
        while results.len() > 1 {
            let mut next = Vec::with_capacity(results.len().div_ceil(2));
            let mut iter = results.into_iter();
            while let Some((first, first_dup)) = iter.next() {
                match iter.next() {
                    Some((second, second_dup)) => {
                        let (merged, pair_dup) = Self::merge_pair(first, second, signatures);
                        next.push((merged, first_dup + second_dup + pair_dup));
                    }
                    None => next.push((first, first_dup)),
                }
            }
            results = next;
            merge_depth += 1;
        }

        match results.into_iter().next() {
            Some((aggregate, duplicate_count)) => AggregateOutcome {
                aggregate: Some(aggregate),
                duplicate_count,
                merge_depth,
            },
            None => AggregateOutcome {
                aggregate: None,
                duplicate_count: 0,
                merge_depth: 0,
            },
        }
    }

    fn fold_range(range: &[Attestation], signatures: &dyn SignatureScheme) -> Option<(Attestation, usize)> {
        let mut iter = range.iter().cloned();
        let mut accumulator = iter.next()?;
        let mut duplicate_count = 0;
        for candidate in iter {
            if accumulator.overlaps(&candidate) {
                duplicate_count += 1;
                continue;
            }
            merge_bits(&mut accumulator.aggregation_bits, &candidate.aggregation_bits);
            accumulator.signature = signatures.aggregate(&[accumulator.signature.clone(), candidate.signature]);
        }
        Some((accumulator, duplicate_count))
    }

    fn merge_pair(mut a: Attestation, b: Attestation, signatures: &dyn SignatureScheme) -> (Attestation, usize) {
        if a.overlaps(&b) {
            (a, 1)
        } else {
            merge_bits(&mut a.aggregation_bits, &b.aggregation_bits);
            a.signature = signatures.aggregate(&[a.signature.clone(), b.signature]);
            (a, 0)
        }
    }
}

const BLOOM_BYTES: usize = 64 * 1024;
const BLOOM_POSITIONS: usize = 4;

/// Optional pre-filter in front of the pool's exact `seen` set: false positives are acceptable
/// (they just fall through to the exact check), false negatives must never occur.
pub struct BloomFilter {
    bits: Vec<u8>,
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomFilter {
    pub fn new() -> Self {
        Self {
            bits: vec![0u8; BLOOM_BYTES],
        }
    }

    fn positions(&self, slot: Slot, block_root: H256, bits: &[u8], signature: &[u8], hasher: &dyn Keccak256Hasher) -> [usize; BLOOM_POSITIONS] {
        let mut preimage = Vec::with_capacity(8 + 32 + bits.len() + signature.len());
        preimage.extend_from_slice(&slot.to_le_bytes());
        preimage.extend_from_slice(block_root.as_bytes());
        preimage.extend_from_slice(bits);
        preimage.extend_from_slice(signature);
        let digest = hasher.keccak256(&preimage);
        let bytes = digest.as_bytes();
        let total_bits = (BLOOM_BYTES * 8) as u64;

        let mut positions = [0usize; BLOOM_POSITIONS];
        for (i, position) in positions.iter_mut().enumerate() {
            let chunk = u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().expect("8-byte chunk"));
            *position = (chunk % total_bits) as usize;
        }
        positions
    }

    pub fn check_duplicate(&self, slot: Slot, block_root: H256, bits: &[u8], signature: &[u8], hasher: &dyn Keccak256Hasher) -> bool {
        self.positions(slot, block_root, bits, signature, hasher)
            .into_iter()
            .all(|position| self.bit_is_set(position))
    }

    pub fn mark_seen(&mut self, slot: Slot, block_root: H256, bits: &[u8], signature: &[u8], hasher: &dyn Keccak256Hasher) {
        for position in self.positions(slot, block_root, bits, signature, hasher) {
            self.set_bit(position);
        }
    }

    pub fn reset(&mut self) {
        self.bits.iter_mut().for_each(|byte| *byte = 0);
    }

    fn bit_is_set(&self, position: usize) -> bool {
        self.bits[position / 8] & (1 << (position % 8)) != 0
    }

    fn set_bit(&mut self, position: usize) {
        self.bits[position / 8] |= 1 << (position % 8);
    }
}
