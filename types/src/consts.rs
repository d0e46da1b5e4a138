pub use crate::primitives::{Epoch, Gwei, Slot, FAR_FUTURE_EPOCH, GENESIS_EPOCH, GENESIS_SLOT};

pub const JUSTIFICATION_BITS_LENGTH: usize = 4;
pub const MIN_INCLUSION_DELAY: Slot = 1;
pub const MIN_ATTESTATION_INCLUSION_DELAY: Slot = MIN_INCLUSION_DELAY;

/// {source, target, head} weights out of 64, per epoch-transition reward accounting.
pub const TIMELY_SOURCE_WEIGHT: u64 = 14;
pub const TIMELY_TARGET_WEIGHT: u64 = 26;
pub const TIMELY_HEAD_WEIGHT: u64 = 14;
pub const WEIGHT_DENOMINATOR: u64 = 64;

pub const PROPOSER_REWARD_QUOTIENT: u64 = 8;
pub const WHISTLEBLOWER_REWARD_QUOTIENT: u64 = 512;
pub const MIN_SLASHING_PENALTY_QUOTIENT: u64 = 128;
pub const PROPOSER_SLASHING_FEE_NUMERATOR: u64 = 1;
