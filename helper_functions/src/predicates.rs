use types::types::{AttestationData, Validator};

pub fn is_slashable_validator(validator: &Validator, epoch: u64) -> bool {
    validator.is_slashable_at(epoch)
}

pub fn is_active_validator(validator: &Validator, epoch: u64) -> bool {
    validator.is_active_at(epoch)
}

/// Double-vote or surround-vote between two attestation data values from the same validator.
/// This is the textbook predicate; `equivocation::EquivocationDetector` keeps the actual
/// per-validator history and evidence needed to act on it.
pub fn is_slashable_attestation_data(a: &AttestationData, b: &AttestationData) -> bool {
    let double_vote = a != b && a.target.epoch == b.target.epoch;
    let surrounds = (a.source.epoch < b.source.epoch && b.target.epoch < a.target.epoch)
        || (b.source.epoch < a.source.epoch && a.target.epoch < b.target.epoch);
    double_vote || surrounds
}
