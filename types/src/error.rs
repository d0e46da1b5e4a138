use thiserror::Error;

/// Shared error kinds used across state/helper operations that index into `BeaconState`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("slot out of range")]
    SlotOutOfRange,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("validator index does not fit in usize")]
    ConversionToUsize,
    #[error("validator has already initiated exit")]
    ValidatorExitAlreadyInitiated,
}
