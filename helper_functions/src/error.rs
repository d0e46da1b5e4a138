use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("shuffle index out of range")]
    IndexOutOfRange,
    #[error("validator index out of range")]
    ValidatorIndexOutOfRange,
    #[error("validator has already initiated exit")]
    ValidatorExitAlreadyInitiated,
}
