//! Deterministic cryptography surface.
//!
//! Hashing, signature aggregation, and signature verification are exposed as trait objects named
//! after their kind (`Keccak256`, `Sha256`, `BlsVerify`, `BlsAggregate`, `DilithiumVerify`) rather
//! than called directly. This isolates test doubles and lets a real signature backend be swapped
//! in without touching state-machine logic in `beacon_fork_choice`, `transition_functions`, etc.
//!
//! `Keccak256`/`Sha256` are real: this crate owns their implementation. BLS/Dilithium arithmetic
//! is out of scope (see the top-level Non-goals) and so `SignatureScheme` is opaque — callers
//! inject a real verifier/aggregator; `NullSignatureScheme` is the in-tree test double.

use sha2::{Digest, Sha256 as Sha256Impl};
use sha3::Keccak256 as Keccak256Impl;
use types::primitives::{PublicKeyBytes, SignatureBytes, H256};

/// Internal structural hashing (data-key fingerprints, bloom-filter input, arena roots).
pub trait Keccak256Hasher: Send + Sync {
    fn keccak256(&self, data: &[u8]) -> H256;
}

/// State-root and sync-committee-seed hashing.
pub trait Sha256Hasher: Send + Sync {
    fn sha256(&self, data: &[u8]) -> H256;
}

/// Opaque signature verification/aggregation, named after the scheme it fronts.
pub trait SignatureScheme: Send + Sync {
    fn verify(&self, pubkey: &PublicKeyBytes, message: &H256, signature: &SignatureBytes) -> bool;
    fn aggregate(&self, signatures: &[SignatureBytes]) -> SignatureBytes;
}

#[derive(Clone, Copy, Default)]
pub struct Keccak256;

impl Keccak256Hasher for Keccak256 {
    fn keccak256(&self, data: &[u8]) -> H256 {
        let mut hasher = Keccak256Impl::new();
        hasher.update(data);
        H256::from_slice(&hasher.finalize())
    }
}

#[derive(Clone, Copy, Default)]
pub struct Sha256;

impl Sha256Hasher for Sha256 {
    fn sha256(&self, data: &[u8]) -> H256 {
        let mut hasher = Sha256Impl::new();
        hasher.update(data);
        H256::from_slice(&hasher.finalize())
    }
}

/// Test double standing in for `BLSVerify`/`BLSAggregate`/`DilithiumVerify`: verification always
/// succeeds and "aggregation" is a deterministic, order-independent combiner (XOR-fold), so tests
/// can assert on aggregate identity without a real pairing-based backend.
#[derive(Clone, Copy, Default)]
pub struct NullSignatureScheme;

impl SignatureScheme for NullSignatureScheme {
    fn verify(&self, _pubkey: &PublicKeyBytes, _message: &H256, signature: &SignatureBytes) -> bool {
        !signature.0.is_empty()
    }

    fn aggregate(&self, signatures: &[SignatureBytes]) -> SignatureBytes {
        let len = signatures.iter().map(|s| s.0.len()).max().unwrap_or(0);
        let mut out = vec![0u8; len];
        for signature in signatures {
            for (i, byte) in signature.0.iter().enumerate() {
                out[i] ^= byte;
            }
        }
        SignatureBytes(out)
    }
}
