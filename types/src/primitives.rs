use std::fmt;

pub use ethereum_types::H256;

/// 64-bit slot counter. `Epoch = Slot / SlotsPerEpoch`, and the divisor may change at forks.
pub type Slot = u64;
pub type Epoch = u64;
pub type Gwei = u64;
pub type CommitteeIndex = u64;
pub type SubcommitteeIndex = u64;

/// Dense id assigned to a validator at registration time.
pub type ValidatorIndex = u64;

/// Sentinel meaning "not scheduled" for epoch-valued validator lifecycle fields.
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;

/// Opaque 48-byte BLS/Dilithium public key. Contents are never interpreted by this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PublicKeyBytes(pub [u8; 48]);

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex_string(&self.0))
    }
}

impl Default for PublicKeyBytes {
    fn default() -> Self {
        Self([0; 48])
    }
}

/// Opaque aggregate/individual signature. Length varies by scheme (96B BLS, larger for Dilithium).
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SignatureBytes(pub Vec<u8>);

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex_string(&self.0))
    }
}

impl Default for SignatureBytes {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl SignatureBytes {
    pub fn empty() -> Self {
        Self::default()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
