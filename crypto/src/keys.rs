//! Ed25519 key material.

use ed25519_dalek::{SigningKey, VerifyingKey};
use lattica_types::PublicKey;
use rand::rngs::OsRng;
use rand::RngCore;

/// A 32-byte Ed25519 private key.
#[derive(Clone)]
pub struct RawKey(pub [u8; 32]);

impl RawKey {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let signing = SigningKey::from_bytes(&self.0);
        PublicKey::new(signing.verifying_key().to_bytes())
    }
}

/// A private/public key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub private: RawKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate from the OS entropy source.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic pair from a 32-byte seed; used heavily by tests and the
    /// well-known test-network genesis key.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let public = PublicKey::new(signing.verifying_key().to_bytes());
        Self {
            private: RawKey(seed),
            public,
        }
    }
}

/// Decode a 32-byte public key into a dalek verifying key.
///
/// Fails for byte strings that are not valid curve points.
pub(crate) fn verifying_key(key: &PublicKey) -> Option<VerifyingKey> {
    VerifyingKey::from_bytes(key.as_bytes()).ok()
}
