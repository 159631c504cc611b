//! 256-bit and 512-bit primitives: hashes, public keys, signatures, roots.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! u256_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Parse from a 64-character uppercase or lowercase hex string.
            pub fn decode_hex(s: &str) -> Result<Self, ParseError> {
                if s.len() != 64 {
                    return Err(ParseError::InvalidLength {
                        expected: 64,
                        actual: s.len(),
                    });
                }
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseError::InvalidHex)?;
                Ok(Self(bytes))
            }

            /// Uppercase hex, the canonical textual form.
            pub fn encode_hex(&self) -> String {
                hex::encode_upper(self.0)
            }

            /// Interpret the 32 bytes as a big-endian number.
            pub fn number(&self) -> u128 {
                // Low 128 bits only; used for deterministic tie-breaking.
                u128::from_be_bytes(self.0[16..32].try_into().unwrap())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "("))?;
                for b in &self.0[..4] {
                    write!(f, "{:02X}", b)?;
                }
                write!(f, "…)")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.encode_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

u256_newtype!(BlockHash, "A 32-byte Blake2b block digest.");
u256_newtype!(PublicKey, "A 32-byte Ed25519 public key; doubles as an account identifier.");
u256_newtype!(Root, "The chain position a block contends for: `previous`, or the account for first blocks.");
u256_newtype!(Link, "The overloaded state-block link: destination, source hash or epoch marker.");

impl From<BlockHash> for Root {
    fn from(hash: BlockHash) -> Self {
        Root(hash.0)
    }
}

impl From<PublicKey> for Root {
    fn from(key: PublicKey) -> Self {
        Root(key.0)
    }
}

impl From<Link> for BlockHash {
    fn from(link: Link) -> Self {
        BlockHash(link.0)
    }
}

impl From<Link> for PublicKey {
    fn from(link: Link) -> Self {
        PublicKey(link.0)
    }
}

impl From<PublicKey> for Link {
    fn from(key: PublicKey) -> Self {
        Link(key.0)
    }
}

impl From<Root> for BlockHash {
    fn from(root: Root) -> Self {
        BlockHash(root.0)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes_64")] pub [u8; 64]);

impl Signature {
    pub const ZERO: Self = Self([0u8; 64]);

    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 64]
    }

    pub fn decode_hex(s: &str) -> Result<Self, ParseError> {
        if s.len() != 128 {
            return Err(ParseError::InvalidLength {
                expected: 128,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn encode_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(")?;
        for b in &self.0[..4] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, "…)")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_hex())
    }
}

// [u8; 64] has no serde impls past 32 elements on serde 1.x without const
// generics helpers, so route through a fixed-length tuple of two halves.
mod serde_bytes_64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 64], D::Error> {
        let v: Vec<u8> = Deserialize::deserialize(de)?;
        v.try_into()
            .map_err(|_| D::Error::custom("expected 64 bytes"))
    }
}

/// A 64-bit proof-of-work nonce.
pub type WorkNonce = u64;

/// Election index key: alternative blocks for the same chain position share
/// a qualified root, so they share an election.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct QualifiedRoot {
    pub root: Root,
    pub previous: BlockHash,
}

impl QualifiedRoot {
    pub fn new(root: Root, previous: BlockHash) -> Self {
        Self { root, previous }
    }

    /// 64-byte concatenation, root first.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.root.as_bytes());
        out[32..].copy_from_slice(self.previous.as_bytes());
        out
    }
}

impl fmt::Display for QualifiedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root, self.previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let hash = BlockHash::new([0xAB; 32]);
        let text = hash.encode_hex();
        assert_eq!(text.len(), 64);
        assert_eq!(BlockHash::decode_hex(&text).unwrap(), hash);
    }

    #[test]
    fn hex_rejects_bad_length() {
        assert!(matches!(
            BlockHash::decode_hex("AB"),
            Err(ParseError::InvalidLength { .. })
        ));
    }

    #[test]
    fn hex_rejects_non_hex() {
        let bad = "ZZ".repeat(32);
        assert!(matches!(
            BlockHash::decode_hex(&bad),
            Err(ParseError::InvalidHex)
        ));
    }

    #[test]
    fn signature_round_trip() {
        let sig = Signature::new([0x42; 64]);
        assert_eq!(Signature::decode_hex(&sig.encode_hex()).unwrap(), sig);
    }

    #[test]
    fn qualified_root_bytes_layout() {
        let qr = QualifiedRoot::new(Root::new([1; 32]), BlockHash::new([2; 32]));
        let bytes = qr.to_bytes();
        assert!(bytes[..32].iter().all(|&b| b == 1));
        assert!(bytes[32..].iter().all(|&b| b == 2));
    }

    #[test]
    fn zero_checks() {
        assert!(BlockHash::ZERO.is_zero());
        assert!(!BlockHash::new([1; 32]).is_zero());
        assert!(Signature::ZERO.is_zero());
    }
}
