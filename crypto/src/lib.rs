//! Cryptographic primitives for the Lattica protocol.
//!
//! Blake2b hashing, Ed25519 keys and signatures, and the checksummed
//! `lat_` account-address codec.

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_account, encode_account};
pub use hash::{blake2b_256, blake2b_var, Blake2bHasher};
pub use keys::{KeyPair, RawKey};
pub use sign::{sign_message, validate_batch, verify_message};
