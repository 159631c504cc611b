//! Blake2b hashing helpers.

use blake2::digest::consts::U32;
use blake2::digest::{Update, VariableOutput};
use blake2::{Blake2b, Blake2bVar, Digest};

type Blake2b256 = Blake2b<U32>;

/// One-shot 32-byte Blake2b digest.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    Digest::update(&mut hasher, data);
    hasher.finalize().into()
}

/// One-shot variable-length Blake2b digest (1..=64 bytes).
pub fn blake2b_var(out_len: usize, data: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(out_len).expect("valid blake2b output length");
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches requested length");
    out
}

/// Incremental 32-byte Blake2b, for multi-field block hashing.
pub struct Blake2bHasher {
    inner: Blake2b256,
}

impl Blake2bHasher {
    pub fn new() -> Self {
        Self {
            inner: Blake2b256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        Digest::update(&mut self.inner, data);
        self
    }

    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl Default for Blake2bHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = Blake2bHasher::new();
        hasher.update(b"hello ").update(b"world");
        assert_eq!(hasher.finalize(), blake2b_256(b"hello world"));
    }

    #[test]
    fn var_length_output() {
        let digest = blake2b_var(5, b"checksum me");
        assert_eq!(digest.len(), 5);
        // Different lengths are independent hash functions.
        assert_ne!(blake2b_var(8, b"x")[..5], blake2b_var(5, b"x")[..]);
    }

    #[test]
    fn distinct_inputs_distinct_digests() {
        assert_ne!(blake2b_256(b"a"), blake2b_256(b"b"));
    }
}
