//! Batched signature verification facade.
//!
//! Wraps the crypto-layer batch verifier with the slicing the block and
//! vote pipelines need. Verification fans out on the global rayon pool;
//! the pool size is configured at node start, independently of the work
//! threads.

use lattica_crypto::validate_batch;
use lattica_types::{BlockHash, PublicKey, Signature};

/// One batch of verification inputs; all slices share indices.
pub struct SignatureCheckSet<'a> {
    pub messages: Vec<&'a [u8]>,
    pub pub_keys: Vec<PublicKey>,
    pub signatures: Vec<Signature>,
    /// Output: 1 for valid, 0 for invalid.
    pub verifications: Vec<i32>,
}

impl<'a> SignatureCheckSet<'a> {
    pub fn new(
        messages: Vec<&'a [u8]>,
        pub_keys: Vec<PublicKey>,
        signatures: Vec<Signature>,
    ) -> Self {
        let size = messages.len();
        assert_eq!(size, pub_keys.len());
        assert_eq!(size, signatures.len());
        Self {
            messages,
            pub_keys,
            signatures,
            verifications: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }
}

pub struct SignatureChecker;

impl SignatureChecker {
    /// Verify every entry in `check`, filling `verifications`.
    pub fn verify(check: &mut SignatureCheckSet) {
        if check.size() == 0 {
            return;
        }
        validate_batch(
            &check.messages,
            &check.pub_keys,
            &check.signatures,
            &mut check.verifications,
        );
    }
}

/// Convenience wrapper for hash-signed payloads.
pub fn verify_block_signatures(
    hashes: &[BlockHash],
    pub_keys: &[PublicKey],
    signatures: &[Signature],
) -> Vec<bool> {
    let messages: Vec<&[u8]> = hashes.iter().map(|hash| hash.as_bytes().as_slice()).collect();
    let mut check = SignatureCheckSet::new(messages, pub_keys.to_vec(), signatures.to_vec());
    SignatureChecker::verify(&mut check);
    check.verifications.into_iter().map(|v| v == 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_crypto::{sign_message, KeyPair};

    #[test]
    fn mixed_batch_flags_only_the_forgery() {
        let pairs: Vec<KeyPair> = (1u8..=32).map(|i| KeyPair::from_seed([i; 32])).collect();
        let hashes: Vec<BlockHash> = (1u8..=32).map(|i| BlockHash::new([i; 32])).collect();
        let keys: Vec<PublicKey> = pairs.iter().map(|p| p.public).collect();
        let mut signatures: Vec<Signature> = pairs
            .iter()
            .zip(&hashes)
            .map(|(pair, hash)| sign_message(hash.as_bytes(), &pair.private))
            .collect();
        signatures[20] = Signature::new([1; 64]);

        let results = verify_block_signatures(&hashes, &keys, &signatures);
        for (index, valid) in results.iter().enumerate() {
            assert_eq!(*valid, index != 20, "index {index}");
        }
    }

    #[test]
    fn empty_batch_is_fine() {
        let mut check = SignatureCheckSet::new(vec![], vec![], vec![]);
        SignatureChecker::verify(&mut check);
        assert_eq!(check.size(), 0);
    }
}
