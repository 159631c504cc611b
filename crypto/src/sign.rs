//! Ed25519 signing and verification, single and batched.

use crate::keys::{verifying_key, RawKey};
use ed25519_dalek::{Signer, SigningKey};
use lattica_types::{PublicKey, Signature};
use rayon::prelude::*;

/// Batches below this size are verified inline; larger ones fan out across
/// the rayon pool.
const PARALLEL_BATCH_MIN: usize = 16;

/// Sign `message` with `key`.
pub fn sign_message(message: &[u8], key: &RawKey) -> Signature {
    let signing = SigningKey::from_bytes(key.as_bytes());
    Signature::new(signing.sign(message).to_bytes())
}

/// Verify a single signature. Invalid public-key encodings verify as false.
pub fn verify_message(message: &[u8], signature: &Signature, key: &PublicKey) -> bool {
    let Some(verifying) = verifying_key(key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying.verify_strict(message, &sig).is_ok()
}

/// Verify a batch of signatures, writing 1 into `valid` for each good one.
///
/// All slices must be the same length. Large batches are split across the
/// rayon pool; per-item results are independent so a single forgery never
/// hides behind an aggregate check.
pub fn validate_batch(
    messages: &[&[u8]],
    keys: &[PublicKey],
    signatures: &[Signature],
    valid: &mut [i32],
) {
    assert_eq!(messages.len(), keys.len());
    assert_eq!(messages.len(), signatures.len());
    assert_eq!(messages.len(), valid.len());

    if messages.len() < PARALLEL_BATCH_MIN {
        for i in 0..messages.len() {
            valid[i] = verify_message(messages[i], &signatures[i], &keys[i]) as i32;
        }
    } else {
        valid
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, out)| *out = verify_message(messages[i], &signatures[i], &keys[i]) as i32);
    }
}
