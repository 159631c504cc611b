//! State-block signature pre-verification.
//!
//! Network-sourced state blocks queue here and are signature-checked in
//! batches before they reach the block processor, so an invalid-signature
//! flood burns batch-verification throughput instead of ledger time.
//! Epoch blocks verify against the epoch signer.

use crate::signature_checker::{SignatureChecker, SignatureCheckSet};
use lattica_blocks::Block;
use lattica_ledger::Ledger;
use lattica_types::{BlockHash, PublicKey, Signature};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Blocks verified per drain.
pub const VERIFICATION_BATCH_MAX: usize = 128;

type VerifiedCallback =
    Box<dyn Fn(Vec<(Arc<Block>, bool)>, Vec<BlockHash>, Vec<Signature>) + Send + Sync>;

pub struct StateBlockVerification {
    ledger: Arc<Ledger>,
    queue: Mutex<VecDeque<Arc<Block>>>,
    callback: Mutex<Option<VerifiedCallback>>,
}

impl StateBlockVerification {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            queue: Mutex::new(VecDeque::new()),
            callback: Mutex::new(None),
        }
    }

    /// Install the downstream consumer (normally the block processor).
    pub fn set_blocks_verified_callback(&self, callback: VerifiedCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    pub fn add(&self, block: Arc<Block>) {
        self.queue.lock().unwrap().push_back(block);
    }

    pub fn size(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// The signer a state block must verify against: the epoch signer for
    /// epoch blocks, the owning account otherwise.
    fn signer_for(&self, block: &Block) -> PublicKey {
        let link = block.link();
        if self.ledger.is_epoch_link(&link) {
            self.ledger
                .params
                .epochs
                .epoch(&link)
                .and_then(|epoch| self.ledger.params.epochs.signer(epoch))
                .or_else(|| block.account_field())
                .unwrap_or(PublicKey::ZERO)
        } else {
            block.account_field().unwrap_or(PublicKey::ZERO)
        }
    }

    /// Drain one batch, verify, and hand results to the callback. Returns
    /// the number verified.
    pub fn run_once(&self) -> usize {
        let batch: Vec<Arc<Block>> = {
            let mut queue = self.queue.lock().unwrap();
            let take = queue.len().min(VERIFICATION_BATCH_MAX);
            queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return 0;
        }

        let hashes: Vec<BlockHash> = batch.iter().map(|block| block.hash()).collect();
        let signatures: Vec<Signature> = batch.iter().map(|block| block.signature()).collect();
        let signers: Vec<PublicKey> = batch.iter().map(|block| self.signer_for(block)).collect();
        let messages: Vec<&[u8]> = hashes.iter().map(|hash| hash.as_bytes().as_slice()).collect();

        let mut check = SignatureCheckSet::new(messages, signers, signatures.clone());
        SignatureChecker::verify(&mut check);

        let verified: Vec<(Arc<Block>, bool)> = batch
            .into_iter()
            .zip(check.verifications.iter())
            .map(|(block, valid)| (block, *valid == 1))
            .collect();
        let count = verified.len();

        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(verified, hashes, signatures);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_crypto::KeyPair;
    use lattica_ledger::Genesis;
    use lattica_store_lmdb::{LmdbConfig, LmdbStore};
    use lattica_types::{Amount, Link, NetworkKind, NetworkParams};

    fn ledger() -> (tempfile::TempDir, Arc<Ledger>) {
        let dir = tempfile::tempdir().unwrap();
        let config = LmdbConfig {
            map_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        let store = Arc::new(LmdbStore::open(dir.path(), &config).unwrap());
        let genesis = Genesis::new(NetworkKind::Test);
        let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
        (dir, Arc::new(Ledger::new(store, params, &genesis).unwrap()))
    }

    fn signed_block(key: &KeyPair, balance: u128) -> Arc<Block> {
        Arc::new(
            StateBlockBuilder::new()
                .account(key.public)
                .previous(BlockHash::new([1; 32]))
                .representative(key.public)
                .balance(Amount::raw(balance))
                .link(Link::ZERO)
                .sign(key)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn batch_verifies_and_calls_back() {
        let (_dir, ledger) = ledger();
        let verification = StateBlockVerification::new(ledger);
        let results = Arc::new(Mutex::new(Vec::new()));
        let results_clone = Arc::clone(&results);
        verification.set_blocks_verified_callback(Box::new(move |items, hashes, signatures| {
            assert_eq!(items.len(), hashes.len());
            assert_eq!(items.len(), signatures.len());
            results_clone
                .lock()
                .unwrap()
                .extend(items.into_iter().map(|(_, valid)| valid));
        }));

        let good = KeyPair::from_seed([1; 32]);
        verification.add(signed_block(&good, 10));
        // Forge: signed by a different key than the account field claims.
        let forger = KeyPair::from_seed([2; 32]);
        let mut forged = (*signed_block(&good, 20)).clone();
        forged.set_signature(
            lattica_crypto::sign_message(forged.hash().as_bytes(), &forger.private),
        );
        verification.add(Arc::new(forged));

        assert_eq!(verification.run_once(), 2);
        assert_eq!(*results.lock().unwrap(), vec![true, false]);
        assert_eq!(verification.size(), 0);
    }

    #[test]
    fn epoch_blocks_verify_against_epoch_signer() {
        let (_dir, ledger) = ledger();
        let genesis_key = Genesis::new(NetworkKind::Test).key.unwrap();
        let account = KeyPair::from_seed([3; 32]);
        let epoch_link = ledger.params.epochs.link(lattica_types::Epoch::Epoch1).unwrap();

        // Signed by the epoch signer (genesis), not the account owner.
        let mut block = StateBlockBuilder::new()
            .account(account.public)
            .previous(BlockHash::new([1; 32]))
            .representative(account.public)
            .balance(Amount::raw(0))
            .link(epoch_link)
            .sign(&genesis_key)
            .build()
            .unwrap();
        block.set_work(0);

        let verification = StateBlockVerification::new(ledger);
        let results = Arc::new(Mutex::new(Vec::new()));
        let results_clone = Arc::clone(&results);
        verification.set_blocks_verified_callback(Box::new(move |items, _, _| {
            results_clone
                .lock()
                .unwrap()
                .extend(items.into_iter().map(|(_, valid)| valid));
        }));
        verification.add(Arc::new(block));
        verification.run_once();
        assert_eq!(*results.lock().unwrap(), vec![true]);
    }

    #[test]
    fn drains_in_bounded_batches() {
        let (_dir, ledger) = ledger();
        let verification = StateBlockVerification::new(ledger);
        verification.set_blocks_verified_callback(Box::new(|_, _, _| {}));
        let key = KeyPair::from_seed([1; 32]);
        for balance in 0..(VERIFICATION_BATCH_MAX as u128 + 10) {
            verification.add(signed_block(&key, balance));
        }
        assert_eq!(verification.run_once(), VERIFICATION_BATCH_MAX);
        assert_eq!(verification.run_once(), 10);
        assert_eq!(verification.run_once(), 0);
    }
}
