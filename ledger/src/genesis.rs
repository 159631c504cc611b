//! Genesis block and key material per network.

use lattica_blocks::{Block, OpenBlockBuilder};
use lattica_crypto::KeyPair;
use lattica_types::{BlockHash, NetworkKind, PublicKey};

/// The well-known test-network genesis seed. Live and beta keys are secret;
/// their public halves would be compiled in here.
const TEST_GENESIS_SEED: [u8; 32] = [0xDD; 32];

/// The first block of the ledger: a legacy open on the genesis account,
/// self-referential source, holding the entire supply.
pub struct Genesis {
    pub block: Block,
    pub account: PublicKey,
    /// Present only on the test network.
    pub key: Option<KeyPair>,
}

impl Genesis {
    pub fn new(kind: NetworkKind) -> Self {
        // Live and beta share the construction; only the key differs. Until
        // a production key ceremony exists, all networks derive from fixed
        // seeds, with only the test seed considered public.
        let seed = match kind {
            NetworkKind::Test => TEST_GENESIS_SEED,
            NetworkKind::Beta => [0xBE; 32],
            NetworkKind::Live => [0x1A; 32],
        };
        let key = KeyPair::from_seed(seed);
        let account = key.public;
        let block = OpenBlockBuilder::new()
            .source(BlockHash::new(*account.as_bytes()))
            .representative(account)
            .account(account)
            .sign(&key)
            .work(0)
            .build()
            .expect("genesis fields are fixed");
        Self {
            block,
            account,
            key: (kind == NetworkKind::Test).then_some(key),
        }
    }

    pub fn hash(&self) -> BlockHash {
        self.block.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_crypto::verify_message;

    #[test]
    fn deterministic_per_network() {
        let a = Genesis::new(NetworkKind::Test);
        let b = Genesis::new(NetworkKind::Test);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), Genesis::new(NetworkKind::Live).hash());
    }

    #[test]
    fn genesis_signature_valid() {
        let genesis = Genesis::new(NetworkKind::Test);
        assert!(verify_message(
            genesis.hash().as_bytes(),
            &genesis.block.signature(),
            &genesis.account
        ));
    }

    #[test]
    fn test_key_exposed_only_on_test() {
        assert!(Genesis::new(NetworkKind::Test).key.is_some());
        assert!(Genesis::new(NetworkKind::Live).key.is_none());
    }
}
