//! End-to-end node flow: process → elect → vote → cement → observe.

use lattica_blocks::{StateBlockBuilder, Vote};
use lattica_ledger::Genesis;
use lattica_node::{Node, NodeConfig};
use lattica_store::{ReadTransaction, Store};
use lattica_types::{
    Amount, Link, NetworkKind, NetworkParams, PublicKey, Root, GENESIS_AMOUNT,
};
use lattica_utils::scaled_deadline;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

fn test_node(dir: &tempfile::TempDir) -> Node {
    let genesis = Genesis::new(NetworkKind::Test);
    let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
    Node::new(NodeConfig::default(), params, dir.path()).unwrap()
}

fn work_for(node: &Node, root: Root) -> u64 {
    node.work_pool
        .generate_blocking(lattica_work::WorkVersion::Work1, root, node.params.work.base)
        .expect("work generated")
}

#[test]
fn chain_confirms_end_to_end_with_running_threads() {
    let dir = test_dir();
    let mut node = test_node(&dir);
    let key = Genesis::new(NetworkKind::Test).key.unwrap();
    node.online.observe(key.public);
    node.vote_processor.calculate_weights();
    node.start();

    // Two sends, submitted out of order so the gap machinery runs too.
    let mut s1 = StateBlockBuilder::new()
        .account(key.public)
        .previous(node.ledger.genesis_hash())
        .representative(key.public)
        .balance(Amount::raw(GENESIS_AMOUNT - 100))
        .link(Link::from(PublicKey::new([1; 32])))
        .sign(&key)
        .build()
        .unwrap();
    s1.set_work(work_for(&node, s1.root()));
    let mut s2 = StateBlockBuilder::new()
        .account(key.public)
        .previous(s1.hash())
        .representative(key.public)
        .balance(Amount::raw(GENESIS_AMOUNT - 200))
        .link(Link::from(PublicKey::new([1; 32])))
        .sign(&key)
        .build()
        .unwrap();
    s2.set_work(work_for(&node, s2.root()));
    let s1 = Arc::new(s1);
    let s2 = Arc::new(s2);

    assert!(node.process_local(Arc::clone(&s2)));
    assert!(node.process_local(Arc::clone(&s1)));

    // Wait for both blocks to land in the ledger.
    let deadline = Instant::now() + scaled_deadline(Duration::from_secs(10));
    loop {
        {
            let txn = node.ledger.store.tx_begin_read();
            if node.ledger.block_exists(txn.as_transaction(), &s2.hash()) {
                break;
            }
        }
        assert!(Instant::now() < deadline, "blocks not processed in time");
        std::thread::sleep(Duration::from_millis(10));
    }

    // Genesis votes for the head; the running threads confirm and cement
    // the whole chain.
    let vote = Arc::new(Vote::new(key.public, &key.private, 1, vec![s2.hash()]));
    node.vote_processor.vote(vote);

    let deadline = Instant::now() + scaled_deadline(Duration::from_secs(10));
    loop {
        {
            let txn = node.ledger.store.tx_begin_read();
            if node.ledger.block_confirmed(txn.as_transaction(), &s2.hash()) {
                assert!(node.ledger.block_confirmed(txn.as_transaction(), &s1.hash()));
                break;
            }
        }
        assert!(Instant::now() < deadline, "chain not cemented in time");
        std::thread::sleep(Duration::from_millis(10));
    }

    node.stop();
}

#[test]
fn rocksdb_backend_via_env_gets_selected_by_config() {
    // The TEST_USE_ROCKSDB=1 escape hatch is process-global; here the
    // config field selects the LSM backend explicitly.
    let dir = test_dir();
    let genesis = Genesis::new(NetworkKind::Test);
    let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
    let mut config = NodeConfig::default();
    config.backend = "rocksdb".to_string();
    let node = Node::new(config, params, dir.path()).unwrap();
    assert_eq!(node.telemetry().block_count, 1);
    assert!(dir.path().join("rocksdb").exists());
}
