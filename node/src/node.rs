//! The node aggregate.
//!
//! Construction wires the subsystems together through observers: the block
//! processor feeds elections and gossip, confirmed elections feed the
//! cementer, cemented blocks close the loop back into election cleanup and
//! local voting. `start` spawns the role-labeled processing threads;
//! everything stops cooperatively through one flag.

use crate::block_processor::{BlockProcessor, BlockSource};
use crate::bootstrap::BootstrapInitiator;
use crate::config::NodeConfig;
use crate::confirmation_height::ConfirmationHeightProcessor;
use crate::gap_cache::GapCache;
use crate::state_block_verification::StateBlockVerification;
use lattica_blocks::Block;
use lattica_consensus::{
    ActiveElections, LocalVoteHistory, OnlineReps, RequestAggregator, VoteGenerator,
    VoteProcessor,
};
use lattica_ledger::{Genesis, Ledger};
use lattica_messages::TelemetryData;
use lattica_network::network::Network;
use lattica_network::{BandwidthLimiter, PeerTable, SynCookies};
use lattica_store::{ReadTransaction, Store, StoreError, Table, WriteDatabaseQueue};
use lattica_store_lmdb::{LmdbConfig, LmdbStore};
use lattica_store_rocksdb::{RocksDbConfig, RocksDbStore};
use lattica_types::{NetworkParams, Root};
use lattica_utils::{Stats, ThreadRole};
use lattica_work::WorkPool;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Node {
    pub config: NodeConfig,
    pub params: NetworkParams,
    pub ledger: Arc<Ledger>,
    pub stats: Arc<Stats>,
    pub write_queue: Arc<WriteDatabaseQueue>,
    pub work_pool: Arc<WorkPool>,
    pub online: Arc<OnlineReps>,
    pub active: Arc<ActiveElections>,
    pub vote_processor: Arc<VoteProcessor>,
    pub vote_generator: Arc<VoteGenerator>,
    pub aggregator: Arc<RequestAggregator>,
    pub block_processor: Arc<BlockProcessor>,
    pub confirmation_height: Arc<ConfirmationHeightProcessor>,
    pub gap_cache: Arc<GapCache>,
    pub state_block_verification: Arc<StateBlockVerification>,
    pub bootstrap: Arc<BootstrapInitiator>,
    pub network: Arc<Network>,
    /// Shared outbound budget handed to every accepted channel.
    pub bandwidth: Arc<BandwidthLimiter>,
    pub syn_cookies: Arc<SynCookies>,
    stopped: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    started_at: std::time::Instant,
}

impl Node {
    /// Open the ledger at `data_path` and assemble every subsystem.
    ///
    /// The storage backend follows the config, overridable by
    /// `TEST_USE_ROCKSDB=1` so the whole suite can run against the LSM
    /// store.
    pub fn new(
        config: NodeConfig,
        params: NetworkParams,
        data_path: &Path,
    ) -> Result<Self, StoreError> {
        let use_rocksdb = std::env::var("TEST_USE_ROCKSDB")
            .map(|value| value == "1")
            .unwrap_or(config.backend == "rocksdb");
        let store: Arc<dyn Store> = if use_rocksdb {
            Arc::new(RocksDbStore::open(
                &data_path.join("rocksdb"),
                &RocksDbConfig::default(),
            )?)
        } else {
            Arc::new(LmdbStore::open(
                &data_path.join("ledger"),
                &LmdbConfig::default(),
            )?)
        };

        let genesis = Genesis::new(params.kind);
        let ledger = Arc::new(Ledger::new(store, params.clone(), &genesis)?);
        let stats = Arc::new(Stats::new());
        let write_queue = Arc::new(WriteDatabaseQueue::new());

        let work_threads = if params.is_test() {
            1
        } else if config.work_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            config.work_threads
        };
        let work_pool = Arc::new(WorkPool::new(
            work_threads,
            Duration::from_nanos(config.pow_sleep_interval_ns),
            None,
        ));

        let online = Arc::new(OnlineReps::new(Arc::clone(&ledger)));
        let active = Arc::new(ActiveElections::new(
            Arc::clone(&ledger),
            Arc::clone(&online),
        ));
        let vote_processor = Arc::new(VoteProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&active),
            Arc::clone(&online),
        ));

        let limiter = Arc::new(BandwidthLimiter::new(
            config.bandwidth_limit,
            config.bandwidth_burst,
        ));
        let peers = Arc::new(PeerTable::new(config.max_peers_per_ip));
        let network = Arc::new(Network::new(Arc::clone(&peers), params.kind));

        let history = Arc::new(LocalVoteHistory::new(8192));
        let generator_network = Arc::clone(&network);
        let generator_history = Arc::clone(&history);
        let generator_online = Arc::clone(&online);
        let vote_generator = Arc::new(VoteGenerator::new(
            Arc::clone(&ledger),
            Arc::clone(&write_queue),
            Box::new(move |vote| {
                for hash in vote.hashes() {
                    generator_history.add(Root::from(hash), Arc::clone(&vote));
                }
                let principals = generator_online.principal_representatives();
                generator_network.send_to_principals(Arc::clone(&vote), &principals);
                generator_network.flood_vote(vote, 0.5);
            }),
        ));
        let aggregator = Arc::new(RequestAggregator::new(
            Arc::clone(&ledger),
            Arc::clone(&active),
            Arc::clone(&vote_generator),
            history,
        ));

        let gap_cache = Arc::new(GapCache::new(Arc::clone(&ledger)));
        let bootstrap = Arc::new(BootstrapInitiator::new(
            Arc::clone(&ledger),
            Arc::clone(&stats),
        ));
        let bootstrap_for_gaps = Arc::clone(&bootstrap);
        gap_cache.set_bootstrap_trigger(Box::new(move |hash| {
            bootstrap_for_gaps.bootstrap_lazy(hash);
        }));

        let block_processor = Arc::new(BlockProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&write_queue),
            Arc::clone(&gap_cache),
            Arc::clone(&stats),
        ));
        let state_block_verification =
            Arc::new(StateBlockVerification::new(Arc::clone(&ledger)));
        let confirmation_height = Arc::new(ConfirmationHeightProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&write_queue),
        ));

        // Verified state blocks stream into the processing queue.
        let processor_for_verified = Arc::clone(&block_processor);
        state_block_verification.set_blocks_verified_callback(Box::new(
            move |items, _hashes, _signatures| {
                for (block, valid) in items {
                    if valid {
                        processor_for_verified.add(block, BlockSource::Live);
                    }
                }
            },
        ));

        // Accepted blocks start elections, wake cached votes and gossip on.
        let active_for_processed = Arc::clone(&active);
        let votes_for_processed = Arc::clone(&vote_processor);
        let network_for_processed = Arc::clone(&network);
        block_processor.add_processed_observer(Box::new(move |_result, block| {
            let inserted = active_for_processed.insert(Arc::clone(block));
            if inserted.inserted {
                votes_for_processed.flush_cached(&block.hash());
            }
            network_for_processed.flood_block(Arc::clone(block), 0.5);
        }));

        // Fork candidates join the existing election for their root.
        let active_for_forks = Arc::clone(&active);
        block_processor.add_fork_observer(Box::new(move |block| {
            active_for_forks.publish(Arc::clone(block));
        }));

        // Cemented blocks finalize elections and, when voting, get acked.
        let active_for_cemented = Arc::clone(&active);
        let generator_for_cemented = Arc::clone(&vote_generator);
        let voting_enabled = config.enable_voting;
        confirmation_height.add_cemented_observer(Box::new(move |block: &Block| {
            let hash = block.hash();
            active_for_cemented.block_cemented(&hash);
            if voting_enabled {
                generator_for_cemented.add(block.root(), hash);
            }
        }));

        Ok(Self {
            config,
            params,
            ledger,
            stats,
            write_queue,
            work_pool,
            online,
            active,
            vote_processor,
            vote_generator,
            aggregator,
            block_processor,
            confirmation_height,
            gap_cache,
            state_block_verification,
            bootstrap,
            network,
            bandwidth: limiter,
            syn_cookies: Arc::new(SynCookies::new(8192)),
            stopped: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            started_at: std::time::Instant::now(),
        })
    }

    /// Spawn the processing threads.
    pub fn start(&mut self) {
        let interval = Duration::from_millis(self.params.request_interval_ms);

        let stopped = Arc::clone(&self.stopped);
        let block_processor = Arc::clone(&self.block_processor);
        let verification = Arc::clone(&self.state_block_verification);
        self.threads.push(ThreadRole::BlockProcessing.spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                verification.run_once();
                if block_processor.process_batch().is_empty() {
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }));

        let stopped = Arc::clone(&self.stopped);
        let vote_processor = Arc::clone(&self.vote_processor);
        self.threads.push(ThreadRole::VoteProcessing.spawn(move || {
            let mut since_recalculation = std::time::Instant::now();
            while !stopped.load(Ordering::SeqCst) {
                if vote_processor.flush() == 0 {
                    std::thread::sleep(Duration::from_millis(5));
                }
                if since_recalculation.elapsed() > Duration::from_secs(60) {
                    vote_processor.calculate_weights();
                    since_recalculation = std::time::Instant::now();
                }
            }
        }));

        let stopped = Arc::clone(&self.stopped);
        let confirmation_height = Arc::clone(&self.confirmation_height);
        let active = Arc::clone(&self.active);
        self.threads
            .push(ThreadRole::ConfirmationHeightProcessing.spawn(move || {
                while !stopped.load(Ordering::SeqCst) {
                    for status in active.take_confirmed() {
                        if let Some(winner) = &status.winner {
                            confirmation_height.add(winner.hash());
                        }
                    }
                    if confirmation_height.flush().is_empty() {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
            }));

        let stopped = Arc::clone(&self.stopped);
        let active = Arc::clone(&self.active);
        let generator = Arc::clone(&self.vote_generator);
        let aggregator = Arc::clone(&self.aggregator);
        self.threads.push(ThreadRole::RequestLoop.spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                active.tick();
                generator.run_once();
                aggregator.process_all();
                std::thread::sleep(interval);
            }
        }));

        tracing::info!(
            network = self.params.kind.as_str(),
            "node started"
        );
    }

    /// Cooperative shutdown; joins every processing thread.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bootstrap.stop();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("node stopped");
    }

    /// Submit a locally produced block.
    pub fn process_local(&self, block: Arc<Block>) -> bool {
        self.block_processor.add(block, BlockSource::Local)
    }

    /// Force an election for an already-ledgered block (operator or test
    /// driven confirmation).
    pub fn block_confirm(&self, block: Arc<Block>) {
        let inserted = self.active.insert(Arc::clone(&block));
        if inserted.inserted {
            self.active.activate_dependencies(&block.hash());
        }
    }

    pub fn telemetry(&self) -> TelemetryData {
        let txn = self.ledger.store.tx_begin_read();
        TelemetryData {
            block_count: self.ledger.cache.block_count.load(Ordering::Relaxed),
            cemented_count: self.ledger.cache.cemented_count.load(Ordering::Relaxed),
            unchecked_count: self
                .ledger
                .store
                .count(txn.as_transaction(), Table::Unchecked),
            account_count: self.ledger.cache.account_count.load(Ordering::Relaxed),
            bandwidth_cap: self.config.bandwidth_limit as u64,
            peer_count: self.network.peers.len() as u32,
            protocol_version: lattica_protocol::PROTOCOL_VERSION_USING,
            uptime_secs: self.started_at.elapsed().as_secs(),
            genesis_hash: self.ledger.genesis_hash(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_types::{Amount, Link, NetworkKind, PublicKey, GENESIS_AMOUNT};

    fn test_node(dir: &Path) -> Node {
        let genesis = Genesis::new(NetworkKind::Test);
        let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
        Node::new(NodeConfig::default(), params, dir).unwrap()
    }

    fn work_for(ledger: &Ledger, root: Root) -> u64 {
        (0u64..)
            .find(|&w| lattica_work::difficulty::value(&root, w) >= ledger.params.work.base)
            .unwrap()
    }

    #[test]
    fn node_opens_with_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        assert_eq!(node.ledger.cache.block_count.load(Ordering::Relaxed), 1);
        let telemetry = node.telemetry();
        assert_eq!(telemetry.block_count, 1);
        assert_eq!(telemetry.cemented_count, 1);
        assert_eq!(telemetry.genesis_hash, node.ledger.genesis_hash());
    }

    #[test]
    fn processed_block_starts_election_and_confirms_via_vote() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let key = Genesis::new(NetworkKind::Test).key.unwrap();
        node.online.observe(key.public);

        let mut send = StateBlockBuilder::new()
            .account(key.public)
            .previous(node.ledger.genesis_hash())
            .representative(key.public)
            .balance(Amount::raw(GENESIS_AMOUNT - 200))
            .link(Link::from(PublicKey::new([1; 32])))
            .sign(&key)
            .build()
            .unwrap();
        send.set_work(work_for(&node.ledger, send.root()));
        let send = Arc::new(send);

        assert!(node.process_local(Arc::clone(&send)));
        node.block_processor.flush();
        assert!(node.active.active(&send.hash()));

        // Full-weight vote confirms; cementing finalizes and erases.
        let vote = Arc::new(lattica_blocks::Vote::new(
            key.public,
            &key.private,
            1,
            vec![send.hash()],
        ));
        node.vote_processor.vote_blocking(&vote);
        for status in node.active.take_confirmed() {
            if let Some(winner) = &status.winner {
                node.confirmation_height.add(winner.hash());
            }
        }
        let cemented = node.confirmation_height.flush();
        assert_eq!(cemented.len(), 1);
        assert!(!node.active.active(&send.hash()));

        let txn = node.ledger.store.tx_begin_read();
        assert!(node.ledger.block_confirmed(txn.as_transaction(), &send.hash()));
    }

    #[test]
    fn start_and_stop_threads() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_node(dir.path());
        node.start();
        std::thread::sleep(Duration::from_millis(50));
        node.stop();
    }
}
