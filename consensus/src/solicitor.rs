//! Confirmation solicitation.
//!
//! Batches confirm-req traffic per representative channel, seven (hash,
//! root) pairs per message, at most one batch per representative per
//! election cycle. When every directed target is saturated the request
//! falls back to a random flood subset.

use lattica_blocks::Block;
use lattica_types::{BlockHash, PublicKey, Root};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// Wire cap on (hash, root) pairs per confirm_req.
pub const CONFIRM_REQ_HASHES_MAX: usize = 7;

/// Batches a channel will accept per cycle before being saturated.
const MAX_CHANNEL_BATCHES: usize = 32;

/// Flood fanout when no directed representative channel has room.
const FLOOD_FANOUT: usize = 2;

/// The transport surface the solicitor needs; implemented by the node's
/// network channels.
pub trait SolicitorChannel: Send + Sync {
    fn channel_id(&self) -> u64;
    fn send_confirm_req(&self, requests: &[(BlockHash, Root)]);
    fn send_publish(&self, block: &Block);
}

/// One election cycle's worth of solicitation, built fresh each pass.
pub struct ConfirmationSolicitor<C: SolicitorChannel> {
    /// Online representatives with their channels.
    representatives: Vec<(PublicKey, Arc<C>)>,
    /// Non-representative channels used for the flood fallback.
    flood_targets: Vec<Arc<C>>,
    /// Queued requests per channel id.
    requests: HashMap<u64, (Arc<C>, Vec<(BlockHash, Root)>)>,
    /// Batches consumed per channel this cycle.
    consumed: HashMap<u64, usize>,
}

impl<C: SolicitorChannel> ConfirmationSolicitor<C> {
    pub fn new(representatives: Vec<(PublicKey, Arc<C>)>, flood_targets: Vec<Arc<C>>) -> Self {
        Self {
            representatives,
            flood_targets,
            requests: HashMap::new(),
            consumed: HashMap::new(),
        }
    }

    /// Queue a confirmation request for an election's winner towards every
    /// representative with batch budget left. Returns the number of
    /// channels that accepted; on zero the caller saw a full saturation
    /// and the request was flooded instead.
    pub fn request(&mut self, hash: BlockHash, root: Root) -> usize {
        let mut accepted = 0;
        for (_, channel) in &self.representatives {
            let id = channel.channel_id();
            let consumed = self.consumed.entry(id).or_insert(0);
            if *consumed >= MAX_CHANNEL_BATCHES {
                continue;
            }
            let entry = self
                .requests
                .entry(id)
                .or_insert_with(|| (Arc::clone(channel), Vec::new()));
            if entry.1.iter().any(|(queued, _)| *queued == hash) {
                accepted += 1;
                continue;
            }
            entry.1.push((hash, root));
            if entry.1.len() % CONFIRM_REQ_HASHES_MAX == 0 {
                *consumed += 1;
            }
            accepted += 1;
        }
        if accepted == 0 {
            self.flood(hash, root);
        }
        accepted
    }

    fn flood(&mut self, hash: BlockHash, root: Root) {
        let mut rng = rand::thread_rng();
        let targets: Vec<Arc<C>> = self
            .flood_targets
            .choose_multiple(&mut rng, FLOOD_FANOUT)
            .cloned()
            .collect();
        for channel in targets {
            channel.send_confirm_req(&[(hash, root)]);
        }
    }

    /// Rebroadcast the leading candidate to every representative channel.
    pub fn broadcast(&self, block: &Block) {
        for (_, channel) in &self.representatives {
            channel.send_publish(block);
        }
    }

    /// Send everything queued, chunked to the wire cap.
    pub fn flush(self) {
        for (_, (channel, requests)) in self.requests {
            for chunk in requests.chunks(CONFIRM_REQ_HASHES_MAX) {
                channel.send_confirm_req(chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockChannel {
        id: u64,
        confirm_reqs: Mutex<Vec<Vec<(BlockHash, Root)>>>,
        published: Mutex<Vec<BlockHash>>,
    }

    impl MockChannel {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                confirm_reqs: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
            })
        }
    }

    impl SolicitorChannel for MockChannel {
        fn channel_id(&self) -> u64 {
            self.id
        }

        fn send_confirm_req(&self, requests: &[(BlockHash, Root)]) {
            self.confirm_reqs.lock().unwrap().push(requests.to_vec());
        }

        fn send_publish(&self, block: &Block) {
            self.published.lock().unwrap().push(block.hash());
        }
    }

    fn rep(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    fn pair(byte: u8) -> (BlockHash, Root) {
        (BlockHash::new([byte; 32]), Root::new([byte; 32]))
    }

    #[test]
    fn batches_chunked_at_seven() {
        let channel = MockChannel::new(1);
        let mut solicitor =
            ConfirmationSolicitor::new(vec![(rep(1), Arc::clone(&channel))], vec![]);
        for byte in 1..=10u8 {
            let (hash, root) = pair(byte);
            assert_eq!(solicitor.request(hash, root), 1);
        }
        solicitor.flush();

        let sent = channel.confirm_reqs.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].len(), CONFIRM_REQ_HASHES_MAX);
        assert_eq!(sent[1].len(), 3);
    }

    #[test]
    fn duplicate_hashes_not_requeued() {
        let channel = MockChannel::new(1);
        let mut solicitor =
            ConfirmationSolicitor::new(vec![(rep(1), Arc::clone(&channel))], vec![]);
        let (hash, root) = pair(1);
        solicitor.request(hash, root);
        solicitor.request(hash, root);
        solicitor.flush();
        let sent = channel.confirm_reqs.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 1);
    }

    #[test]
    fn every_rep_channel_receives() {
        let a = MockChannel::new(1);
        let b = MockChannel::new(2);
        let mut solicitor = ConfirmationSolicitor::new(
            vec![(rep(1), Arc::clone(&a)), (rep(2), Arc::clone(&b))],
            vec![],
        );
        let (hash, root) = pair(1);
        assert_eq!(solicitor.request(hash, root), 2);
        solicitor.flush();
        assert_eq!(a.confirm_reqs.lock().unwrap().len(), 1);
        assert_eq!(b.confirm_reqs.lock().unwrap().len(), 1);
    }

    #[test]
    fn saturation_falls_back_to_flood() {
        let rep_channel = MockChannel::new(1);
        let bystander = MockChannel::new(2);
        let mut solicitor = ConfirmationSolicitor::new(
            vec![(rep(1), Arc::clone(&rep_channel))],
            vec![Arc::clone(&bystander)],
        );
        // Saturate the representative channel's batch budget.
        let mut byte = 0u16;
        for _ in 0..(MAX_CHANNEL_BATCHES * CONFIRM_REQ_HASHES_MAX) {
            byte += 1;
            let mut bytes = [0u8; 32];
            bytes[0] = (byte >> 8) as u8;
            bytes[1] = byte as u8;
            solicitor.request(BlockHash::new(bytes), Root::new(bytes));
        }
        // Next request finds no directed room and floods instead.
        let (hash, root) = pair(0xFF);
        assert_eq!(solicitor.request(hash, root), 0);
        assert_eq!(bystander.confirm_reqs.lock().unwrap().len(), 1);
    }

    #[test]
    fn broadcast_publishes_to_reps() {
        let channel = MockChannel::new(1);
        let solicitor = ConfirmationSolicitor::new(vec![(rep(1), Arc::clone(&channel))], vec![]);
        let block = lattica_blocks::StateBlockBuilder::new()
            .account(rep(1))
            .previous(BlockHash::ZERO)
            .representative(rep(1))
            .balance(lattica_types::Amount::raw(1))
            .link(lattica_types::Link::ZERO)
            .build()
            .unwrap();
        solicitor.broadcast(&block);
        assert_eq!(channel.published.lock().unwrap().len(), 1);
    }
}
