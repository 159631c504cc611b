//! Online-stake tracking.
//!
//! Representatives are considered online while votes from them keep
//! arriving. The trended value — the median of periodic samples, floored at
//! the configured minimum — feeds quorum so a temporary dip in observed
//! stake cannot collapse the confirmation threshold.

use lattica_ledger::Ledger;
use lattica_store::{ReadTransaction, Store, WriteTransaction};
use lattica_types::{Amount, PublicKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a representative stays "online" after its last vote.
const ONLINE_WEIGHT_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Stored samples are trimmed to roughly two weeks at one per five minutes.
const MAX_SAMPLES: u64 = 4032;

struct Inner {
    reps: HashMap<PublicKey, Instant>,
    trended: Option<Amount>,
}

pub struct OnlineReps {
    ledger: Arc<Ledger>,
    inner: Mutex<Inner>,
}

impl OnlineReps {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            inner: Mutex::new(Inner {
                reps: HashMap::new(),
                trended: None,
            }),
        }
    }

    /// Record a vote arrival from `rep`.
    pub fn observe(&self, rep: PublicKey) {
        if self.ledger.weight(&rep).is_zero() {
            return;
        }
        self.inner.lock().unwrap().reps.insert(rep, Instant::now());
    }

    /// Stake currently observed online.
    pub fn online(&self) -> Amount {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reps
            .retain(|_, last_seen| last_seen.elapsed() < ONLINE_WEIGHT_PERIOD);
        inner
            .reps
            .keys()
            .fold(Amount::ZERO, |sum, rep| {
                sum.saturating_add(self.ledger.weight(rep))
            })
    }

    /// Median of persisted samples, floored at the configured minimum.
    pub fn trended(&self) -> Amount {
        let cached = self.inner.lock().unwrap().trended;
        let minimum = Amount::raw(self.ledger.params.online_weight_minimum);
        match cached {
            Some(trended) => trended.max(minimum),
            None => minimum,
        }
    }

    /// Effective online stake for quorum purposes.
    pub fn effective(&self) -> Amount {
        self.online().max(self.trended())
    }

    /// Quorum threshold: the winner must exceed this tally.
    pub fn delta(&self) -> Amount {
        let effective = self.effective().number();
        let quorum = self.ledger.params.online_weight_quorum as u128;
        Amount::raw(effective / 100 * quorum)
    }

    /// Minimum winner-over-runner-up margin for fork resolution.
    pub fn minimum_margin(&self) -> Amount {
        let minimum = self.ledger.params.online_weight_minimum;
        let quorum = self.ledger.params.online_weight_quorum as u128;
        Amount::raw(minimum / 100 * quorum)
    }

    /// Persist the current observation and refresh the trend from the
    /// stored sample set.
    pub fn sample(&self) {
        let online = self.online();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut txn = self.ledger.store.tx_begin_write();
        let _ = self.ledger.store.online_weight().put(&mut *txn, now, &online);

        let mut samples: Vec<(u64, Amount)> = Vec::new();
        self.ledger
            .store
            .online_weight()
            .for_each(txn.as_transaction(), &mut |ts, amount| {
                samples.push((ts, *amount));
                true
            });
        while samples.len() as u64 > MAX_SAMPLES {
            let (oldest, _) = samples.remove(0);
            let _ = self.ledger.store.online_weight().del(&mut *txn, oldest);
        }
        if txn.commit().is_err() {
            tracing::warn!("online weight sample commit failed");
            return;
        }

        let mut amounts: Vec<Amount> = samples.iter().map(|(_, a)| *a).collect();
        amounts.sort();
        let trended = amounts.get(amounts.len() / 2).copied();
        self.inner.lock().unwrap().trended = trended;
    }

    /// Whether `rep` holds principal weight: more than
    /// `online_stake / principal_weight_factor`.
    pub fn is_principal(&self, rep: &PublicKey) -> bool {
        let threshold = self.effective().number() / self.ledger.params.principal_weight_factor;
        self.ledger.weight(rep).number() > threshold
    }

    /// Currently-online principal representatives.
    pub fn principal_representatives(&self) -> Vec<PublicKey> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reps
            .retain(|_, last_seen| last_seen.elapsed() < ONLINE_WEIGHT_PERIOD);
        let reps: Vec<PublicKey> = inner.reps.keys().copied().collect();
        drop(inner);
        reps.into_iter()
            .filter(|rep| self.is_principal(rep))
            .collect()
    }

    pub fn online_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reps
            .retain(|_, last_seen| last_seen.elapsed() < ONLINE_WEIGHT_PERIOD);
        inner.reps.len()
    }
}
