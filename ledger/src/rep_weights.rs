//! Delegated representative weights.
//!
//! Maintained incrementally as blocks are applied and rolled back. Readers
//! that need a coherent view of the whole map (tier calculation, tally)
//! take an `Arc` snapshot instead of holding the lock while they work.

use lattica_types::{Amount, PublicKey};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct RepWeights {
    weights: RwLock<HashMap<PublicKey, Amount>>,
}

impl RepWeights {
    pub fn new() -> Self {
        Self {
            weights: RwLock::new(HashMap::new()),
        }
    }

    pub fn representation_add(&self, rep: PublicKey, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        let mut weights = self.weights.write().unwrap();
        let entry = weights.entry(rep).or_insert(Amount::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn representation_subtract(&self, rep: PublicKey, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        let mut weights = self.weights.write().unwrap();
        if let Some(entry) = weights.get_mut(&rep) {
            *entry = entry.saturating_sub(amount);
            if entry.is_zero() {
                weights.remove(&rep);
            }
        }
    }

    /// Current delegated weight of `rep`; zero when unknown.
    pub fn representation_get(&self, rep: &PublicKey) -> Amount {
        self.weights
            .read()
            .unwrap()
            .get(rep)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// An owned snapshot of the whole map, decoupled from later updates.
    pub fn snapshot(&self) -> Arc<HashMap<PublicKey, Amount>> {
        Arc::new(self.weights.read().unwrap().clone())
    }

    /// Sum over every representative.
    pub fn total(&self) -> Amount {
        self.weights
            .read()
            .unwrap()
            .values()
            .fold(Amount::ZERO, |sum, w| sum.saturating_add(*w))
    }

    pub fn len(&self) -> usize {
        self.weights.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.read().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.weights.write().unwrap().clear();
    }
}

impl Default for RepWeights {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    #[test]
    fn add_and_subtract() {
        let weights = RepWeights::new();
        weights.representation_add(rep(1), Amount::raw(100));
        weights.representation_add(rep(1), Amount::raw(50));
        assert_eq!(weights.representation_get(&rep(1)), Amount::raw(150));

        weights.representation_subtract(rep(1), Amount::raw(150));
        assert_eq!(weights.representation_get(&rep(1)), Amount::ZERO);
        // Fully drained reps drop out of the map entirely.
        assert!(weights.is_empty());
    }

    #[test]
    fn zero_amounts_are_noops() {
        let weights = RepWeights::new();
        weights.representation_add(rep(1), Amount::ZERO);
        assert!(weights.is_empty());
    }

    #[test]
    fn snapshot_is_decoupled() {
        let weights = RepWeights::new();
        weights.representation_add(rep(1), Amount::raw(10));
        let snapshot = weights.snapshot();
        weights.representation_add(rep(1), Amount::raw(5));
        assert_eq!(snapshot.get(&rep(1)), Some(&Amount::raw(10)));
        assert_eq!(weights.representation_get(&rep(1)), Amount::raw(15));
    }

    #[test]
    fn total_sums_every_rep() {
        let weights = RepWeights::new();
        weights.representation_add(rep(1), Amount::raw(10));
        weights.representation_add(rep(2), Amount::raw(20));
        assert_eq!(weights.total(), Amount::raw(30));
    }
}
