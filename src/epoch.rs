//! Leadership epoch cache
//!
//! The chaser hands every epoch record it tails to an [`EpochManager`].
//! Caching must be idempotent: the same epoch is re-encountered across
//! follower/leader role transitions and must not corrupt epoch history.

use crate::log::record::EpochRecord;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Consumer of epoch records encountered while tailing.
pub trait EpochManager: Send + Sync {
    /// Cache an epoch. Idempotent.
    fn cache_epoch(&self, epoch: &EpochRecord);
}

/// In-memory epoch history keyed by epoch number.
#[derive(Default)]
pub struct CachingEpochManager {
    epochs: RwLock<BTreeMap<u64, EpochRecord>>,
}

impl CachingEpochManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_epoch(&self) -> Option<EpochRecord> {
        self.epochs.read().values().next_back().cloned()
    }

    pub fn epoch(&self, number: u64) -> Option<EpochRecord> {
        self.epochs.read().get(&number).cloned()
    }

    pub fn len(&self) -> usize {
        self.epochs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.read().is_empty()
    }
}

impl EpochManager for CachingEpochManager {
    fn cache_epoch(&self, epoch: &EpochRecord) {
        let mut epochs = self.epochs.write();
        match epochs.get(&epoch.number) {
            Some(existing) if existing.id == epoch.id => {
                debug!(number = epoch.number, "epoch already cached");
            }
            Some(existing) => {
                // Conflicting epoch at the same number: keep the first one
                // seen in log order, it is the durable record.
                warn!(
                    number = epoch.number,
                    cached = %existing.id,
                    incoming = %epoch.id,
                    "conflicting epoch record ignored"
                );
            }
            None => {
                info!(number = epoch.number, id = %epoch.id, position = epoch.position, "epoch cached");
                epochs.insert(epoch.number, epoch.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn epoch(number: u64) -> EpochRecord {
        EpochRecord {
            number,
            id: Uuid::new_v4(),
            position: number * 10,
        }
    }

    #[test]
    fn caches_in_number_order() {
        let manager = CachingEpochManager::new();
        manager.cache_epoch(&epoch(2));
        manager.cache_epoch(&epoch(1));
        manager.cache_epoch(&epoch(3));

        assert_eq!(manager.len(), 3);
        assert_eq!(manager.last_epoch().map(|e| e.number), Some(3));
    }

    #[test]
    fn caching_same_epoch_twice_is_a_noop() {
        let manager = CachingEpochManager::new();
        let record = epoch(5);
        manager.cache_epoch(&record);
        manager.cache_epoch(&record);

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.epoch(5), Some(record));
    }

    #[test]
    fn conflicting_epoch_keeps_first_seen() {
        let manager = CachingEpochManager::new();
        let first = epoch(5);
        let conflicting = epoch(5);
        manager.cache_epoch(&first);
        manager.cache_epoch(&conflicting);

        assert_eq!(manager.epoch(5), Some(first));
    }
}
