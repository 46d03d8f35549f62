//! Configuration for the chaser and the index read path

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bounded wait when the chaser is caught up with the log (ms)
pub const DEFAULT_IDLE_WAIT_MS: u64 = 10;

/// Default enforced minimum delay between checkpoint flushes (ms)
pub const DEFAULT_MIN_FLUSH_DELAY_MS: u64 = 2;

/// Default capacity of the chaser notification channel
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Default number of colliding bucket entries scanned on the fast path
pub const DEFAULT_HASH_COLLISION_READ_LIMIT: usize = 32;

/// Configuration for the log chaser.
///
/// The chaser adapts its flush cadence to observed flush latency instead of
/// flushing after every record; `min_flush_delay_ms` puts a floor under the
/// computed delay so a fast device does not turn every record into a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaserConfig {
    /// Bounded wait on the flush signal when no record is available (ms)
    pub idle_wait_ms: u64,

    /// Enforced minimum delay between checkpoint flushes (ms)
    pub min_flush_delay_ms: u64,

    /// Capacity of the broadcast channel carrying chaser notifications
    pub notification_capacity: usize,
}

impl Default for ChaserConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: DEFAULT_IDLE_WAIT_MS,
            min_flush_delay_ms: DEFAULT_MIN_FLUSH_DELAY_MS,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl ChaserConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn min_flush_delay(&self) -> Duration {
        Duration::from_millis(self.min_flush_delay_ms)
    }
}

/// Configuration for the stream index read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// How many colliding entries of a hash bucket the fast path scans
    /// before falling back to an exhaustive scan. A latency ceiling only;
    /// read results are identical on both paths.
    pub hash_collision_read_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hash_collision_read_limit: DEFAULT_HASH_COLLISION_READ_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaser_defaults() {
        let config = ChaserConfig::default();
        assert_eq!(config.idle_wait(), Duration::from_millis(10));
        assert_eq!(config.min_flush_delay(), Duration::from_millis(2));
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }

    #[test]
    fn index_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.hash_collision_read_limit, DEFAULT_HASH_COLLISION_READ_LIMIT);
    }
}
