//! Index commit seam between the chaser and the stream index
//!
//! The chaser decides *what* gets committed and *when*; an
//! [`IndexCommitter`] performs the mutation. [`StreamIndexCommitter`] is the
//! in-memory implementation: it applies a whole transaction's data-bearing
//! prepares to the [`StreamIndex`] atomically, and resolves explicit commit
//! records by reading the transaction's prepares back from the log.

use crate::error::{EventlineError, Result};
use crate::index::stream_index::{EventRecord, IndexMutation, StreamIndex};
use crate::log::reader::InMemoryLog;
use crate::log::record::{CommitRecord, PrepareFlags, PrepareRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Source of a transaction's prepares, used to resolve explicit commits.
pub trait TransactionPrepareSource: Send + Sync {
    fn prepares_for_transaction(&self, transaction_position: u64) -> Vec<PrepareRecord>;
}

impl TransactionPrepareSource for InMemoryLog {
    fn prepares_for_transaction(&self, transaction_position: u64) -> Vec<PrepareRecord> {
        InMemoryLog::prepares_for_transaction(self, transaction_position)
    }
}

/// Accepts pending prepares and commits from the chaser and mutates the
/// persisted index. Driven by exactly one chaser; implementations may rely
/// on single-writer discipline for mutation.
pub trait IndexCommitter: Send + Sync {
    /// Called once before tailing starts, with the chaser's checkpoint.
    fn init(&self, checkpoint_position: u64);

    /// Commit the data-bearing prepares of one completed inline
    /// transaction. `post_position` is the position after the record that
    /// completed it.
    fn add_pending_prepares(&self, prepares: &[PrepareRecord], post_position: u64) -> Result<()>;

    /// Commit an explicit transaction.
    fn add_pending_commit(&self, commit: &CommitRecord, post_position: u64) -> Result<()>;

    /// Last event number the commit assigns, `None` when the commit cannot
    /// be resolved against any prepares (corrupt log).
    fn get_commit_last_event_number(&self, commit: &CommitRecord) -> Option<i64>;
}

/// In-memory [`IndexCommitter`] over a [`StreamIndex`].
pub struct StreamIndexCommitter {
    index: Arc<StreamIndex>,
    source: Arc<dyn TransactionPrepareSource>,
    committed_position: AtomicU64,
}

impl StreamIndexCommitter {
    pub fn new(index: Arc<StreamIndex>, source: Arc<dyn TransactionPrepareSource>) -> Self {
        Self {
            index,
            source,
            committed_position: AtomicU64::new(0),
        }
    }

    /// Position up to which the index reflects the log.
    pub fn committed_position(&self) -> u64 {
        self.committed_position.load(Ordering::Acquire)
    }

    fn mutation_for(prepare: &PrepareRecord, event_number: i64) -> IndexMutation {
        if prepare.flags.contains(PrepareFlags::STREAM_DELETE) {
            IndexMutation::SoftDelete {
                stream_id: prepare.stream_id.clone(),
                event_number,
            }
        } else {
            IndexMutation::Append(EventRecord {
                stream_id: prepare.stream_id.clone(),
                event_number,
                log_position: prepare.log_position,
                event_id: prepare.event_id,
                event_type: prepare.event_type.clone(),
                data: prepare.data.clone(),
                timestamp: prepare.timestamp,
            })
        }
    }
}

impl IndexCommitter for StreamIndexCommitter {
    fn init(&self, checkpoint_position: u64) {
        self.committed_position
            .store(checkpoint_position, Ordering::Release);
        info!(checkpoint = checkpoint_position, "index committer initialized");
    }

    fn add_pending_prepares(&self, prepares: &[PrepareRecord], post_position: u64) -> Result<()> {
        // Inline transactions: each prepare already carries the expected
        // version its event number derives from.
        let mutations = prepares
            .iter()
            .map(|p| Self::mutation_for(p, p.expected_version + 1))
            .collect();
        self.index.apply(mutations);
        self.committed_position.store(post_position, Ordering::Release);
        debug!(
            prepares = prepares.len(),
            post_position, "committed inline transaction"
        );
        Ok(())
    }

    fn add_pending_commit(&self, commit: &CommitRecord, post_position: u64) -> Result<()> {
        let prepares = self.source.prepares_for_transaction(commit.transaction_position);
        if prepares.is_empty() {
            return Err(EventlineError::InvalidCommit {
                transaction_position: commit.transaction_position,
            });
        }
        let mut event_number = commit.first_event_number;
        let mut mutations = Vec::new();
        for prepare in prepares.iter().filter(|p| p.is_data_bearing()) {
            mutations.push(Self::mutation_for(prepare, event_number));
            event_number += 1;
        }
        self.index.apply(mutations);
        self.committed_position.store(post_position, Ordering::Release);
        debug!(
            transaction_position = commit.transaction_position,
            first_event_number = commit.first_event_number,
            post_position,
            "committed explicit transaction"
        );
        Ok(())
    }

    fn get_commit_last_event_number(&self, commit: &CommitRecord) -> Option<i64> {
        let prepares = self.source.prepares_for_transaction(commit.transaction_position);
        let data_bearing = prepares.iter().filter(|p| p.is_data_bearing()).count();
        if data_bearing == 0 {
            return None;
        }
        Some(commit.first_event_number + data_bearing as i64 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::log::record::LogRecord;
    use bytes::Bytes;
    use uuid::Uuid;

    fn prepare(transaction_position: u64, stream: &str, expected_version: i64, flags: PrepareFlags) -> PrepareRecord {
        PrepareRecord {
            log_position: 0,
            transaction_position,
            stream_id: stream.to_string(),
            expected_version,
            flags,
            event_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            event_type: "test-event".to_string(),
            data: Bytes::from_static(b"payload"),
            timestamp: 0,
        }
    }

    fn committer() -> (StreamIndexCommitter, Arc<StreamIndex>, InMemoryLog) {
        let index = Arc::new(StreamIndex::new(&IndexConfig::default()));
        let log = InMemoryLog::new();
        let committer = StreamIndexCommitter::new(Arc::clone(&index), Arc::new(log.clone()));
        (committer, index, log)
    }

    #[test]
    fn inline_prepares_index_at_expected_version_plus_one() {
        let (committer, index, _log) = committer();
        let prepares = vec![
            prepare(10, "s", -1, PrepareFlags::DATA | PrepareFlags::IS_COMMITTED),
            prepare(10, "s", 0, PrepareFlags::DATA | PrepareFlags::IS_COMMITTED),
        ];
        committer.add_pending_prepares(&prepares, 12).unwrap();

        assert_eq!(index.last_event_number("s"), 1);
        assert_eq!(committer.committed_position(), 12);
    }

    #[test]
    fn explicit_commit_numbers_from_first_event_number() {
        let (committer, index, log) = committer();
        let transaction_position = log.append(LogRecord::Prepare(prepare(
            0,
            "legacy",
            2,
            PrepareFlags::DATA | PrepareFlags::TRANSACTION_BEGIN,
        )));
        log.append(LogRecord::Prepare(prepare(
            transaction_position,
            "legacy",
            2,
            PrepareFlags::DATA | PrepareFlags::TRANSACTION_END,
        )));

        let commit = CommitRecord {
            log_position: 2,
            transaction_position,
            first_event_number: 3,
            correlation_id: Uuid::new_v4(),
            timestamp: 0,
        };
        assert_eq!(committer.get_commit_last_event_number(&commit), Some(4));
        committer.add_pending_commit(&commit, 3).unwrap();
        assert_eq!(index.last_event_number("legacy"), 4);
    }

    #[test]
    fn unresolvable_commit_is_invalid() {
        let (committer, _index, _log) = committer();
        let commit = CommitRecord {
            log_position: 9,
            transaction_position: 7,
            first_event_number: 0,
            correlation_id: Uuid::new_v4(),
            timestamp: 0,
        };
        assert_eq!(committer.get_commit_last_event_number(&commit), None);
        assert!(matches!(
            committer.add_pending_commit(&commit, 10),
            Err(EventlineError::InvalidCommit { transaction_position: 7 })
        ));
    }

    #[test]
    fn stream_delete_prepare_soft_deletes() {
        let (committer, index, _log) = committer();
        committer
            .add_pending_prepares(
                &[prepare(0, "s", -1, PrepareFlags::DATA | PrepareFlags::IS_COMMITTED)],
                1,
            )
            .unwrap();
        committer
            .add_pending_prepares(
                &[prepare(1, "s", 0, PrepareFlags::STREAM_DELETE | PrepareFlags::IS_COMMITTED)],
                2,
            )
            .unwrap();

        // entry stays, flagged; last event number advanced by the tombstone
        assert_eq!(index.last_event_number("s"), 1);
    }
}
