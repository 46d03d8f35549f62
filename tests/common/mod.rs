//! Shared fixtures for integration tests
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use bytes::Bytes;
use eventline::{
    CachingEpochManager, Chaser, ChaserConfig, ChaserHandle, ChaserNotification, CommitChased,
    EpochManager, IndexConfig, InMemoryLog, InMemoryLogReader, LogRecord, PrepareFlags,
    PrepareRecord,
    ReadIndex, StreamHasher, StreamIndex, StreamIndexCommitter,
};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Route chaser and index logs through the test writer, honoring
/// `RUST_LOG`. Safe to call from every test; only the first call installs
/// the subscriber.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Forces every stream name into one bucket, the worst collision case.
pub struct SingleBucketHasher;

impl StreamHasher for SingleBucketHasher {
    fn hash(&self, _stream: &str) -> u32 {
        0
    }
}

pub struct Harness {
    pub log: InMemoryLog,
    pub index: Arc<StreamIndex>,
    pub epochs: Arc<CachingEpochManager>,
    pub reads: ReadIndex,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_index(StreamIndex::new(&IndexConfig::default()))
    }

    /// Harness where every stream collides in a single hash bucket.
    pub fn colliding() -> Self {
        Self::with_index(StreamIndex::with_hasher(
            Box::new(SingleBucketHasher),
            &IndexConfig::default(),
        ))
    }

    fn with_index(index: StreamIndex) -> Self {
        init_tracing();
        let index = Arc::new(index);
        Self {
            log: InMemoryLog::new(),
            index: Arc::clone(&index),
            epochs: Arc::new(CachingEpochManager::new()),
            reads: ReadIndex::new(index),
        }
    }

    pub fn chaser(&self) -> Chaser<InMemoryLogReader> {
        let committer = Arc::new(StreamIndexCommitter::new(
            Arc::clone(&self.index),
            Arc::new(self.log.clone()),
        ));
        Chaser::new(
            self.log.reader(),
            committer,
            self.epochs.clone() as Arc<dyn EpochManager>,
            ChaserConfig::default(),
        )
    }

    pub fn start(&self) -> (ChaserHandle, broadcast::Receiver<ChaserNotification>) {
        let chaser = self.chaser();
        let rx = chaser.subscribe();
        (chaser.spawn(), rx)
    }

    /// Append one inline transaction writing `payloads` to a single stream,
    /// starting at `expected_version + 1`.
    pub fn append_events(&self, stream: &str, expected_version: i64, payloads: &[&str]) -> Uuid {
        let writes: Vec<(String, i64, Bytes)> = payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| {
                (
                    stream.to_string(),
                    expected_version + i as i64,
                    Bytes::from(payload.to_string()),
                )
            })
            .collect();
        self.append_transaction(&writes)
    }

    /// Append one inline transaction from `(stream, expected_version,
    /// payload)` writes in order. Returns the correlation id.
    pub fn append_transaction(&self, writes: &[(String, i64, Bytes)]) -> Uuid {
        assert!(!writes.is_empty());
        let correlation_id = Uuid::new_v4();
        let transaction_position = self.log.len() as u64;
        let last = writes.len() - 1;
        for (i, (stream, expected_version, payload)) in writes.iter().enumerate() {
            let mut flags = PrepareFlags::DATA | PrepareFlags::IS_COMMITTED;
            if i == 0 {
                flags |= PrepareFlags::TRANSACTION_BEGIN;
            }
            if i == last {
                flags |= PrepareFlags::TRANSACTION_END;
            }
            self.log.append(LogRecord::Prepare(PrepareRecord::new(
                transaction_position,
                stream.clone(),
                *expected_version,
                flags,
                "test-event",
                payload.clone(),
                correlation_id,
            )));
        }
        correlation_id
    }
}

/// Receive `count` commit notifications, ignoring other kinds.
pub async fn wait_for_commits(
    rx: &mut broadcast::Receiver<ChaserNotification>,
    count: usize,
) -> Vec<CommitChased> {
    let mut commits = Vec::new();
    while commits.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(ChaserNotification::CommitChased(commit))) => commits.push(commit),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("notification channel closed: {e}"),
            Err(_) => panic!(
                "timed out waiting for commit notifications ({} of {count} seen)",
                commits.len()
            ),
        }
    }
    commits
}
