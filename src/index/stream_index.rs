//! Hash-bucketed stream index with collision resolution
//!
//! Stream names map to 32-bit hash buckets, and the hash is expressly not
//! collision-free: a bucket may hold several distinct streams. Every bucket
//! entry therefore carries its exact stream name, and lookups never
//! short-circuit on hash equality alone. `hash_collision_read_limit` caps
//! how many colliding entries the fast path scans before an exhaustive
//! fallback; it shapes latency, never answers.
//!
//! Mutation happens through [`StreamIndex::apply`] under a single write
//! lock per transaction, so concurrent readers never observe a partially
//! committed transaction.

use crate::config::IndexConfig;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

/// Maps a stream name to its (non-unique) numeric bucket.
pub trait StreamHasher: Send + Sync {
    fn hash(&self, stream: &str) -> u32;
}

/// Default stream-name hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32StreamHasher;

impl StreamHasher for Crc32StreamHasher {
    fn hash(&self, stream: &str) -> u32 {
        crc32fast::hash(stream.as_bytes())
    }
}

/// A committed event as served by the read path.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub stream_id: String,
    pub event_number: i64,
    pub log_position: u64,
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Bytes,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Active,
    SoftDeleted,
}

#[derive(Debug)]
struct StreamEntry {
    name: String,
    state: StreamState,
    last_event_number: i64,
    events: BTreeMap<i64, EventRecord>,
}

impl StreamEntry {
    fn new(name: String) -> Self {
        Self {
            name,
            state: StreamState::Active,
            last_event_number: -1,
            events: BTreeMap::new(),
        }
    }
}

/// A single index mutation; a committed transaction is a batch of these
/// applied atomically.
#[derive(Debug, Clone)]
pub enum IndexMutation {
    Append(EventRecord),
    /// Flag the stream deleted; the entry stays (soft delete).
    SoftDelete { stream_id: String, event_number: i64 },
    /// Remove the entry outright (tombstone); the name reads as never
    /// written afterwards.
    Purge { stream_id: String },
}

/// Outcome of resolving a stream name inside its hash bucket.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EntryRead<T> {
    /// No entry for this exact name, however populated the bucket is.
    NoEntry,
    /// The stream was soft-deleted.
    Deleted,
    Found(T),
}

/// The hash-bucketed committed-stream index.
pub struct StreamIndex {
    hasher: Box<dyn StreamHasher>,
    collision_read_limit: usize,
    buckets: RwLock<HashMap<u32, Vec<StreamEntry>>>,
}

impl StreamIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self::with_hasher(Box::new(Crc32StreamHasher), config)
    }

    pub fn with_hasher(hasher: Box<dyn StreamHasher>, config: &IndexConfig) -> Self {
        Self {
            hasher,
            collision_read_limit: config.hash_collision_read_limit.max(1),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn hash_of(&self, stream: &str) -> u32 {
        self.hasher.hash(stream)
    }

    /// Apply one committed transaction's mutations atomically.
    pub fn apply(&self, mutations: Vec<IndexMutation>) {
        let mut buckets = self.buckets.write();
        for mutation in mutations {
            match mutation {
                IndexMutation::Append(record) => {
                    let hash = self.hasher.hash(&record.stream_id);
                    let bucket = buckets.entry(hash).or_default();
                    let slot = match bucket.iter().position(|e| e.name == record.stream_id) {
                        Some(slot) => slot,
                        None => {
                            bucket.push(StreamEntry::new(record.stream_id.clone()));
                            bucket.len() - 1
                        }
                    };
                    let entry = &mut bucket[slot];
                    entry.last_event_number = entry.last_event_number.max(record.event_number);
                    entry.events.insert(record.event_number, record);
                }
                IndexMutation::SoftDelete { stream_id, event_number } => {
                    let hash = self.hasher.hash(&stream_id);
                    let bucket = buckets.entry(hash).or_default();
                    let slot = match bucket.iter().position(|e| e.name == stream_id) {
                        Some(slot) => slot,
                        None => {
                            bucket.push(StreamEntry::new(stream_id.clone()));
                            bucket.len() - 1
                        }
                    };
                    let entry = &mut bucket[slot];
                    entry.state = StreamState::SoftDeleted;
                    entry.last_event_number = entry.last_event_number.max(event_number);
                    info!(stream = %stream_id, "stream soft-deleted");
                }
                IndexMutation::Purge { stream_id } => {
                    let hash = self.hasher.hash(&stream_id);
                    if let Some(bucket) = buckets.get_mut(&hash) {
                        let before = bucket.len();
                        bucket.retain(|e| e.name != stream_id);
                        if bucket.len() != before {
                            info!(stream = %stream_id, "stream purged");
                        }
                        if bucket.is_empty() {
                            buckets.remove(&hash);
                        }
                    }
                }
            }
        }
    }

    /// Highest committed event number for the exact stream name, `-1` if it
    /// was never written. Deletion state is reported separately via the
    /// read operations.
    pub fn last_event_number(&self, stream: &str) -> i64 {
        let buckets = self.buckets.read();
        match self.find(&buckets, stream) {
            Some(entry) => entry.last_event_number,
            None => -1,
        }
    }

    pub(crate) fn read_last_event_number(&self, stream: &str) -> EntryRead<i64> {
        let buckets = self.buckets.read();
        self.resolve(&buckets, stream, |entry| entry.last_event_number)
    }

    /// `event_number == -1` reads the last event. `Found(None)` means the
    /// stream exists but never wrote this event number.
    pub(crate) fn read_event(&self, stream: &str, event_number: i64) -> EntryRead<Option<EventRecord>> {
        let buckets = self.buckets.read();
        self.resolve(&buckets, stream, |entry| {
            let number = if event_number == -1 {
                entry.last_event_number
            } else {
                event_number
            };
            entry.events.get(&number).cloned()
        })
    }

    pub(crate) fn read_forward(
        &self,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> EntryRead<(Vec<EventRecord>, i64)> {
        let buckets = self.buckets.read();
        self.resolve(&buckets, stream, |entry| {
            let events = entry
                .events
                .range(from_event_number..)
                .take(max_count)
                .map(|(_, record)| record.clone())
                .collect();
            (events, entry.last_event_number)
        })
    }

    /// `from_event_number == -1` starts from the last event.
    pub(crate) fn read_backward(
        &self,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> EntryRead<(Vec<EventRecord>, i64)> {
        let buckets = self.buckets.read();
        self.resolve(&buckets, stream, |entry| {
            let start = if from_event_number == -1 {
                entry.last_event_number
            } else {
                from_event_number
            };
            let events = entry
                .events
                .range(..=start)
                .rev()
                .take(max_count)
                .map(|(_, record)| record.clone())
                .collect();
            (events, entry.last_event_number)
        })
    }

    /// Number of distinct streams sharing this stream's bucket.
    pub fn collision_count(&self, stream: &str) -> usize {
        let buckets = self.buckets.read();
        buckets
            .get(&self.hasher.hash(stream))
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    fn resolve<T>(
        &self,
        buckets: &HashMap<u32, Vec<StreamEntry>>,
        stream: &str,
        read: impl FnOnce(&StreamEntry) -> T,
    ) -> EntryRead<T> {
        match self.find(buckets, stream) {
            None => EntryRead::NoEntry,
            Some(entry) if entry.state == StreamState::SoftDeleted => EntryRead::Deleted,
            Some(entry) => EntryRead::Found(read(entry)),
        }
    }

    /// Walk the bucket comparing exact names: at most
    /// `collision_read_limit` entries on the fast path, then the remainder
    /// exhaustively.
    fn find<'a>(
        &self,
        buckets: &'a HashMap<u32, Vec<StreamEntry>>,
        stream: &str,
    ) -> Option<&'a StreamEntry> {
        let bucket = buckets.get(&self.hasher.hash(stream))?;
        let fast = bucket.len().min(self.collision_read_limit);
        if let Some(entry) = bucket[..fast].iter().find(|e| e.name == stream) {
            return Some(entry);
        }
        if bucket.len() > fast {
            debug!(
                stream,
                colliding = bucket.len(),
                limit = self.collision_read_limit,
                "collision scan limit exceeded, resolving exhaustively"
            );
            return bucket[fast..].iter().find(|e| e.name == stream);
        }
        None
    }
}
