//! Sequential log reader abstraction and in-memory log
//!
//! The chaser tails the durable log through [`SequentialLogReader`]; chunked
//! file storage lives behind the same trait in a full deployment. The
//! [`InMemoryLog`] here is the reference implementation: it backs the test
//! suite and embedded use, and its reader exhibits the same caught-up and
//! end-of-file behavior a chunk reader does.

use crate::error::{EventlineError, Result};
use crate::log::record::{LogRecord, PrepareRecord};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// One successfully read record plus tailing metadata.
#[derive(Debug, Clone)]
pub struct SequentialReadResult {
    pub record: LogRecord,

    /// Position immediately after the record; becomes the reader's
    /// checkpoint once flushed
    pub post_position: u64,

    /// The record was the last one durable at read time
    pub eof: bool,
}

/// Sequential, checkpointed access to the durable log.
///
/// `try_read_next` returning `Ok(None)` means "nothing durable yet" and is
/// not an error; it drives the chaser's idle branch.
pub trait SequentialLogReader: Send {
    fn try_read_next(&mut self) -> Result<Option<SequentialReadResult>>;

    /// Durably record how far this reader has progressed.
    fn flush(&mut self) -> Result<()>;

    /// Release the reader; subsequent reads fail.
    fn close(&mut self) -> Result<()>;

    /// Last flushed position.
    fn checkpoint(&self) -> u64;
}

#[derive(Default)]
struct LogInner {
    records: Vec<LogRecord>,
}

/// An append-only in-memory transaction log.
///
/// Positions are record ordinals: the record appended at position `p` has
/// post-position `p + 1`. Cloning shares the underlying log.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    inner: Arc<RwLock<LogInner>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, assigning its log position. Returns the position.
    pub fn append(&self, mut record: LogRecord) -> u64 {
        let mut inner = self.inner.write();
        let position = inner.records.len() as u64;
        record.set_position(position);
        inner.records.push(record);
        position
    }

    /// All prepares belonging to the transaction at `transaction_position`,
    /// in log order. Used by the index committer to resolve explicit commits.
    pub fn prepares_for_transaction(&self, transaction_position: u64) -> Vec<PrepareRecord> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter_map(|record| match record {
                LogRecord::Prepare(p) if p.transaction_position == transaction_position => {
                    Some(p.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// A sequential reader starting at position 0 with a fresh checkpoint.
    pub fn reader(&self) -> InMemoryLogReader {
        InMemoryLogReader {
            inner: Arc::clone(&self.inner),
            next: 0,
            flushed: 0,
            open: true,
        }
    }
}

/// Sequential reader over an [`InMemoryLog`].
pub struct InMemoryLogReader {
    inner: Arc<RwLock<LogInner>>,
    next: u64,
    flushed: u64,
    open: bool,
}

impl SequentialLogReader for InMemoryLogReader {
    fn try_read_next(&mut self) -> Result<Option<SequentialReadResult>> {
        if !self.open {
            return Err(EventlineError::LogReader("reader is closed".to_string()));
        }
        let inner = self.inner.read();
        let index = self.next as usize;
        if index >= inner.records.len() {
            return Ok(None);
        }
        let record = inner.records[index].clone();
        let post_position = self.next + 1;
        let eof = index + 1 == inner.records.len();
        self.next = post_position;
        Ok(Some(SequentialReadResult {
            record,
            post_position,
            eof,
        }))
    }

    fn flush(&mut self) -> Result<()> {
        if !self.open {
            return Err(EventlineError::LogReader("reader is closed".to_string()));
        }
        if self.flushed != self.next {
            debug!(from = self.flushed, to = self.next, "flushing reader checkpoint");
            self.flushed = self.next;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn checkpoint(&self) -> u64 {
        self.flushed
    }
}
