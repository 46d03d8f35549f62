//! Record types for the transaction log
//!
//! The log is a sequence of tagged records. Prepares carry the events
//! themselves and belong to a transaction; an inline transaction closes with
//! a prepare flagged `TRANSACTION_END`, a legacy explicit transaction closes
//! with a separate commit record. System records carry epoch bookkeeping.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use uuid::Uuid;

/// Flag bits carried by a prepare record.
///
/// Modeled as a transparent `u16` so flag combinations compose with `|` and
/// serialize compactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrepareFlags(u16);

impl PrepareFlags {
    pub const NONE: Self = Self(0);
    /// The prepare carries event payload.
    pub const DATA: Self = Self(1 << 0);
    /// First prepare of its transaction.
    pub const TRANSACTION_BEGIN: Self = Self(1 << 1);
    /// Last prepare of its transaction (inline transactions only).
    pub const TRANSACTION_END: Self = Self(1 << 2);
    /// The prepare is already committed (inline transactions).
    pub const IS_COMMITTED: Self = Self(1 << 3);
    /// The prepare soft-deletes its stream.
    pub const STREAM_DELETE: Self = Self(1 << 4);

    /// All of `other`'s bits are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any of `other`'s bits are set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for PrepareFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PrepareFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A prepare record: one event's intent to be appended to a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRecord {
    /// Position of this record in the log
    pub log_position: u64,

    /// Position of the transaction this prepare belongs to
    /// (the position of the transaction's first prepare)
    pub transaction_position: u64,

    /// Name of the stream the event targets
    pub stream_id: String,

    /// Version of the stream this prepare expects; the event it carries
    /// becomes event number `expected_version + 1`
    pub expected_version: i64,

    /// Flag bits (data, begin/end, committed, stream delete)
    pub flags: PrepareFlags,

    /// Identity of the event
    pub event_id: Uuid,

    /// Correlation id of the append that produced this prepare
    pub correlation_id: Uuid,

    /// Event type tag
    pub event_type: String,

    /// Event payload
    pub data: Bytes,

    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl PrepareRecord {
    /// Build a prepare for the writer side. The log position is assigned on
    /// append; the event id and timestamp are stamped here.
    pub fn new(
        transaction_position: u64,
        stream_id: impl Into<String>,
        expected_version: i64,
        flags: PrepareFlags,
        event_type: impl Into<String>,
        data: Bytes,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            log_position: 0,
            transaction_position,
            stream_id: stream_id.into(),
            expected_version,
            flags,
            event_id: Uuid::new_v4(),
            correlation_id,
            event_type: event_type.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether this prepare occupies an event number (payload or tombstone).
    /// Control-only prepares open a transaction's stream slot but carry no
    /// event of their own.
    pub fn is_data_bearing(&self) -> bool {
        self.flags
            .intersects(PrepareFlags::DATA | PrepareFlags::STREAM_DELETE)
    }

    pub fn is_committed(&self) -> bool {
        self.flags.contains(PrepareFlags::IS_COMMITTED)
    }

    pub fn is_transaction_begin(&self) -> bool {
        self.flags.contains(PrepareFlags::TRANSACTION_BEGIN)
    }

    pub fn is_transaction_end(&self) -> bool {
        self.flags.contains(PrepareFlags::TRANSACTION_END)
    }
}

/// A commit record closing an explicit (non-inline) transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Position of this record in the log
    pub log_position: u64,

    /// Position of the transaction being committed
    pub transaction_position: u64,

    /// Event number assigned to the transaction's first data-bearing prepare
    pub first_event_number: i64,

    /// Correlation id of the append that produced the transaction
    pub correlation_id: Uuid,

    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl CommitRecord {
    pub fn new(transaction_position: u64, first_event_number: i64, correlation_id: Uuid) -> Self {
        Self {
            log_position: 0,
            transaction_position,
            first_event_number,
            correlation_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A leadership epoch marker written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Monotonically increasing epoch number
    pub number: u64,

    /// Identity of the epoch
    pub id: Uuid,

    /// Log position the epoch was written at
    pub position: u64,
}

/// Payload of a system record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemRecordKind {
    /// A leadership epoch to be cached
    Epoch(EpochRecord),
    /// Any other system bookkeeping; advances position only
    Other,
}

/// A system record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRecord {
    /// Position of this record in the log
    pub log_position: u64,

    pub kind: SystemRecordKind,
}

/// A single record in the transaction log.
///
/// A closed set: the chaser matches exhaustively, so a new variant is a
/// compile error at every dispatch site rather than a runtime surprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    Prepare(PrepareRecord),
    Commit(CommitRecord),
    System(SystemRecord),
    /// Partition bookkeeping; advances position only
    Partition { log_position: u64 },
    /// Partition type bookkeeping; advances position only
    PartitionType { log_position: u64 },
}

impl LogRecord {
    /// Log position of the record regardless of variant.
    pub fn position(&self) -> u64 {
        match self {
            LogRecord::Prepare(p) => p.log_position,
            LogRecord::Commit(c) => c.log_position,
            LogRecord::System(s) => s.log_position,
            LogRecord::Partition { log_position } => *log_position,
            LogRecord::PartitionType { log_position } => *log_position,
        }
    }

    pub(crate) fn set_position(&mut self, position: u64) {
        match self {
            LogRecord::Prepare(p) => p.log_position = position,
            LogRecord::Commit(c) => c.log_position = position,
            LogRecord::System(s) => {
                s.log_position = position;
                if let SystemRecordKind::Epoch(epoch) = &mut s.kind {
                    epoch.position = position;
                }
            }
            LogRecord::Partition { log_position } => *log_position = position,
            LogRecord::PartitionType { log_position } => *log_position = position,
        }
    }
}
