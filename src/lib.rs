#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Eventline
//!
//! Eventline is the storage core of a log-structured event database: an
//! append-only transaction log tailed by a background chaser that turns raw
//! log records into a committed, queryable index, combined with a
//! hash-bucketed stream index that stays correct under hash collisions
//! between distinct stream names.
//!
//! ## Features
//!
//! - **Exactly-once commit**: one chaser per log groups a transaction's
//!   prepares and hands them to the index committer atomically
//! - **Inline and explicit transactions**: prepares carrying begin/end
//!   flags, or legacy transactions closed by a separate commit record
//! - **Collision-safe reads**: stream names hash to non-unique buckets;
//!   point and range reads disambiguate by exact name, never by hash alone
//! - **Typed read contract**: `NoStream` vs `NotFound` vs `Success` with an
//!   empty range vs `StreamDeleted` vs `Expired`, never collapsed
//! - **Adaptive flush cadence**: checkpoint flushes track measured flush
//!   latency instead of running after every record
//!
//! ## Architecture
//!
//! Writers append [`log::record::LogRecord`]s to the durable log. The
//! [`chaser::Chaser`] tails it sequentially, aggregates each transaction's
//! prepares in a [`chaser::transaction::TransactionAggregator`], hands
//! completed transactions to an [`index::committer::IndexCommitter`], and
//! broadcasts [`chaser::ChaserNotification`]s. Reader workers query the
//! committed index through [`index::read_index::ReadIndex`], which resolves
//! hash collisions per call against the
//! [`index::stream_index::StreamIndex`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use eventline::{
//!     CachingEpochManager, Chaser, ChaserConfig, IndexConfig, InMemoryLog,
//!     ReadIndex, StreamIndex, StreamIndexCommitter,
//! };
//!
//! # async fn demo() -> eventline::Result<()> {
//! let log = InMemoryLog::new();
//! let index = Arc::new(StreamIndex::new(&IndexConfig::default()));
//! let committer = Arc::new(StreamIndexCommitter::new(
//!     Arc::clone(&index),
//!     Arc::new(log.clone()),
//! ));
//! let chaser = Chaser::new(
//!     log.reader(),
//!     committer,
//!     Arc::new(CachingEpochManager::new()),
//!     ChaserConfig::default(),
//! );
//! let handle = chaser.spawn();
//!
//! let reads = ReadIndex::new(index);
//! let last = reads.get_stream_last_event_number("orders");
//! assert_eq!(last, -1);
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod chaser;
pub mod config;
pub mod epoch;
pub mod error;
pub mod index;
pub mod log;

pub use chaser::transaction::TransactionAggregator;
pub use chaser::{Chaser, ChaserHandle, ChaserNotification, ChaserState, CommitChased};
pub use config::{ChaserConfig, IndexConfig};
pub use epoch::{CachingEpochManager, EpochManager};
pub use error::{EventlineError, Result};
pub use index::committer::{IndexCommitter, StreamIndexCommitter, TransactionPrepareSource};
pub use index::read_index::{ReadEventResult, ReadIndex, ReadStreamResult, ReadStreamStatus};
pub use index::stream_index::{
    Crc32StreamHasher, EventRecord, IndexMutation, StreamHasher, StreamIndex,
};
pub use log::reader::{InMemoryLog, InMemoryLogReader, SequentialLogReader, SequentialReadResult};
pub use log::record::{
    CommitRecord, EpochRecord, LogRecord, PrepareFlags, PrepareRecord, SystemRecord,
    SystemRecordKind,
};
