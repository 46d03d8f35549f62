//! Log chaser: tails the durable log and drives index commit
//!
//! Exactly one chaser runs per log, as an owned background task. Each
//! iteration reads the next record after the chaser's checkpoint,
//! classifies it, feeds committed prepares to the transaction aggregator,
//! hands completed transactions to the index committer, and publishes
//! commit notifications. When caught up it blocks on an instance-owned
//! flush signal with a bounded wait, so multiple logs (and tests) never
//! interfere through shared state.
//!
//! Any error escaping an iteration is fatal: the index would otherwise
//! silently diverge from the log. The chaser logs it, transitions to
//! `Faulted`, broadcasts a fault notification and surfaces the error from
//! the task join so the embedder can terminate the process.

pub mod transaction;

use crate::config::ChaserConfig;
use crate::epoch::EpochManager;
use crate::error::{EventlineError, Result};
use crate::index::committer::IndexCommitter;
use crate::log::reader::{SequentialLogReader, SequentialReadResult};
use crate::log::record::{CommitRecord, LogRecord, PrepareFlags, PrepareRecord, SystemRecordKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use transaction::TransactionAggregator;
use uuid::Uuid;

/// Chaser lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaserState {
    Idle,
    TailingCaughtUp,
    Busy,
    Flushing,
    Faulted,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ChaserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChaserState::Idle => write!(f, "idle"),
            ChaserState::TailingCaughtUp => write!(f, "caught up"),
            ChaserState::Busy => write!(f, "busy"),
            ChaserState::Flushing => write!(f, "flushing"),
            ChaserState::Faulted => write!(f, "faulted"),
            ChaserState::ShuttingDown => write!(f, "shutting down"),
            ChaserState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Published once per completed transaction.
#[derive(Debug, Clone)]
pub struct CommitChased {
    pub correlation_id: Uuid,

    /// Position of the record that completed the transaction
    pub log_position: u64,

    pub transaction_position: u64,

    /// First event number per participating stream, slot order
    pub first_event_numbers: Vec<i64>,

    /// Last event number per participating stream, slot order
    pub last_event_numbers: Vec<i64>,

    /// Stream slot per prepare; `None` for single-stream transactions
    pub event_stream_indexes: Option<Vec<usize>>,
}

/// Notifications the chaser broadcasts while tailing.
#[derive(Debug, Clone)]
pub enum ChaserNotification {
    /// A transaction finished and its prepares were handed to the committer
    CommitChased(CommitChased),

    /// An uncommitted prepare with begin/end/data flags was tailed;
    /// informational, no index mutation
    PrepareChased {
        log_position: u64,
        transaction_position: u64,
        flags: PrepareFlags,
    },

    /// End of log reached at a non-commit record after commits were seen;
    /// published once per such transition
    NonCommitRecordAtEof { log_position: u64 },

    /// The chaser hit a fatal inconsistency and stopped
    Faulted { detail: String },

    /// Cooperative shutdown completed
    Stopped,
}

/// Handle to a spawned chaser.
pub struct ChaserHandle {
    shutdown: watch::Sender<bool>,
    flush_signal: Arc<Notify>,
    notifications: broadcast::Sender<ChaserNotification>,
    state: watch::Receiver<ChaserState>,
    join: JoinHandle<Result<()>>,
}

impl ChaserHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ChaserNotification> {
        self.notifications.subscribe()
    }

    /// Current lifecycle state of the running chaser.
    pub fn state(&self) -> ChaserState {
        *self.state.borrow()
    }

    /// Wake the chaser out of its idle wait so it flushes promptly.
    pub fn request_flush(&self) {
        self.flush_signal.notify_waiters();
    }

    /// Request shutdown and wait for the loop to finish its iteration,
    /// flush, and close its reader.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| EventlineError::Io(std::io::Error::other(e)))?
    }
}

/// The background process tailing the durable log into the index.
pub struct Chaser<R: SequentialLogReader> {
    reader: R,
    committer: Arc<dyn IndexCommitter>,
    epochs: Arc<dyn EpochManager>,
    config: ChaserConfig,
    transaction: TransactionAggregator,
    state_tx: watch::Sender<ChaserState>,
    notifications: broadcast::Sender<ChaserNotification>,
    flush_signal: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    last_flush: Instant,
    measured_flush_delay: Duration,
    commit_seen_since_eof: bool,
}

impl<R: SequentialLogReader> Chaser<R> {
    pub fn new(
        reader: R,
        committer: Arc<dyn IndexCommitter>,
        epochs: Arc<dyn EpochManager>,
        config: ChaserConfig,
    ) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(ChaserState::Idle);
        let measured_flush_delay = config.min_flush_delay();
        Self {
            reader,
            committer,
            epochs,
            config,
            transaction: TransactionAggregator::new(),
            state_tx,
            notifications,
            flush_signal: Arc::new(Notify::new()),
            shutdown_tx,
            shutdown_rx,
            last_flush: Instant::now(),
            measured_flush_delay,
            commit_seen_since_eof: false,
        }
    }

    pub fn state(&self) -> ChaserState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ChaserState) {
        if *self.state_tx.borrow() != state {
            debug!(%state, "chaser state");
            self.state_tx.send_replace(state);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChaserNotification> {
        self.notifications.subscribe()
    }

    /// Run the chaser on its own task.
    pub fn spawn(self) -> ChaserHandle
    where
        R: 'static,
    {
        let shutdown = self.shutdown_tx.clone();
        let flush_signal = Arc::clone(&self.flush_signal);
        let notifications = self.notifications.clone();
        let state = self.state_tx.subscribe();
        let join = tokio::spawn(self.run());
        ChaserHandle {
            shutdown,
            flush_signal,
            notifications,
            state,
            join,
        }
    }

    /// The chaser loop. Returns when shutdown is requested; an `Err` means
    /// a fatal inconsistency and the index must not be trusted further.
    pub async fn run(mut self) -> Result<()> {
        self.committer.init(self.reader.checkpoint());
        info!(checkpoint = self.reader.checkpoint(), "chaser started");

        let outcome = self.tail_loop().await;
        match &outcome {
            Ok(()) => {
                self.set_state(ChaserState::Stopped);
                let _ = self.notifications.send(ChaserNotification::Stopped);
                info!("chaser stopped");
            }
            Err(e) => {
                self.set_state(ChaserState::Faulted);
                error!(error = %e, "chaser faulted; index construction cannot continue");
                let _ = self
                    .notifications
                    .send(ChaserNotification::Faulted { detail: e.to_string() });
            }
        }
        if let Err(e) = self.reader.close() {
            warn!(error = %e, "closing log reader failed");
        }
        outcome
    }

    async fn tail_loop(&mut self) -> Result<()> {
        loop {
            if *self.shutdown_rx.borrow() {
                self.set_state(ChaserState::ShuttingDown);
                debug!("shutdown requested");
                self.flush()?;
                return Ok(());
            }

            match self.reader.try_read_next()? {
                Some(next) => {
                    self.set_state(ChaserState::Busy);
                    self.process_record(next)?;
                    if self.flush_due() {
                        self.flush()?;
                    }
                }
                None => {
                    self.set_state(ChaserState::TailingCaughtUp);
                    self.flush()?;
                    self.set_state(ChaserState::Idle);
                    self.idle_wait().await;
                }
            }
        }
    }

    /// Bounded wait for a flush request, new-record timeout, or shutdown.
    /// The two awaits here are the chaser's only suspension points.
    async fn idle_wait(&mut self) {
        let signal = Arc::clone(&self.flush_signal);
        tokio::select! {
            _ = signal.notified() => {}
            _ = tokio::time::sleep(self.config.idle_wait()) => {}
            _ = self.shutdown_rx.changed() => {}
        }
    }

    fn process_record(&mut self, next: SequentialReadResult) -> Result<()> {
        let SequentialReadResult {
            record,
            post_position,
            eof,
        } = next;
        let log_position = record.position();

        let completed_commit = match record {
            LogRecord::Prepare(prepare) => self.process_prepare(prepare, post_position)?,
            LogRecord::Commit(commit) => {
                self.process_commit(commit, post_position)?;
                true
            }
            LogRecord::System(system) => {
                self.commit_pending(post_position)?;
                match system.kind {
                    SystemRecordKind::Epoch(epoch) => self.epochs.cache_epoch(&epoch),
                    SystemRecordKind::Other => {}
                }
                false
            }
            LogRecord::Partition { .. } | LogRecord::PartitionType { .. } => false,
        };

        if eof {
            if !completed_commit && self.commit_seen_since_eof {
                debug!(log_position, "end of log at a non-commit record after commits");
                let _ = self
                    .notifications
                    .send(ChaserNotification::NonCommitRecordAtEof { log_position });
            }
            self.commit_seen_since_eof = false;
        }
        Ok(())
    }

    /// Returns whether the prepare completed its transaction.
    fn process_prepare(&mut self, prepare: PrepareRecord, post_position: u64) -> Result<bool> {
        if self
            .transaction
            .position()
            .is_some_and(|open| open != prepare.transaction_position)
        {
            // A new transaction position makes the open aggregate stale.
            self.commit_pending(post_position)?;
        }

        if prepare.is_committed() {
            self.transaction.process(&prepare)?;
            if prepare.is_transaction_end() {
                let notification = CommitChased {
                    correlation_id: prepare.correlation_id,
                    log_position: prepare.log_position,
                    transaction_position: prepare.transaction_position,
                    first_event_numbers: self.transaction.first_event_numbers().to_vec(),
                    last_event_numbers: self.transaction.last_event_numbers().to_vec(),
                    event_stream_indexes: self
                        .transaction
                        .event_stream_indexes()
                        .map(<[usize]>::to_vec),
                };
                self.commit_pending(post_position)?;
                self.commit_seen_since_eof = true;
                let _ = self
                    .notifications
                    .send(ChaserNotification::CommitChased(notification));
                return Ok(true);
            }
        } else if prepare.flags.intersects(
            PrepareFlags::TRANSACTION_BEGIN | PrepareFlags::TRANSACTION_END | PrepareFlags::DATA,
        ) {
            let _ = self.notifications.send(ChaserNotification::PrepareChased {
                log_position: prepare.log_position,
                transaction_position: prepare.transaction_position,
                flags: prepare.flags,
            });
        }
        Ok(false)
    }

    fn process_commit(&mut self, commit: CommitRecord, post_position: u64) -> Result<()> {
        self.commit_pending(post_position)?;

        let last_event_number = self
            .committer
            .get_commit_last_event_number(&commit)
            .ok_or(EventlineError::InvalidCommit {
                transaction_position: commit.transaction_position,
            })?;
        self.committer.add_pending_commit(&commit, post_position)?;
        self.commit_seen_since_eof = true;

        // Explicit commits are always single-stream.
        let _ = self
            .notifications
            .send(ChaserNotification::CommitChased(CommitChased {
                correlation_id: commit.correlation_id,
                log_position: commit.log_position,
                transaction_position: commit.transaction_position,
                first_event_numbers: vec![commit.first_event_number],
                last_event_numbers: vec![last_event_number],
                event_stream_indexes: None,
            }));
        Ok(())
    }

    /// Hand the open aggregate's prepares to the committer and reset it.
    fn commit_pending(&mut self, post_position: u64) -> Result<()> {
        if self.transaction.position().is_none() {
            return Ok(());
        }
        if !self.transaction.is_empty() {
            self.committer
                .add_pending_prepares(self.transaction.prepares(), post_position)?;
        }
        self.transaction.clear();
        Ok(())
    }

    /// The computed flush delay is the previous flush's measured latency,
    /// floored at the configured minimum. Flushing unconditionally after
    /// every record would serialize throughput to flush latency.
    fn flush_due(&self) -> bool {
        self.last_flush.elapsed() >= self.measured_flush_delay
    }

    fn flush(&mut self) -> Result<()> {
        self.set_state(ChaserState::Flushing);
        let started = Instant::now();
        self.reader.flush()?;
        self.measured_flush_delay = started.elapsed().max(self.config.min_flush_delay());
        self.last_flush = Instant::now();
        Ok(())
    }
}
