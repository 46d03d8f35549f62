//! Read façade over the committed stream index
//!
//! `ReadIndex` is what reader workers call. It owns the result-code
//! contract: `NoStream` (the exact name was never written, whatever its
//! hash bucket holds), `NotFound` (the stream exists, this event does not),
//! `Success` with an empty range (reading past the end of an existing
//! stream), and `StreamDeleted`. Collapsing any of these would break
//! clients, so each operation distinguishes them explicitly.
//!
//! Reads are safe to issue from many workers concurrently with the chaser's
//! index mutation; each read observes a fully committed snapshot.
//!
//! The `_until` variants take a caller-supplied deadline and return
//! `Expired` when it has passed. Expiry is a normal outcome, logged at
//! debug level only.

use crate::index::stream_index::{EntryRead, EventRecord, StreamIndex};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Result of a point read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadEventResult {
    Success(EventRecord),
    /// The stream exists but never wrote this event number.
    NotFound,
    /// The exact stream name has no committed events at all.
    NoStream,
    StreamDeleted,
    /// The caller's deadline passed before the read ran.
    Expired,
    Error(String),
}

/// Status of a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStreamStatus {
    Success,
    NoStream,
    StreamDeleted,
    Expired,
    Error(String),
}

/// Result of a range read. `events` is empty for every non-`Success`
/// status, and may be empty on `Success` when the requested range lies
/// beyond the end of an existing stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadStreamResult {
    pub status: ReadStreamStatus,
    pub events: Vec<EventRecord>,

    /// Where the next read in the same direction should start
    pub next_event_number: i64,

    /// Last committed event number of the stream at read time
    pub last_event_number: i64,

    /// No further events in the read direction
    pub is_end_of_stream: bool,
}

impl ReadStreamResult {
    fn empty(status: ReadStreamStatus) -> Self {
        Self {
            status,
            events: Vec::new(),
            next_event_number: -1,
            last_event_number: -1,
            is_end_of_stream: true,
        }
    }
}

/// Concurrent read orchestration over a [`StreamIndex`].
#[derive(Clone)]
pub struct ReadIndex {
    index: Arc<StreamIndex>,
}

impl ReadIndex {
    pub fn new(index: Arc<StreamIndex>) -> Self {
        Self { index }
    }

    /// Highest committed event number of the exact stream name, `-1` when
    /// it was never written — including when its hash bucket is populated
    /// solely by colliding names.
    pub fn get_stream_last_event_number(&self, stream: &str) -> i64 {
        self.index.last_event_number(stream)
    }

    /// Read one event. `event_number == -1` reads the stream's last event.
    pub fn read_event(&self, stream: &str, event_number: i64) -> ReadEventResult {
        if event_number < -1 {
            return ReadEventResult::Error(format!("invalid event number {event_number}"));
        }
        match self.index.read_event(stream, event_number) {
            EntryRead::NoEntry => ReadEventResult::NoStream,
            EntryRead::Deleted => ReadEventResult::StreamDeleted,
            EntryRead::Found(Some(record)) => ReadEventResult::Success(record),
            EntryRead::Found(None) => ReadEventResult::NotFound,
        }
    }

    /// Deadline-aware [`ReadIndex::read_event`].
    pub fn read_event_until(
        &self,
        deadline: Instant,
        stream: &str,
        event_number: i64,
    ) -> ReadEventResult {
        if Instant::now() >= deadline {
            debug!(stream, event_number, "read_event deadline expired");
            return ReadEventResult::Expired;
        }
        self.read_event(stream, event_number)
    }

    /// Read up to `max_count` events of `stream` starting at
    /// `from_event_number`, ascending.
    pub fn read_stream_events_forward(
        &self,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> ReadStreamResult {
        if from_event_number < 0 {
            return ReadStreamResult::empty(ReadStreamStatus::Error(format!(
                "forward reads require a non-negative start, got {from_event_number}"
            )));
        }
        match self.index.read_forward(stream, from_event_number, max_count) {
            EntryRead::NoEntry => ReadStreamResult::empty(ReadStreamStatus::NoStream),
            EntryRead::Deleted => ReadStreamResult::empty(ReadStreamStatus::StreamDeleted),
            EntryRead::Found((events, last_event_number)) => {
                let next_event_number = match events.last() {
                    Some(record) => record.event_number + 1,
                    None => from_event_number,
                };
                ReadStreamResult {
                    status: ReadStreamStatus::Success,
                    is_end_of_stream: next_event_number > last_event_number,
                    next_event_number,
                    last_event_number,
                    events,
                }
            }
        }
    }

    /// Deadline-aware [`ReadIndex::read_stream_events_forward`].
    pub fn read_stream_events_forward_until(
        &self,
        deadline: Instant,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> ReadStreamResult {
        if Instant::now() >= deadline {
            debug!(stream, from_event_number, "forward read deadline expired");
            return ReadStreamResult::empty(ReadStreamStatus::Expired);
        }
        self.read_stream_events_forward(stream, from_event_number, max_count)
    }

    /// Read up to `max_count` events of `stream` starting at
    /// `from_event_number`, descending. `from_event_number == -1` starts at
    /// the stream's last event.
    pub fn read_stream_events_backward(
        &self,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> ReadStreamResult {
        if from_event_number < -1 {
            return ReadStreamResult::empty(ReadStreamStatus::Error(format!(
                "invalid backward start {from_event_number}"
            )));
        }
        match self.index.read_backward(stream, from_event_number, max_count) {
            EntryRead::NoEntry => ReadStreamResult::empty(ReadStreamStatus::NoStream),
            EntryRead::Deleted => ReadStreamResult::empty(ReadStreamStatus::StreamDeleted),
            EntryRead::Found((events, last_event_number)) => {
                let next_event_number = match events.last() {
                    Some(record) => record.event_number - 1,
                    None => -1,
                };
                ReadStreamResult {
                    status: ReadStreamStatus::Success,
                    is_end_of_stream: next_event_number < 0,
                    next_event_number,
                    last_event_number,
                    events,
                }
            }
        }
    }

    /// Deadline-aware [`ReadIndex::read_stream_events_backward`].
    pub fn read_stream_events_backward_until(
        &self,
        deadline: Instant,
        stream: &str,
        from_event_number: i64,
        max_count: usize,
    ) -> ReadStreamResult {
        if Instant::now() >= deadline {
            debug!(stream, from_event_number, "backward read deadline expired");
            return ReadStreamResult::empty(ReadStreamStatus::Expired);
        }
        self.read_stream_events_backward(stream, from_event_number, max_count)
    }
}
