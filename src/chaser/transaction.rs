//! Aggregation of one inline transaction's prepares
//!
//! The chaser owns exactly one [`TransactionAggregator`] and reuses it for
//! every transaction it tails: `process` per prepare in position order,
//! `clear` once the transaction commits or a new transaction position shows
//! up. It is deliberately not shareable across threads; the chaser is its
//! single mutator.

use crate::error::{EventlineError, Result};
use crate::log::record::PrepareRecord;
use std::collections::HashMap;

/// Per-transaction accumulator of prepares, grouped by stream.
///
/// Streams get a slot in first-seen order. A slot tracks the first and last
/// event number the transaction assigns to its stream; data-bearing prepares
/// advance the last event number, control-only prepares merely open the
/// slot. A prepare whose expected version disagrees with the tracked last
/// event number is a fatal inconsistency, never corrected.
#[derive(Debug, Default)]
pub struct TransactionAggregator {
    position: Option<u64>,
    stream_slots: HashMap<String, usize>,
    slot_order: Vec<String>,
    first_event_numbers: Vec<i64>,
    last_event_numbers: Vec<i64>,
    prepares: Vec<PrepareRecord>,
    event_stream_indexes: Vec<usize>,
}

impl TransactionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction position currently being accumulated; `None` when idle.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// No prepares accumulated (control-only slots may still exist).
    pub fn is_empty(&self) -> bool {
        self.prepares.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.slot_order.len()
    }

    /// Append a prepare to the open transaction.
    ///
    /// The caller must have flushed a stale aggregate before handing over a
    /// prepare from a different transaction position; receiving one anyway
    /// is an error here, not a silent reset.
    pub fn process(&mut self, prepare: &PrepareRecord) -> Result<()> {
        match self.position {
            None => self.position = Some(prepare.transaction_position),
            Some(position) if position != prepare.transaction_position => {
                return Err(EventlineError::UnexpectedRecord {
                    position: prepare.log_position,
                    detail: format!(
                        "prepare for transaction at {} while transaction at {} is open",
                        prepare.transaction_position, position
                    ),
                });
            }
            Some(_) => {}
        }

        let slot = match self.stream_slots.get(&prepare.stream_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.slot_order.len();
                self.stream_slots.insert(prepare.stream_id.clone(), slot);
                self.slot_order.push(prepare.stream_id.clone());
                self.first_event_numbers.push(prepare.expected_version + 1);
                self.last_event_numbers.push(prepare.expected_version);
                slot
            }
        };

        if prepare.is_data_bearing() {
            if prepare.expected_version != self.last_event_numbers[slot] {
                return Err(EventlineError::SequenceViolation {
                    stream: prepare.stream_id.clone(),
                    transaction_position: prepare.transaction_position,
                    expected: self.last_event_numbers[slot],
                    actual: prepare.expected_version,
                });
            }
            self.last_event_numbers[slot] += 1;
            self.event_stream_indexes.push(slot);
            self.prepares.push(prepare.clone());
        }

        Ok(())
    }

    /// First event number per participating stream, slot order.
    pub fn first_event_numbers(&self) -> &[i64] {
        &self.first_event_numbers
    }

    /// Last event number per participating stream, slot order.
    pub fn last_event_numbers(&self) -> &[i64] {
        &self.last_event_numbers
    }

    /// Stream slot of each accumulated prepare, in prepare order.
    ///
    /// `None` when at most one stream participated: every index would be 0,
    /// and consumers rely on the omission (wire compatibility).
    pub fn event_stream_indexes(&self) -> Option<&[usize]> {
        if self.slot_order.len() <= 1 {
            None
        } else {
            Some(&self.event_stream_indexes)
        }
    }

    /// Data-bearing prepares accumulated so far, in position order.
    pub fn prepares(&self) -> &[PrepareRecord] {
        &self.prepares
    }

    /// Reset for reuse. Keeps allocations where the collections allow it.
    pub fn clear(&mut self) {
        self.position = None;
        self.stream_slots.clear();
        self.slot_order.clear();
        self.first_event_numbers.clear();
        self.last_event_numbers.clear();
        self.prepares.clear();
        self.event_stream_indexes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::PrepareFlags;
    use bytes::Bytes;
    use uuid::Uuid;

    fn prepare(
        transaction_position: u64,
        stream: &str,
        expected_version: i64,
        flags: PrepareFlags,
    ) -> PrepareRecord {
        PrepareRecord {
            log_position: transaction_position,
            transaction_position,
            stream_id: stream.to_string(),
            expected_version,
            flags: flags | PrepareFlags::IS_COMMITTED,
            event_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            event_type: "test-event".to_string(),
            data: Bytes::from_static(b"payload"),
            timestamp: 0,
        }
    }

    #[test]
    fn multi_stream_transaction_tracks_per_stream_ranges() {
        let mut txn = TransactionAggregator::new();
        // X is new (2 events), Y exists at event 4 (1 event)
        txn.process(&prepare(100, "X", -1, PrepareFlags::DATA)).unwrap();
        txn.process(&prepare(100, "X", 0, PrepareFlags::DATA)).unwrap();
        txn.process(&prepare(100, "Y", 4, PrepareFlags::DATA)).unwrap();

        assert_eq!(txn.first_event_numbers(), &[0, 5]);
        assert_eq!(txn.last_event_numbers(), &[1, 5]);
        assert_eq!(txn.event_stream_indexes(), Some(&[0, 0, 1][..]));
        assert_eq!(txn.prepares().len(), 3);
    }

    #[test]
    fn single_stream_transaction_omits_stream_indexes() {
        let mut txn = TransactionAggregator::new();
        txn.process(&prepare(7, "solo", -1, PrepareFlags::DATA)).unwrap();
        txn.process(&prepare(7, "solo", 0, PrepareFlags::DATA)).unwrap();

        assert_eq!(txn.event_stream_indexes(), None);
        assert_eq!(txn.first_event_numbers(), &[0]);
        assert_eq!(txn.last_event_numbers(), &[1]);
    }

    #[test]
    fn control_only_prepare_opens_slot_without_event() {
        let mut txn = TransactionAggregator::new();
        txn.process(&prepare(3, "s", 9, PrepareFlags::TRANSACTION_BEGIN))
            .unwrap();

        assert_eq!(txn.stream_count(), 1);
        assert!(txn.is_empty());
        assert_eq!(txn.first_event_numbers(), &[10]);
        assert_eq!(txn.last_event_numbers(), &[9]);

        txn.process(&prepare(3, "s", 9, PrepareFlags::DATA)).unwrap();
        assert_eq!(txn.last_event_numbers(), &[10]);
        assert_eq!(txn.prepares().len(), 1);
    }

    #[test]
    fn expected_version_mismatch_is_a_sequence_violation() {
        let mut txn = TransactionAggregator::new();
        txn.process(&prepare(5, "s", -1, PrepareFlags::DATA)).unwrap();

        let err = txn
            .process(&prepare(5, "s", 3, PrepareFlags::DATA))
            .unwrap_err();
        assert!(matches!(
            err,
            EventlineError::SequenceViolation { expected: 0, actual: 3, .. }
        ));
    }

    #[test]
    fn prepare_from_other_transaction_is_rejected() {
        let mut txn = TransactionAggregator::new();
        txn.process(&prepare(5, "s", -1, PrepareFlags::DATA)).unwrap();

        let err = txn.process(&prepare(9, "s", 0, PrepareFlags::DATA)).unwrap_err();
        assert!(matches!(err, EventlineError::UnexpectedRecord { .. }));
    }

    #[test]
    fn clear_resets_for_reuse() {
        let mut txn = TransactionAggregator::new();
        txn.process(&prepare(5, "a", -1, PrepareFlags::DATA)).unwrap();
        txn.process(&prepare(5, "b", -1, PrepareFlags::DATA)).unwrap();
        txn.clear();

        assert_eq!(txn.position(), None);
        assert!(txn.is_empty());
        assert_eq!(txn.stream_count(), 0);

        txn.process(&prepare(8, "c", 2, PrepareFlags::DATA)).unwrap();
        assert_eq!(txn.position(), Some(8));
        assert_eq!(txn.first_event_numbers(), &[3]);
    }

    #[test]
    fn event_count_matches_last_minus_first_per_stream() {
        let mut txn = TransactionAggregator::new();
        let mut versions: HashMap<&str, i64> = HashMap::from([("a", -1), ("b", 3), ("c", 10)]);
        let writes = ["a", "b", "a", "c", "a", "b", "c"];
        for stream in writes {
            let version = versions[stream];
            txn.process(&prepare(42, stream, version, PrepareFlags::DATA)).unwrap();
            versions.insert(stream, version + 1);
        }

        let mut counted = 0;
        for (first, last) in txn
            .first_event_numbers()
            .iter()
            .zip(txn.last_event_numbers())
        {
            counted += last - first + 1;
        }
        assert_eq!(counted as usize, writes.len());
        assert_eq!(txn.prepares().len(), writes.len());
    }
}
