//! Per-CRTC sequence tracking.
//!
//! The table is sized once at discovery. Afterwards only the contents of
//! individual records change, and only in response to a completion for that
//! record's slot.

use tracing::debug;

use crate::error::MonitorError;
use crate::source::{CompletionToken, CrtcId, SequenceSample, SequenceSource};

/// Maximum number of CRTCs tracked.
pub const CAPACITY: usize = 64;

/// Last observed state of one CRTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtcRecord {
    pub id: CrtcId,
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub delta_sequence: u64,
    pub delta_time_ns: u64,
}

impl CrtcRecord {
    fn new(id: CrtcId, sample: SequenceSample) -> Self {
        Self {
            id,
            sequence: sample.sequence,
            timestamp_ns: sample.timestamp_ns,
            delta_sequence: 0,
            delta_time_ns: 0,
        }
    }

    fn advance(&mut self, sample: SequenceSample) -> Result<(), MonitorError> {
        if sample.sequence <= self.sequence {
            return Err(MonitorError::SequenceRegression {
                crtc: self.id,
                previous: self.sequence,
                received: sample.sequence,
            });
        }
        if sample.timestamp_ns <= self.timestamp_ns {
            return Err(MonitorError::TimestampRegression {
                crtc: self.id,
                previous: self.timestamp_ns,
                received: sample.timestamp_ns,
            });
        }

        self.delta_sequence = sample.sequence - self.sequence;
        self.delta_time_ns = sample.timestamp_ns - self.timestamp_ns;
        self.sequence = sample.sequence;
        self.timestamp_ns = sample.timestamp_ns;
        Ok(())
    }
}

/// Fixed-length table of [`CrtcRecord`]s in discovery order.
///
/// A record's index doubles as its [`CompletionToken`].
#[derive(Debug)]
pub struct StateTable {
    records: Vec<CrtcRecord>,
}

impl StateTable {
    /// Builds one record per id, seeding each from `source.query_current`.
    ///
    /// A CRTC that reports itself disabled starts at sequence 0, timestamp 0.
    ///
    /// # Errors
    /// Fails if there are more than [`CAPACITY`] ids, an id repeats, or a
    /// query fails for any reason other than the CRTC being disabled.
    pub fn initialize<S: SequenceSource>(
        source: &mut S,
        ids: &[CrtcId],
    ) -> Result<Self, MonitorError> {
        if ids.len() > CAPACITY {
            return Err(MonitorError::TooManyCrtcs {
                found: ids.len(),
                capacity: CAPACITY,
            });
        }

        let mut records: Vec<CrtcRecord> = Vec::with_capacity(ids.len());
        for &id in ids {
            if records.iter().any(|r| r.id == id) {
                return Err(MonitorError::DuplicateCrtc(id));
            }

            let sample = match source.query_current(id) {
                Ok(sample) => sample,
                Err(err) if err.is_disabled() => {
                    debug!(crtc = %id, "CRTC disabled at startup");
                    SequenceSample::default()
                }
                Err(err) => {
                    return Err(MonitorError::from_source("query sequence", Some(id), err));
                }
            };
            records.push(CrtcRecord::new(id, sample));
        }

        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CrtcRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrtcRecord> {
        self.records.iter()
    }

    /// Applies a completion to the record `token` points at.
    ///
    /// Returns the record's index.
    ///
    /// # Errors
    /// Fails if the token names no record, or the sample does not strictly
    /// advance both the sequence and the timestamp. The record is unchanged
    /// on error.
    pub fn update(
        &mut self,
        token: CompletionToken,
        sample: SequenceSample,
    ) -> Result<usize, MonitorError> {
        let index = token
            .index()
            .filter(|&i| i < self.records.len())
            .ok_or(MonitorError::UnknownToken(token))?;

        self.records[index].advance(sample)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::scripted::ScriptedSource;

    fn sample(sequence: u64, timestamp_ns: u64) -> SequenceSample {
        SequenceSample {
            sequence,
            timestamp_ns,
        }
    }

    fn table_with(ids: &[u32], current: &[(u32, SequenceSample)]) -> StateTable {
        let mut source = ScriptedSource::with_crtcs(ids);
        for &(id, s) in current {
            source.current.insert(CrtcId(id), s);
        }
        let crtcs = source.crtcs.clone();
        StateTable::initialize(&mut source, &crtcs).unwrap()
    }

    #[test]
    fn test_initialize_queries_each_crtc_in_order() {
        let table = table_with(&[7, 3], &[(7, sample(10, 100)), (3, sample(20, 200))]);

        let ids: Vec<_> = table.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![CrtcId(7), CrtcId(3)]);
        assert_eq!(table.get(0).unwrap().sequence, 10);
        assert_eq!(table.get(1).unwrap().timestamp_ns, 200);
    }

    #[test]
    fn test_disabled_crtc_starts_at_zero() {
        let mut source = ScriptedSource::with_crtcs(&[1]);
        source.current.insert(CrtcId(1), sample(5, 5));
        source.disabled.push(CrtcId(1));

        let table = StateTable::initialize(&mut source, &[CrtcId(1)]).unwrap();
        let record = table.get(0).unwrap();
        assert_eq!(record.sequence, 0);
        assert_eq!(record.timestamp_ns, 0);
    }

    #[test]
    fn test_other_query_failure_is_fatal() {
        let mut source = ScriptedSource::with_crtcs(&[1, 2]);
        source.failing_query = Some(CrtcId(2));

        let err = StateTable::initialize(&mut source, &[CrtcId(1), CrtcId(2)]).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Source {
                crtc: Some(CrtcId(2)),
                ..
            }
        ));
    }

    #[test]
    fn test_capacity_is_inclusive() {
        let ids: Vec<u32> = (0..CAPACITY as u32).collect();
        let table = table_with(&ids, &[]);
        assert_eq!(table.len(), CAPACITY);
    }

    #[test]
    fn test_too_many_crtcs_is_rejected() {
        let ids: Vec<CrtcId> = (0..=CAPACITY as u32).map(CrtcId).collect();
        let mut source = ScriptedSource::default();

        let err = StateTable::initialize(&mut source, &ids).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::TooManyCrtcs {
                found: 65,
                capacity: CAPACITY
            }
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut source = ScriptedSource::default();
        let err = StateTable::initialize(&mut source, &[CrtcId(4), CrtcId(4)]).unwrap_err();
        assert!(matches!(err, MonitorError::DuplicateCrtc(CrtcId(4))));
    }

    #[test]
    fn test_update_computes_deltas_from_previous_sample() {
        let mut table = table_with(&[10], &[(10, sample(100, 1_000))]);

        let index = table
            .update(CompletionToken::for_index(0), sample(101, 1_500))
            .unwrap();
        assert_eq!(index, 0);
        let record = table.get(0).unwrap();
        assert_eq!(record.delta_sequence, 1);
        assert_eq!(record.delta_time_ns, 500);

        table
            .update(CompletionToken::for_index(0), sample(104, 3_000))
            .unwrap();
        let record = table.get(0).unwrap();
        assert_eq!(record.delta_sequence, 3);
        assert_eq!(record.delta_time_ns, 1_500);
        assert_eq!(record.sequence, 104);
        assert_eq!(record.timestamp_ns, 3_000);
    }

    #[test]
    fn test_update_touches_only_the_addressed_record() {
        let mut table = table_with(&[1, 2], &[(1, sample(1, 1)), (2, sample(9, 9))]);

        table
            .update(CompletionToken::for_index(1), sample(10, 10))
            .unwrap();
        assert_eq!(table.get(0).unwrap().sequence, 1);
        assert_eq!(table.get(1).unwrap().sequence, 10);
    }

    #[test]
    fn test_sequence_regression_is_fatal() {
        let mut table = table_with(&[1], &[(1, sample(50, 50))]);

        let err = table
            .update(CompletionToken::for_index(0), sample(50, 60))
            .unwrap_err();
        assert!(matches!(
            err,
            MonitorError::SequenceRegression {
                previous: 50,
                received: 50,
                ..
            }
        ));
        assert_eq!(table.get(0).unwrap().timestamp_ns, 50);
    }

    #[test]
    fn test_timestamp_regression_is_fatal() {
        let mut table = table_with(&[1], &[(1, sample(50, 50))]);

        let err = table
            .update(CompletionToken::for_index(0), sample(51, 40))
            .unwrap_err();
        assert!(matches!(err, MonitorError::TimestampRegression { .. }));
        assert_eq!(table.get(0).unwrap().sequence, 50);
    }

    #[test]
    fn test_unknown_token_is_fatal() {
        let mut table = table_with(&[1], &[]);

        let err = table
            .update(CompletionToken(3), sample(1, 1))
            .unwrap_err();
        assert!(matches!(err, MonitorError::UnknownToken(CompletionToken(3))));
    }
}
