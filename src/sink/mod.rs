//! Persistence sink for finalized measurements.
//!
//! The engine treats storage as a sink with two operations: append one
//! record and commit the batch. [`MemorySink`] keeps records in memory;
//! [`sqlite::SqliteSink`] (feature `sqlite`) writes them to a database.

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::VitalSigns;

/// Caller-owned identifiers a download is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasurementBlock {
    /// Patient the recorder was worn by.
    pub patient_id: i64,
    /// Measurement block (one configured recording period).
    pub block_id: i64,
}

impl MeasurementBlock {
    /// Create a block reference.
    pub fn new(patient_id: i64, block_id: i64) -> Self {
        Self {
            patient_id,
            block_id,
        }
    }
}

/// One finalized measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// Owning block.
    pub block: MeasurementBlock,
    /// When the record was finalized.
    pub recorded_at: DateTime<Utc>,
    /// Device sequence it was derived from.
    pub sequence: u16,
    /// Derived vital signs.
    pub vitals: VitalSigns,
}

/// Errors raised by a measurement sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Generic storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// SQLite failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Destination for finalized measurements.
pub trait MeasurementSink {
    /// Stage one record in the current batch.
    fn append(&mut self, record: &MeasurementRecord) -> Result<(), SinkError>;

    /// Make every staged record durable.
    fn commit(&mut self) -> Result<(), SinkError>;

    /// Drop every staged record.
    fn discard(&mut self) {}
}

impl<K: MeasurementSink + ?Sized> MeasurementSink for &mut K {
    fn append(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        (**self).commit()
    }

    fn discard(&mut self) {
        (**self).discard()
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    staged: Vec<MeasurementRecord>,
    committed: Vec<MeasurementRecord>,
    commits: usize,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records made durable so far.
    pub fn committed(&self) -> &[MeasurementRecord] {
        &self.committed
    }

    /// Records appended but not committed.
    pub fn staged(&self) -> &[MeasurementRecord] {
        &self.staged
    }

    /// Number of commits performed.
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl MeasurementSink for MemorySink {
    fn append(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        self.staged.push(record.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        self.committed.append(&mut self.staged);
        self.commits += 1;
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u16) -> MeasurementRecord {
        MeasurementRecord {
            block: MeasurementBlock::new(1, 2),
            recorded_at: Utc::now(),
            sequence,
            vitals: VitalSigns::default(),
        }
    }

    #[test]
    fn test_memory_sink_stages_until_commit() {
        let mut sink = MemorySink::new();
        sink.append(&record(0)).unwrap();
        sink.append(&record(1)).unwrap();

        assert_eq!(sink.staged().len(), 2);
        assert!(sink.committed().is_empty());

        sink.commit().unwrap();
        assert!(sink.staged().is_empty());
        assert_eq!(sink.committed().len(), 2);
        assert_eq!(sink.commit_count(), 1);
    }

    #[test]
    fn test_memory_sink_discard() {
        let mut sink = MemorySink::new();
        sink.append(&record(0)).unwrap();
        sink.discard();
        sink.commit().unwrap();

        assert!(sink.committed().is_empty());
    }

    #[test]
    fn test_sink_through_mutable_reference() {
        fn store<K: MeasurementSink>(mut sink: K) {
            sink.append(&record(3)).unwrap();
            sink.commit().unwrap();
        }

        let mut sink = MemorySink::new();
        store(&mut sink);
        assert_eq!(sink.committed()[0].sequence, 3);
    }
}
