//! SQLite measurement store.
//!
//! One row per finalized sequence in `measurements`. A batch is a
//! transaction: the first `append` opens it and `commit` closes it.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use super::{MeasurementBlock, MeasurementRecord, MeasurementSink, SinkError};
use crate::core::VitalSigns;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL,
    block_id INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    heart_rate REAL,
    spo2 REAL,
    respiration_rate REAL,
    temperature REAL,
    systolic REAL,
    diastolic REAL,
    sample_count INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS measurements_by_block
    ON measurements (patient_id, block_id);";

/// Measurement sink backed by SQLite.
pub struct SqliteSink {
    db: Connection,
    pending: usize,
}

impl SqliteSink {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let db = Connection::open(path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.display(), "measurement store opened");
        Self::with_connection(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, SinkError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db, pending: 0 })
    }

    /// Records staged in the open transaction.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Committed measurements of one block, in insertion order.
    pub fn measurements(&self, block: MeasurementBlock) -> Result<Vec<MeasurementRecord>, SinkError> {
        let mut stmt = self.db.prepare_cached(
            "SELECT recorded_at, sequence, heart_rate, spo2, respiration_rate,
                    temperature, systolic, diastolic
             FROM measurements
             WHERE patient_id = ?1 AND block_id = ?2
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![block.patient_id, block.block_id], |row| {
            let recorded_at: DateTime<Utc> = row.get(0)?;
            Ok(MeasurementRecord {
                block,
                recorded_at,
                sequence: row.get(1)?,
                vitals: VitalSigns {
                    heart_rate: row.get(2)?,
                    spo2: row.get(3)?,
                    respiration_rate: row.get(4)?,
                    temperature: row.get(5)?,
                    systolic: row.get(6)?,
                    diastolic: row.get(7)?,
                },
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(SinkError::from)
    }
}

impl MeasurementSink for SqliteSink {
    fn append(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        if self.pending == 0 {
            self.db.execute_batch("BEGIN")?;
        }

        let v = &record.vitals;
        let inserted = self.db.execute(
            "INSERT INTO measurements
                (patient_id, block_id, recorded_at, sequence, heart_rate, spo2,
                 respiration_rate, temperature, systolic, diastolic, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
            params![
                record.block.patient_id,
                record.block.block_id,
                record.recorded_at,
                record.sequence,
                v.heart_rate,
                v.spo2,
                v.respiration_rate,
                v.temperature,
                v.systolic,
                v.diastolic,
            ],
        );

        match inserted {
            Ok(_) => {
                self.pending += 1;
                Ok(())
            }
            Err(err) => {
                if self.pending == 0 {
                    self.discard();
                }
                Err(err.into())
            }
        }
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        if self.pending == 0 {
            return Ok(());
        }
        self.db.execute_batch("COMMIT")?;
        debug!(rows = self.pending, "measurement batch committed");
        self.pending = 0;
        Ok(())
    }

    fn discard(&mut self) {
        if self.db.is_autocommit() {
            return;
        }
        if let Err(err) = self.db.execute_batch("ROLLBACK") {
            warn!(error = %err, "rollback failed");
        }
        self.pending = 0;
    }
}
