//! Finalization pipeline.
//!
//! Runs once after a download wait ends. Complete records are decoded,
//! passed through the [`VitalsDeriver`] and appended to a
//! [`MeasurementSink`]; the batch is committed once at the end.

use chrono::Utc;
use tracing::{debug, info, trace};

use super::buffer::{Channel, SessionBuffer};
use crate::core::VitalsDeriver;
use crate::core::constants::{BYTES_PER_SAMPLE, SAMPLES_PER_CHANNEL};
use crate::sink::{MeasurementBlock, MeasurementRecord, MeasurementSink, SinkError};

/// Decode raw channel bytes as u32 LE samples widened to i64.
///
/// A trailing partial sample is ignored.
pub fn decode_samples(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| i64::from(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}

/// Turns a session buffer into persisted measurements.
#[derive(Debug, Clone)]
pub struct Finalizer<D> {
    deriver: D,
    min_samples: usize,
}

impl<D: VitalsDeriver> Finalizer<D> {
    /// Create a finalizer requiring a full sequence per channel.
    pub fn new(deriver: D) -> Self {
        Self {
            deriver,
            min_samples: SAMPLES_PER_CHANNEL,
        }
    }

    /// Override the per-channel sample minimum.
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Per-channel sample minimum.
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Derive and store every complete record of `buffer`.
    ///
    /// Incomplete records are skipped silently. On a sink error the staged
    /// batch is discarded and the error returned.
    pub fn finalize<K: MeasurementSink>(
        &self,
        buffer: &SessionBuffer,
        block: MeasurementBlock,
        sink: &mut K,
    ) -> Result<u32, SinkError> {
        match self.store_all(buffer, block, sink) {
            Ok(count) => {
                info!(
                    count,
                    sequences = buffer.len(),
                    patient_id = block.patient_id,
                    block_id = block.block_id,
                    "measurements finalized"
                );
                Ok(count)
            }
            Err(err) => {
                sink.discard();
                Err(err)
            }
        }
    }

    fn store_all<K: MeasurementSink>(
        &self,
        buffer: &SessionBuffer,
        block: MeasurementBlock,
        sink: &mut K,
    ) -> Result<u32, SinkError> {
        let mut count = 0u32;

        for (sequence, record) in buffer.iter() {
            let Some(scalar) = record.scalar() else {
                trace!(sequence, "skipping sequence without scalar");
                continue;
            };

            let channel_a = decode_samples(record.channel(Channel::A));
            let channel_b = decode_samples(record.channel(Channel::B));
            if channel_a.len() < self.min_samples || channel_b.len() < self.min_samples {
                trace!(
                    sequence,
                    samples_a = channel_a.len(),
                    samples_b = channel_b.len(),
                    "skipping short sequence"
                );
                continue;
            }

            let vitals = self.deriver.derive(&channel_a, &channel_b, scalar);
            sink.append(&MeasurementRecord {
                block,
                recorded_at: Utc::now(),
                sequence,
                vitals,
            })?;
            count += 1;
        }

        sink.commit()?;
        debug!(count, "batch committed");
        Ok(count)
    }
}
