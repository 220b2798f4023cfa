//! Per-sequence reassembly buffers.

use std::collections::BTreeMap;

/// Waveform channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Channel A (first waveform).
    A,
    /// Channel B (second waveform).
    B,
}

/// One partially or fully assembled sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceRecord {
    channel_a: Vec<u8>,
    channel_b: Vec<u8>,
    scalar: Option<f32>,
}

impl SequenceRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to a channel.
    pub fn append(&mut self, channel: Channel, bytes: &[u8]) {
        match channel {
            Channel::A => self.channel_a.extend_from_slice(bytes),
            Channel::B => self.channel_b.extend_from_slice(bytes),
        }
    }

    /// Set the scalar, replacing any earlier value.
    pub fn set_scalar(&mut self, value: f32) {
        self.scalar = Some(value);
    }

    /// Raw bytes of a channel.
    pub fn channel(&self, channel: Channel) -> &[u8] {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    /// Scalar value, if received.
    pub fn scalar(&self) -> Option<f32> {
        self.scalar
    }

    /// Both channels hold at least `min_channel_bytes` and the scalar arrived.
    pub fn is_complete(&self, min_channel_bytes: usize) -> bool {
        self.channel_a.len() >= min_channel_bytes
            && self.channel_b.len() >= min_channel_bytes
            && self.scalar.is_some()
    }
}

/// Mapping from sequence identifier to record.
///
/// Iteration is ordered by sequence identifier, not by arrival.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBuffer {
    records: BTreeMap<u16, SequenceRecord>,
}

impl SessionBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `sequence`, created empty on first use.
    pub fn entry(&mut self, sequence: u16) -> &mut SequenceRecord {
        self.records.entry(sequence).or_default()
    }

    /// Record for `sequence`, if any frame for it arrived.
    pub fn get(&self, sequence: u16) -> Option<&SequenceRecord> {
        self.records.get(&sequence)
    }

    /// Number of sequences seen.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no sequence has been seen.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over `(sequence, record)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &SequenceRecord)> {
        self.records.iter().map(|(seq, record)| (*seq, record))
    }

    /// Number of records meeting the completeness threshold.
    pub fn complete_count(&self, min_channel_bytes: usize) -> usize {
        self.records
            .values()
            .filter(|record| record.is_complete(min_channel_bytes))
            .count()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_concatenates_in_order() {
        let mut record = SequenceRecord::new();
        record.append(Channel::A, &[1, 2]);
        record.append(Channel::B, &[9]);
        record.append(Channel::A, &[3]);

        assert_eq!(record.channel(Channel::A), &[1, 2, 3]);
        assert_eq!(record.channel(Channel::B), &[9]);
    }

    #[test]
    fn test_scalar_last_write_wins() {
        let mut record = SequenceRecord::new();
        assert_eq!(record.scalar(), None);

        record.set_scalar(36.1);
        record.set_scalar(37.2);
        assert_eq!(record.scalar(), Some(37.2));
    }

    #[test]
    fn test_completeness_requires_both_channels_and_scalar() {
        let mut record = SequenceRecord::new();
        record.append(Channel::A, &[0; 16]);
        assert!(!record.is_complete(16));

        record.append(Channel::B, &[0; 15]);
        record.set_scalar(1.0);
        assert!(!record.is_complete(16));

        record.append(Channel::B, &[0]);
        assert!(record.is_complete(16));
    }

    #[test]
    fn test_over_threshold_is_complete() {
        let mut record = SequenceRecord::new();
        record.append(Channel::A, &[0; 20]);
        record.append(Channel::B, &[0; 17]);
        record.set_scalar(0.0);
        assert!(record.is_complete(16));
    }

    #[test]
    fn test_buffer_entry_and_counts() {
        let mut buffer = SessionBuffer::new();
        assert!(buffer.is_empty());

        buffer.entry(5).append(Channel::A, &[0; 4]);
        buffer.entry(5).append(Channel::B, &[0; 4]);
        buffer.entry(5).set_scalar(1.0);
        buffer.entry(2).append(Channel::A, &[0; 4]);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.complete_count(4), 1);
        assert_eq!(buffer.iter().map(|(seq, _)| seq).collect::<Vec<_>>(), vec![2, 5]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.get(5).is_none());
    }
}
