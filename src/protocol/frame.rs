//! Notification frame decoding.
//!
//! Every notification the recorder sends carries an 8-byte header followed
//! by a payload:
//!
//! ```text
//! +--------+----------+--------------+--------------+--------------+----------+
//! | Tag    | Reserved | Sequence     | Chunk Index  | Chunk Max    | Payload  |
//! | 1 byte | 1 byte   | 2 bytes (LE) | 2 bytes (LE) | 2 bytes (LE) | N bytes  |
//! +--------+----------+--------------+--------------+--------------+----------+
//! ```
//!
//! The chunk fields are informational. Reassembly appends in arrival order.

use thiserror::Error;

use crate::core::constants::{
    NOTIFICATION_HEADER_SIZE, SCALAR_PAYLOAD_SIZE, TAG_CHANNEL_A, TAG_CHANNEL_B, TAG_SCALAR,
    TAG_SEQUENCE_ACK,
};

/// Payload kind carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// The device finished sending one sequence.
    SequenceAck = TAG_SEQUENCE_ACK,
    /// Waveform channel A bytes.
    ChannelA = TAG_CHANNEL_A,
    /// Waveform channel B bytes.
    ChannelB = TAG_CHANNEL_B,
    /// Scalar (temperature) value.
    Scalar = TAG_SCALAR,
}

impl FrameKind {
    /// Parse a frame kind from its tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TAG_SEQUENCE_ACK => Some(Self::SequenceAck),
            TAG_CHANNEL_A => Some(Self::ChannelA),
            TAG_CHANNEL_B => Some(Self::ChannelB),
            TAG_SCALAR => Some(Self::Scalar),
            _ => None,
        }
    }

    /// Tag byte for this kind.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded notification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHeader {
    /// Payload kind.
    pub kind: FrameKind,
    /// Device-assigned sequence identifier.
    pub sequence: u16,
    /// Index of this chunk within its stream.
    pub chunk_index: u16,
    /// Highest chunk index of the stream.
    pub chunk_max: u16,
}

impl NotificationHeader {
    /// Create a header for a single-chunk frame.
    pub fn new(kind: FrameKind, sequence: u16) -> Self {
        Self {
            kind,
            sequence,
            chunk_index: 0,
            chunk_max: 0,
        }
    }

    /// Set the chunk position.
    pub fn with_chunk(mut self, chunk_index: u16, chunk_max: u16) -> Self {
        self.chunk_index = chunk_index;
        self.chunk_max = chunk_max;
        self
    }

    /// Serialize the header (reserved byte written as zero).
    pub fn to_bytes(&self) -> [u8; NOTIFICATION_HEADER_SIZE] {
        let mut buf = [0u8; NOTIFICATION_HEADER_SIZE];
        buf[0] = self.kind.as_byte();
        buf[2..4].copy_from_slice(&self.sequence.to_le_bytes());
        buf[4..6].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[6..8].copy_from_slice(&self.chunk_max.to_le_bytes());
        buf
    }

    /// Parse a header from the start of a notification.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < NOTIFICATION_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: NOTIFICATION_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let kind = FrameKind::from_byte(bytes[0]).ok_or(FrameError::UnknownKind(bytes[0]))?;

        Ok(Self {
            kind,
            sequence: u16::from_le_bytes([bytes[2], bytes[3]]),
            chunk_index: u16::from_le_bytes([bytes[4], bytes[5]]),
            chunk_max: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// A parsed notification borrowing its payload from the received bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Notification<'a> {
    /// Decoded header.
    pub header: NotificationHeader,
    /// Bytes after the header.
    pub payload: &'a [u8],
}

impl<'a> Notification<'a> {
    /// Parse a notification.
    ///
    /// Scalar frames must carry at least [`SCALAR_PAYLOAD_SIZE`] payload
    /// bytes; shorter ones are rejected here so they never reach a record.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        let header = NotificationHeader::from_bytes(bytes)?;
        let payload = &bytes[NOTIFICATION_HEADER_SIZE..];

        if header.kind == FrameKind::Scalar && payload.len() < SCALAR_PAYLOAD_SIZE {
            return Err(FrameError::ScalarTooShort(payload.len()));
        }

        Ok(Self { header, payload })
    }

    /// Scalar value of a [`FrameKind::Scalar`] frame (first 4 payload bytes, f32 LE).
    pub fn scalar(&self) -> Option<f32> {
        if self.header.kind != FrameKind::Scalar {
            return None;
        }
        let bytes: [u8; SCALAR_PAYLOAD_SIZE] =
            self.payload.get(..SCALAR_PAYLOAD_SIZE)?.try_into().ok()?;
        Some(f32::from_le_bytes(bytes))
    }
}

/// Encode a notification (header + payload).
pub fn encode_notification(header: &NotificationHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NOTIFICATION_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Errors that can occur while parsing a notification.
///
/// The link is lossy, so every one of these is dropped silently by the
/// session; they exist for logging and tests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is shorter than the header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Tag byte is not a known kind.
    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    /// Scalar frame without a full f32.
    #[error("scalar payload too short: {0} bytes")]
    ScalarTooShort(usize),
}
