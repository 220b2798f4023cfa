//! Reassembly state machine.
//!
//! Classifies each notification by tag, routes the payload into the
//! [`SessionBuffer`] and tracks completion against the expected ack count.
//! All mutation happens through [`SessionState::on_notification`], which the
//! session loop calls once per notification in arrival order.

use tokio::time::Instant;
use tracing::{debug, trace};

use super::buffer::{Channel, SessionBuffer};
use super::supervisor::SessionProgress;
use crate::protocol::{FrameError, FrameKind, Notification};

/// Where a validated notification goes.
enum Route {
    Waveform(Channel),
    Scalar(f32),
    Ack,
}

/// What a notification did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Waveform bytes appended.
    Appended {
        /// Sequence identifier.
        sequence: u16,
        /// Target channel.
        channel: Channel,
        /// Bytes appended.
        len: usize,
    },
    /// Scalar stored (or overwritten).
    ScalarSet {
        /// Sequence identifier.
        sequence: u16,
        /// New value.
        value: f32,
    },
    /// Sequence acknowledgment counted.
    Acked {
        /// Sequence identifier.
        sequence: u16,
        /// Acks counted so far.
        ack_count: u32,
        /// This ack completed the session.
        completed: bool,
    },
    /// Frame was malformed and dropped without touching state.
    Discarded(FrameError),
}

/// Download session state owned by the session loop.
#[derive(Debug, Clone)]
pub struct SessionState {
    expected_count: u32,
    ack_count: u32,
    started_at: Instant,
    last_activity: Instant,
    buffer: SessionBuffer,
    done: bool,
}

impl SessionState {
    /// Create a fresh session expecting `expected_count` acks.
    pub fn new(expected_count: u32, now: Instant) -> Self {
        Self {
            expected_count,
            ack_count: 0,
            started_at: now,
            last_activity: now,
            buffer: SessionBuffer::new(),
            // Nothing to wait for.
            done: expected_count == 0,
        }
    }

    /// Reset for a new download: clear the buffer, zero the ack count and
    /// stamp activity at `now`.
    pub fn reset(&mut self, expected_count: u32, now: Instant) {
        *self = Self::new(expected_count, now);
    }

    /// Process one raw notification.
    pub fn on_notification(&mut self, bytes: &[u8], now: Instant) -> FrameOutcome {
        let frame = match Notification::parse(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                trace!(len = bytes.len(), error = %err, "discarding malformed notification");
                return FrameOutcome::Discarded(err);
            }
        };

        // Everything that can reject the frame runs before the session is touched.
        let route = match frame.header.kind {
            FrameKind::ChannelA => Route::Waveform(Channel::A),
            FrameKind::ChannelB => Route::Waveform(Channel::B),
            FrameKind::Scalar => match frame.scalar() {
                Some(value) => Route::Scalar(value),
                None => {
                    let err = FrameError::ScalarTooShort(frame.payload.len());
                    trace!(len = bytes.len(), error = %err, "discarding malformed notification");
                    return FrameOutcome::Discarded(err);
                }
            },
            FrameKind::SequenceAck => Route::Ack,
        };

        self.last_activity = now;
        let sequence = frame.header.sequence;
        let record = self.buffer.entry(sequence);

        let outcome = match route {
            Route::Waveform(channel) => {
                record.append(channel, frame.payload);
                FrameOutcome::Appended {
                    sequence,
                    channel,
                    len: frame.payload.len(),
                }
            }
            Route::Scalar(value) => {
                record.set_scalar(value);
                FrameOutcome::ScalarSet { sequence, value }
            }
            Route::Ack => {
                self.ack_count = self.ack_count.saturating_add(1);
                let completed = !self.done && self.ack_count >= self.expected_count;
                if completed {
                    self.done = true;
                    debug!(
                        ack_count = self.ack_count,
                        expected = self.expected_count,
                        "all sequences acknowledged"
                    );
                }
                FrameOutcome::Acked {
                    sequence,
                    ack_count: self.ack_count,
                    completed,
                }
            }
        };

        trace!(
            sequence,
            chunk = frame.header.chunk_index,
            chunk_max = frame.header.chunk_max,
            ?outcome,
            "notification"
        );
        outcome
    }

    /// Acks the session waits for.
    pub fn expected_count(&self) -> u32 {
        self.expected_count
    }

    /// Acks received so far.
    pub fn ack_count(&self) -> u32 {
        self.ack_count
    }

    /// Whether the ack count reached the expected count.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// When the session started.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the last accepted frame arrived.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// The reassembly buffer.
    pub fn buffer(&self) -> &SessionBuffer {
        &self.buffer
    }

    /// Consistent snapshot for the supervisor.
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            expected_count: self.expected_count,
            ack_count: self.ack_count,
            started_at: self.started_at,
            last_activity: self.last_activity,
            done: self.done,
            cancelled: false,
        }
    }
}
