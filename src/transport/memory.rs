//! In-process transport with a recorder simulator.
//!
//! [`MemoryTransport`] is handed to the session engine; the paired
//! [`MemoryPeer`] stays with the test or demo and plays the device side.
//! It can advertise, inject raw notifications, drop the link and fail
//! connects or writes on demand.
//!
//! When a recording is loaded the peer behaves like the firmware: a start
//! command streams every recorded sequence as channel A chunks, channel B
//! chunks, the scalar and finally the sequence ack.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{DeviceInfo, NotificationStream, Transport};
use crate::core::LinkError;
use crate::core::constants::{
    DEVICE_CHUNK_PAYLOAD, NOTIFY_CHARACTERISTIC_UUID, SAMPLES_PER_CHANNEL,
    WRITE_CHARACTERISTIC_UUID,
};
use crate::protocol::{Command, FrameKind, NotificationHeader, WriteMode, encode_notification};

/// One sequence as stored on the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSequence {
    /// Sequence identifier.
    pub sequence: u16,
    /// Raw channel A bytes.
    pub channel_a: Vec<u8>,
    /// Raw channel B bytes.
    pub channel_b: Vec<u8>,
    /// Scalar reading.
    pub scalar: f32,
}

impl RecordedSequence {
    /// Build a sequence from raw samples.
    pub fn from_samples(sequence: u16, channel_a: &[u32], channel_b: &[u32], scalar: f32) -> Self {
        Self {
            sequence,
            channel_a: channel_a.iter().flat_map(|s| s.to_le_bytes()).collect(),
            channel_b: channel_b.iter().flat_map(|s| s.to_le_bytes()).collect(),
            scalar,
        }
    }

    /// Full-length sequence with every sample set to a constant.
    pub fn filled(sequence: u16, sample_a: u32, sample_b: u32, scalar: f32) -> Self {
        Self::from_samples(
            sequence,
            &[sample_a; SAMPLES_PER_CHANNEL],
            &[sample_b; SAMPLES_PER_CHANNEL],
            scalar,
        )
    }
}

/// Notifications the firmware emits for one sequence, in order.
///
/// Each channel is cut into `chunk_size` byte pieces whose header carries
/// the chunk index and the last chunk index.
pub fn device_sequence_frames(sequence: &RecordedSequence, chunk_size: usize) -> Vec<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    let mut frames = Vec::new();

    for (kind, bytes) in [
        (FrameKind::ChannelA, &sequence.channel_a),
        (FrameKind::ChannelB, &sequence.channel_b),
    ] {
        let chunk_max = bytes.len().div_ceil(chunk_size).saturating_sub(1) as u16;
        for (index, chunk) in bytes.chunks(chunk_size).enumerate() {
            let header =
                NotificationHeader::new(kind, sequence.sequence).with_chunk(index as u16, chunk_max);
            frames.push(encode_notification(&header, chunk));
        }
    }

    let scalar = NotificationHeader::new(FrameKind::Scalar, sequence.sequence);
    frames.push(encode_notification(&scalar, &sequence.scalar.to_le_bytes()));

    let ack = NotificationHeader::new(FrameKind::SequenceAck, sequence.sequence);
    frames.push(encode_notification(&ack, &[]));

    frames
}

/// A write observed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenCommand {
    /// Target characteristic.
    pub characteristic: Uuid,
    /// Raw bytes.
    pub data: Vec<u8>,
    /// Write mode used.
    pub mode: WriteMode,
}

#[derive(Debug)]
struct PeerState {
    notify_characteristic: Uuid,
    write_characteristic: Uuid,
    advertised: Vec<DeviceInfo>,
    connected: bool,
    acknowledged_writes: bool,
    subscribers: Vec<UnboundedSender<Vec<u8>>>,
    writes: Vec<WrittenCommand>,
    connect_failure: Option<LinkError>,
    write_failure: Option<LinkError>,
    recording: Vec<RecordedSequence>,
    chunk_size: usize,
    configured_count: Option<u32>,
}

impl PeerState {
    fn new(notify_characteristic: Uuid, write_characteristic: Uuid) -> Self {
        Self {
            notify_characteristic,
            write_characteristic,
            advertised: Vec::new(),
            connected: false,
            acknowledged_writes: true,
            subscribers: Vec::new(),
            writes: Vec::new(),
            connect_failure: None,
            write_failure: None,
            recording: Vec::new(),
            chunk_size: DEVICE_CHUNK_PAYLOAD,
            configured_count: None,
        }
    }

    /// Push one notification to every live subscriber.
    fn notify(&mut self, frame: Vec<u8>) -> bool {
        self.subscribers
            .retain(|tx| tx.unbounded_send(frame.clone()).is_ok());
        !self.subscribers.is_empty()
    }

    fn stream_recording(&mut self) {
        let frames: Vec<Vec<u8>> = self
            .recording
            .iter()
            .flat_map(|sequence| device_sequence_frames(sequence, self.chunk_size))
            .collect();
        debug!(
            sequences = self.recording.len(),
            frames = frames.len(),
            "simulator streaming recording"
        );
        for frame in frames {
            if !self.notify(frame) {
                break;
            }
        }
    }

    fn drop_link(&mut self) {
        self.connected = false;
        // Dropping the senders ends every notification stream.
        self.subscribers.clear();
    }
}

fn lock(state: &Mutex<PeerState>) -> MutexGuard<'_, PeerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a connected transport / peer pair using the recorder's UUIDs.
pub fn pair() -> (MemoryTransport, MemoryPeer) {
    pair_with(NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID)
}

/// Create a transport / peer pair exposing custom characteristics.
pub fn pair_with(notify_characteristic: Uuid, write_characteristic: Uuid) -> (MemoryTransport, MemoryPeer) {
    let state = Arc::new(Mutex::new(PeerState::new(
        notify_characteristic,
        write_characteristic,
    )));
    (
        MemoryTransport {
            state: Arc::clone(&state),
        },
        MemoryPeer { state },
    )
}

/// Host side of an in-memory link.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<PeerState>>,
}

/// Device side of an in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    state: Arc<Mutex<PeerState>>,
}

impl MemoryPeer {
    /// Start advertising under `name`.
    pub fn advertise(&self, name: &str) -> DeviceInfo {
        let mut state = lock(&self.state);
        let device = DeviceInfo {
            id: format!("mem-{}", state.advertised.len()),
            name: name.to_string(),
        };
        state.advertised.push(device.clone());
        device
    }

    /// Replace the stored recording streamed on a start command.
    pub fn load_recording(&self, recording: Vec<RecordedSequence>) {
        lock(&self.state).recording = recording;
    }

    /// Payload bytes per waveform notification.
    pub fn set_chunk_size(&self, chunk_size: usize) {
        lock(&self.state).chunk_size = chunk_size;
    }

    /// Whether the write characteristic advertises acknowledged writes.
    pub fn set_acknowledged_writes(&self, supported: bool) {
        lock(&self.state).acknowledged_writes = supported;
    }

    /// Make every following connect attempt fail with `error`.
    pub fn fail_connect(&self, error: Option<LinkError>) {
        lock(&self.state).connect_failure = error;
    }

    /// Make every following write fail with `error`.
    pub fn fail_writes(&self, error: Option<LinkError>) {
        lock(&self.state).write_failure = error;
    }

    /// Send a raw notification. Returns false if nobody is subscribed.
    pub fn notify(&self, frame: impl Into<Vec<u8>>) -> bool {
        lock(&self.state).notify(frame.into())
    }

    /// Drop the link from the device side.
    pub fn drop_link(&self) {
        lock(&self.state).drop_link();
    }

    /// Whether the host is connected.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Every write received so far.
    pub fn writes(&self) -> Vec<WrittenCommand> {
        lock(&self.state).writes.clone()
    }

    /// Count from the last configure command.
    pub fn configured_count(&self) -> Option<u32> {
        lock(&self.state).configured_count
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn scan(&mut self, name: &str, window: Duration) -> Result<Option<DeviceInfo>, LinkError> {
        let found = lock(&self.state)
            .advertised
            .iter()
            .find(|device| device.name == name)
            .cloned();

        if found.is_none() {
            tokio::time::sleep(window).await;
        }
        Ok(found)
    }

    async fn connect(&mut self, device: &DeviceInfo, _timeout: Duration) -> Result<(), LinkError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.connect_failure.clone() {
            return Err(err);
        }
        if !state.advertised.iter().any(|d| d.id == device.id) {
            return Err(LinkError::Backend(format!("unknown peripheral {}", device.id)));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        lock(&self.state).drop_link();
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationStream, LinkError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(LinkError::Disconnected);
        }
        if characteristic != state.notify_characteristic {
            return Err(LinkError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::unbounded();
        state.subscribers.push(tx);
        Ok(Box::pin(rx))
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), LinkError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(LinkError::Disconnected);
        }
        if characteristic != state.write_characteristic {
            return Err(LinkError::CharacteristicNotFound(characteristic));
        }
        if let Some(err) = state.write_failure.clone() {
            return Err(err);
        }

        state.writes.push(WrittenCommand {
            characteristic,
            data: data.to_vec(),
            mode,
        });

        match Command::decode(data) {
            Ok(Command::Configure { sequence_count }) => {
                state.configured_count = Some(sequence_count);
            }
            Ok(Command::StartDownload) => state.stream_recording(),
            Err(err) => trace!(error = %err, "simulator ignored write"),
        }
        Ok(())
    }

    fn supports_acknowledged_write(&self, characteristic: Uuid) -> bool {
        let state = lock(&self.state);
        characteristic == state.write_characteristic && state.acknowledged_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Notification;
    use futures::StreamExt;

    async fn connected() -> (MemoryTransport, MemoryPeer, NotificationStream) {
        let (mut transport, peer) = pair();
        let device = peer.advertise("PPG_HOLTER");
        transport.connect(&device, Duration::from_secs(1)).await.unwrap();
        let stream = transport.subscribe(NOTIFY_CHARACTERISTIC_UUID).await.unwrap();
        (transport, peer, stream)
    }

    #[test]
    fn test_device_frames_follow_firmware_order() {
        let sequence = RecordedSequence::from_samples(7, &[1, 2, 3, 4], &[5, 6, 7], 36.5);
        let frames = device_sequence_frames(&sequence, 12);

        // 16 bytes -> 2 chunks, 12 bytes -> 1 chunk, scalar, ack.
        assert_eq!(frames.len(), 5);

        let first = Notification::parse(&frames[0]).unwrap();
        assert_eq!(first.header.kind, FrameKind::ChannelA);
        assert_eq!(first.header.sequence, 7);
        assert_eq!((first.header.chunk_index, first.header.chunk_max), (0, 1));
        assert_eq!(first.payload.len(), 12);

        let second = Notification::parse(&frames[1]).unwrap();
        assert_eq!((second.header.chunk_index, second.header.chunk_max), (1, 1));
        assert_eq!(second.payload.len(), 4);

        let channel_b = Notification::parse(&frames[2]).unwrap();
        assert_eq!(channel_b.header.kind, FrameKind::ChannelB);
        assert_eq!(channel_b.header.chunk_max, 0);

        assert_eq!(Notification::parse(&frames[3]).unwrap().scalar(), Some(36.5));
        assert_eq!(frames[4], hex::decode("0000070000000000").unwrap());
    }

    #[test]
    fn test_filled_sequence_geometry() {
        let sequence = RecordedSequence::filled(0, 1, 2, 36.0);
        assert_eq!(sequence.channel_a.len(), 4096);
        // 4096 / 12 rounds up to 342 chunks per channel.
        assert_eq!(device_sequence_frames(&sequence, 12).len(), 342 * 2 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_waits_out_window_without_match() {
        let (mut transport, peer) = pair();
        peer.advertise("OTHER");

        let start = tokio::time::Instant::now();
        let found = transport.scan("PPG_HOLTER", Duration::from_secs(10)).await.unwrap();
        assert!(found.is_none());
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_start_command_streams_recording() {
        let (mut transport, peer, mut stream) = connected().await;
        peer.load_recording(vec![RecordedSequence::from_samples(3, &[9], &[8], 37.0)]);

        transport
            .write(WRITE_CHARACTERISTIC_UUID, &[0x02], WriteMode::WithResponse)
            .await
            .unwrap();

        let mut kinds = Vec::new();
        for _ in 0..4 {
            let frame = stream.next().await.unwrap();
            kinds.push(Notification::parse(&frame).unwrap().header.kind);
        }
        assert_eq!(
            kinds,
            vec![
                FrameKind::ChannelA,
                FrameKind::ChannelB,
                FrameKind::Scalar,
                FrameKind::SequenceAck
            ]
        );
    }

    #[tokio::test]
    async fn test_configure_is_recorded() {
        let (mut transport, peer, _stream) = connected().await;
        transport
            .write(
                WRITE_CHARACTERISTIC_UUID,
                &[0x01, 0x48, 0x00, 0x00, 0x00],
                WriteMode::WithoutResponse,
            )
            .await
            .unwrap();

        assert_eq!(peer.configured_count(), Some(72));
        assert_eq!(peer.writes()[0].mode, WriteMode::WithoutResponse);
    }

    #[tokio::test]
    async fn test_drop_link_ends_stream_and_rejects_writes() {
        let (mut transport, peer, mut stream) = connected().await;
        peer.drop_link();

        assert!(stream.next().await.is_none());
        let err = transport
            .write(WRITE_CHARACTERISTIC_UUID, &[0x02], WriteMode::WithResponse)
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::Disconnected);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (mut transport, peer) = pair();
        let device = peer.advertise("PPG_HOLTER");
        peer.fail_connect(Some(LinkError::ConnectTimeout(Duration::from_secs(30))));
        assert!(transport.connect(&device, Duration::from_secs(30)).await.is_err());

        peer.fail_connect(None);
        transport.connect(&device, Duration::from_secs(30)).await.unwrap();
        peer.fail_writes(Some(LinkError::WriteRejected("busy".into())));
        let err = transport
            .write(WRITE_CHARACTERISTIC_UUID, &[0x02], WriteMode::WithResponse)
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::WriteRejected("busy".into()));
    }

    #[test]
    fn test_acknowledged_write_capability() {
        let (transport, peer) = pair();
        assert!(transport.supports_acknowledged_write(WRITE_CHARACTERISTIC_UUID));
        assert!(!transport.supports_acknowledged_write(NOTIFY_CHARACTERISTIC_UUID));

        peer.set_acknowledged_writes(false);
        assert!(!transport.supports_acknowledged_write(WRITE_CHARACTERISTIC_UUID));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_characteristic() {
        let (mut transport, peer) = pair();
        let device = peer.advertise("PPG_HOLTER");
        transport.connect(&device, Duration::from_secs(1)).await.unwrap();

        let bogus = Uuid::from_u128(1);
        let err = transport.subscribe(bogus).await.err().unwrap();
        assert_eq!(err, LinkError::CharacteristicNotFound(bogus));
    }
}
