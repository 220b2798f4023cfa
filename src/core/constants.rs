//! Protocol constants for the wearable download protocol.
//!
//! These values are fixed by the device firmware and MUST NOT be changed
//! unless the firmware changes with them.

use std::time::Duration;

use uuid::Uuid;

// =============================================================================
// DEVICE IDENTITY
// =============================================================================

/// Advertised name of the wearable recorder.
pub const DEFAULT_DEVICE_NAME: &str = "PPG_HOLTER";

/// Primary GATT service exposed by the recorder.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x9ecadc24_0ee5_a9e0_93f3_a3b50100406e);

/// Characteristic the device notifies telemetry on (device -> host).
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x9ecadc24_0ee5_a9e0_93f3_a3b50300406e);

/// Characteristic the host writes commands to (host -> device).
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x9ecadc24_0ee5_a9e0_93f3_a3b50900406e);

// =============================================================================
// COMMAND OPCODES
// =============================================================================

/// Configure: `[0x01][count: u32 LE]`.
pub const OPCODE_CONFIGURE: u8 = 0x01;

/// Start download: `[0x02]`.
pub const OPCODE_START_DOWNLOAD: u8 = 0x02;

/// Configure command size (opcode + u32).
pub const CONFIGURE_FRAME_SIZE: usize = 5;

// =============================================================================
// NOTIFICATION FRAMES
// =============================================================================

/// Sequence acknowledgment tag.
pub const TAG_SEQUENCE_ACK: u8 = 0;

/// Channel A waveform payload tag.
pub const TAG_CHANNEL_A: u8 = 1;

/// Channel B waveform payload tag.
pub const TAG_CHANNEL_B: u8 = 2;

/// Scalar (temperature) payload tag.
pub const TAG_SCALAR: u8 = 3;

/// Notification header size (tag + reserved + seq + chunk index + chunk max).
pub const NOTIFICATION_HEADER_SIZE: usize = 8;

/// Scalar payload size (f32 LE).
pub const SCALAR_PAYLOAD_SIZE: usize = 4;

/// Payload bytes per waveform notification sent by the firmware.
pub const DEVICE_CHUNK_PAYLOAD: usize = 12;

// =============================================================================
// SEQUENCE GEOMETRY
// =============================================================================

/// Samples per waveform channel in one sequence.
pub const SAMPLES_PER_CHANNEL: usize = 1024;

/// Bytes per raw waveform sample (u32 LE).
pub const BYTES_PER_SAMPLE: usize = 4;

/// Minimum bytes per channel for a sequence to be complete.
pub const MIN_CHANNEL_BYTES: usize = SAMPLES_PER_CHANNEL * BYTES_PER_SAMPLE;

/// Expected sequence count used when nothing was configured (3 per hour over 24 h).
pub const DEFAULT_EXPECTED_SEQUENCES: u32 = 72;

// =============================================================================
// TIMING
// =============================================================================

/// Scan window for finding the recorder.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on establishing the link once the recorder is found.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling on a whole download session.
pub const GLOBAL_SESSION_TIMEOUT: Duration = Duration::from_secs(180);

/// Ceiling on silence between two notifications.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(20);

/// How often a waiting caller checks the session.
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Depth of the request queue into the session loop.
pub const REQUEST_QUEUE_DEPTH: usize = 16;
