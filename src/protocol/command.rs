//! Outbound command frames.
//!
//! Both commands go to the write characteristic:
//!
//! ```text
//! Configure:      [0x01][count: u32 LE]
//! Start download: [0x02]
//! ```

use thiserror::Error;

use crate::core::constants::{CONFIGURE_FRAME_SIZE, OPCODE_CONFIGURE, OPCODE_START_DOWNLOAD};

/// How a command is written to the characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Write request, the peer acknowledges.
    WithResponse,
    /// Write command, no acknowledgment.
    WithoutResponse,
}

/// Commands understood by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Arm the recorder for `sequence_count` sequences.
    Configure {
        /// Total sequences the next download will deliver.
        sequence_count: u32,
    },
    /// Stream every stored sequence.
    StartDownload,
}

impl Command {
    /// Opcode byte.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Configure { .. } => OPCODE_CONFIGURE,
            Self::StartDownload => OPCODE_START_DOWNLOAD,
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Configure { sequence_count } => {
                let mut buf = Vec::with_capacity(CONFIGURE_FRAME_SIZE);
                buf.push(OPCODE_CONFIGURE);
                buf.extend_from_slice(&sequence_count.to_le_bytes());
                buf
            }
            Self::StartDownload => vec![OPCODE_START_DOWNLOAD],
        }
    }

    /// Parse a command the way the recorder does.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        let (&opcode, rest) = bytes.split_first().ok_or(CommandError::Empty)?;
        match opcode {
            OPCODE_CONFIGURE => {
                let count: [u8; 4] = rest
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(CommandError::TooShort {
                        expected: CONFIGURE_FRAME_SIZE,
                        actual: bytes.len(),
                    })?;
                Ok(Self::Configure {
                    sequence_count: u32::from_le_bytes(count),
                })
            }
            OPCODE_START_DOWNLOAD => Ok(Self::StartDownload),
            other => Err(CommandError::UnknownOpcode(other)),
        }
    }

    /// Pick the write mode for this command.
    ///
    /// Configure follows the characteristic's advertised capability.
    /// Start download always requires an acknowledgment.
    pub fn write_mode(&self, supports_acknowledged: bool) -> WriteMode {
        match self {
            Self::Configure { .. } if !supports_acknowledged => WriteMode::WithoutResponse,
            _ => WriteMode::WithResponse,
        }
    }
}

/// Errors decoding a command frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No bytes at all.
    #[error("empty command")]
    Empty,

    /// Too few bytes for the opcode.
    #[error("command too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Required size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Opcode is not recognised.
    #[error("unknown opcode: 0x{0:02x}")]
    UnknownOpcode(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_encoding() {
        let frame = Command::Configure { sequence_count: 72 }.encode();
        assert_eq!(frame, hex::decode("0148000000").unwrap());

        let frame = Command::Configure {
            sequence_count: 0x0102_0304,
        }
        .encode();
        assert_eq!(frame, vec![0x01, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_start_download_encoding() {
        assert_eq!(Command::StartDownload.encode(), vec![0x02]);
        assert_eq!(Command::StartDownload.opcode(), 0x02);
    }

    #[test]
    fn test_decode_matches_device_parser() {
        assert_eq!(
            Command::decode(&[0x01, 0x90, 0x01, 0x00, 0x00]),
            Ok(Command::Configure { sequence_count: 400 })
        );
        assert_eq!(Command::decode(&[0x02]), Ok(Command::StartDownload));
        // Trailing bytes after start are ignored by the device.
        assert_eq!(Command::decode(&[0x02, 0xFF]), Ok(Command::StartDownload));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Command::decode(&[]), Err(CommandError::Empty));
        assert_eq!(
            Command::decode(&[0x01, 0x00, 0x00]),
            Err(CommandError::TooShort {
                expected: 5,
                actual: 3
            })
        );
        assert_eq!(Command::decode(&[0x7F]), Err(CommandError::UnknownOpcode(0x7F)));
    }

    #[test]
    fn test_write_mode_selection() {
        let configure = Command::Configure { sequence_count: 1 };
        assert_eq!(configure.write_mode(true), WriteMode::WithResponse);
        assert_eq!(configure.write_mode(false), WriteMode::WithoutResponse);

        assert_eq!(Command::StartDownload.write_mode(true), WriteMode::WithResponse);
        assert_eq!(Command::StartDownload.write_mode(false), WriteMode::WithResponse);
    }
}
