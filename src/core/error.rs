//! Error types for the session engine.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::protocol::{CommandError, FrameError};
use crate::sink::SinkError;

/// Transport-level failures (connect, subscribe, write).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No Bluetooth adapter is available on this host.
    #[error("no bluetooth adapter available")]
    NoAdapter,

    /// Scan did not finish within its window.
    #[error("scan timed out after {0:?}")]
    ScanTimeout(Duration),

    /// Connection was not established within its bound.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A required characteristic is missing on the peer.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The link is gone.
    #[error("link disconnected")]
    Disconnected,

    /// The peer or stack refused a write.
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Any other backend fault.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the session engine to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Scan finished without a matching device.
    #[error("device {name:?} not found")]
    DeviceNotFound {
        /// Name filter that was used.
        name: String,
    },

    /// Transport fault.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// A command needs an active link.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a live link.
    #[error("already connected")]
    AlreadyConnected,

    /// The session loop has shut down.
    #[error("session engine stopped")]
    EngineStopped,
}

/// Top-level vitalink errors.
#[derive(Debug, Error)]
pub enum VitalinkError {
    /// Engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Notification frame error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Command frame error.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Measurement sink error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_converts_into_engine_error() {
        let err: EngineError = LinkError::Disconnected.into();
        assert_eq!(err, EngineError::Link(LinkError::Disconnected));
        assert_eq!(err.to_string(), "link error: link disconnected");
    }

    #[test]
    fn test_device_not_found_message() {
        let err = EngineError::DeviceNotFound {
            name: "PPG_HOLTER".into(),
        };
        assert_eq!(err.to_string(), "device \"PPG_HOLTER\" not found");
    }
}
