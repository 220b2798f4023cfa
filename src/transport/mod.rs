//! Transport layer.
//!
//! The session engine talks to the recorder through the [`Transport`] trait:
//! scan by name, connect, subscribe to the notification characteristic and
//! write command frames. Two implementations ship with the crate:
//!
//! - [`memory::MemoryTransport`]: in-process link driven by a
//!   [`memory::MemoryPeer`], including a recorder simulator.
//! - `btle::BtleTransport` (feature `btle`): the platform Bluetooth stack
//!   through `btleplug`.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Client / Engine                 │
//! ├─────────────────────────────────────────┤
//! │         Transport trait                 │  ← This module
//! │   scan, connect, subscribe, write       │
//! ├─────────────────────────────────────────┤
//! │     btleplug  │  in-memory simulator    │
//! └─────────────────────────────────────────┘
//! ```

pub mod memory;

#[cfg(feature = "btle")]
#[cfg_attr(docsrs, doc(cfg(feature = "btle")))]
pub mod btle;

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::core::LinkError;
use crate::protocol::WriteMode;

/// Stream of raw notification payloads from one characteristic.
///
/// The stream ends when the link drops.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// A peripheral found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Backend-specific peripheral identifier.
    pub id: String,
    /// Advertised local name.
    pub name: String,
}

/// Link lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Scanning or connecting.
    Scanning,
    /// Link up and notifications subscribed.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Link to one recorder.
///
/// Implementations are owned by the session loop and never shared, so
/// methods take `&mut self`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Scan for a peripheral advertising exactly `name`.
    ///
    /// Returns `Ok(None)` when the window elapses without a match.
    async fn scan(&mut self, name: &str, window: Duration) -> Result<Option<DeviceInfo>, LinkError>;

    /// Connect to a scanned peripheral and discover its services.
    async fn connect(&mut self, device: &DeviceInfo, timeout: Duration) -> Result<(), LinkError>;

    /// Release the link. Safe to call without one.
    async fn disconnect(&mut self);

    /// Enable notifications on `characteristic`.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationStream, LinkError>;

    /// Write `data` to `characteristic`.
    async fn write(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), LinkError>;

    /// Whether `characteristic` advertises acknowledged writes.
    fn supports_acknowledged_write(&self, characteristic: Uuid) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_default_and_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Scanning.to_string(), "scanning");
    }
}
