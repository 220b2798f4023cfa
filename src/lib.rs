//! # vitalink
//!
//! Host-side session engine for wearable vital-sign recorders.
//!
//! A recorder stores fixed-size measurement sequences (two waveform
//! channels plus one scalar) and streams them over Bluetooth Low Energy on
//! request, cut into small notifications. vitalink provides:
//!
//! - **Link lifecycle**: scan by name, connect, subscribe, disconnect
//! - **Commands**: configure the sequence count, start the download
//! - **Reassembly**: notifications routed into per-sequence buffers
//! - **Supervision**: completion by ack count, bounded by a global and a
//!   stall timeout
//! - **Finalization**: complete sequences decoded, turned into vital signs
//!   and committed to a sink in one batch
//!
//! ## Feature Flags
//!
//! - `sqlite` (default): SQLite measurement sink
//! - `btle`: `btleplug` transport for real hardware
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and the vital-sign deriver trait
//! - [`config`]: Engine configuration (builder and TOML)
//! - [`protocol`]: Notification and command wire formats
//! - [`session`]: Reassembly, timeout supervision and finalization
//! - [`transport`]: Transport trait, in-memory simulator, BLE adapter
//! - [`engine`]: Single-owner session loop and its handle
//! - [`client`]: High-level client
//! - [`sink`]: Measurement sinks
//!
//! ## Example Usage
//!
//! ```rust
//! use vitalink::prelude::*;
//! use vitalink::transport::memory::{self, RecordedSequence};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), VitalinkError> {
//! let (transport, peer) = memory::pair();
//! peer.advertise("PPG_HOLTER");
//! peer.load_recording(vec![RecordedSequence::filled(0, 100, 200, 36.6)]);
//!
//! let deriver = |_: &[i64], _: &[i64], scalar: f32| VitalSigns {
//!     temperature: f64::from(scalar),
//!     ..VitalSigns::default()
//! };
//! let mut client = VitalsClientBuilder::new().build(transport, deriver, MemorySink::new())?;
//!
//! assert!(client.connect().await);
//! assert!(client.configure(1).await);
//! assert!(client.start_download(1).await);
//! assert_eq!(client.finalize(1, 1).await, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod client;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::client::{VitalsClient, VitalsClientBuilder};
    pub use crate::config::{ConfigError, EngineConfig, EngineConfigBuilder};
    pub use crate::engine::{DownloadReport, EngineHandle, SessionEngine};
    pub use crate::session::{StopReason, TimeoutPolicy};
    pub use crate::sink::{MeasurementBlock, MeasurementRecord, MeasurementSink, MemorySink};
    pub use crate::transport::{ConnectionState, DeviceInfo, Transport};

    #[cfg(feature = "sqlite")]
    pub use crate::sink::sqlite::SqliteSink;

    #[cfg(feature = "btle")]
    pub use crate::transport::btle::BtleTransport;
}

// Re-export commonly used items at crate root
pub use crate::core::{EngineError, LinkError, VitalSigns, VitalinkError, VitalsDeriver};
pub use client::{VitalsClient, VitalsClientBuilder};
pub use config::EngineConfig;
