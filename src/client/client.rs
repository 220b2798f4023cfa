//! High-level recorder client.
//!
//! Provides `VitalsClient<D, K>`, which drives one recorder through the
//! session engine, derives vital signs with `D: VitalsDeriver` and stores
//! them in `K: MeasurementSink`.
//!
//! Operations report failure as `false` or `0` and log the cause; use
//! [`VitalsClient::handle`] for the `Result`-returning engine API.

use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::core::constants::BYTES_PER_SAMPLE;
use crate::core::{VitalinkError, VitalsDeriver};
use crate::engine::{DownloadReport, EngineHandle, SessionEngine};
use crate::session::Finalizer;
use crate::sink::{MeasurementBlock, MeasurementSink};
use crate::transport::{ConnectionState, Transport};

/// Builder for creating a `VitalsClient`.
#[derive(Debug, Default)]
pub struct VitalsClientBuilder {
    config: EngineConfig,
    dedicated_thread: bool,
}

impl VitalsClientBuilder {
    /// Create a new client builder with the firmware defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a complete engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the advertised name to connect to.
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    /// Run the session loop on its own thread instead of the caller's runtime.
    pub fn dedicated_thread(mut self, enabled: bool) -> Self {
        self.dedicated_thread = enabled;
        self
    }

    /// Validate the configuration and start the session engine.
    ///
    /// Without a dedicated thread this must be called inside a tokio runtime.
    pub fn build<T, D, K>(
        self,
        transport: T,
        deriver: D,
        sink: K,
    ) -> Result<VitalsClient<D, K>, VitalinkError>
    where
        T: Transport,
        D: VitalsDeriver,
        K: MeasurementSink,
    {
        self.config.validate()?;

        // Validation guarantees whole samples.
        let min_samples = self.config.min_channel_bytes / BYTES_PER_SAMPLE;
        let handle = if self.dedicated_thread {
            SessionEngine::spawn_dedicated(transport, self.config)?
        } else {
            SessionEngine::spawn(transport, self.config)
        };

        Ok(VitalsClient {
            handle,
            finalizer: Finalizer::new(deriver).with_min_samples(min_samples),
            sink,
            last_report: None,
        })
    }
}

/// Recorder client.
///
/// # Example
///
/// ```no_run
/// use vitalink::prelude::*;
/// use vitalink::transport::memory;
///
/// # async fn run() -> Result<(), VitalinkError> {
/// let (transport, _peer) = memory::pair();
/// let deriver = |_: &[i64], _: &[i64], scalar: f32| VitalSigns {
///     temperature: f64::from(scalar),
///     ..VitalSigns::default()
/// };
///
/// let mut client = VitalsClientBuilder::new().build(transport, deriver, MemorySink::new())?;
///
/// if client.connect().await && client.configure(72).await && client.start_download(72).await {
///     let stored = client.finalize(1, 1).await;
///     println!("stored {stored} measurements");
/// }
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct VitalsClient<D, K> {
    handle: EngineHandle,
    finalizer: Finalizer<D>,
    sink: K,
    last_report: Option<DownloadReport>,
}

impl<D: VitalsDeriver, K: MeasurementSink> VitalsClient<D, K> {
    /// Connect to the recorder. Returns false on any failure.
    pub async fn connect(&self) -> bool {
        match self.handle.connect().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "connect failed");
                false
            }
        }
    }

    /// Drop the link. Downloaded data stays available for `finalize`.
    pub async fn disconnect(&self) {
        self.handle.disconnect().await;
    }

    /// Arm the recorder for `sequence_count` sequences.
    pub async fn configure(&self, sequence_count: u32) -> bool {
        match self.handle.configure(sequence_count).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, sequence_count, "configure failed");
                false
            }
        }
    }

    /// Download and wait. True if at least one sequence is complete.
    pub async fn start_download(&mut self, expected_count: u32) -> bool {
        match self.handle.start_download(expected_count).await {
            Ok(report) => {
                self.last_report = Some(report);
                report.is_success()
            }
            Err(err) => {
                warn!(error = %err, expected_count, "download failed");
                false
            }
        }
    }

    /// Stop a running download early.
    pub async fn cancel_download(&self) -> bool {
        self.handle.cancel_download().await.unwrap_or(false)
    }

    /// Store every complete sequence of the last download under the given ids.
    ///
    /// Returns how many measurements were committed; 0 if storage failed.
    pub async fn finalize(&mut self, patient_id: i64, block_id: i64) -> u32 {
        let buffer = match self.handle.snapshot().await {
            Ok(buffer) => buffer,
            Err(err) => {
                error!(error = %err, "session snapshot unavailable");
                return 0;
            }
        };

        let block = MeasurementBlock::new(patient_id, block_id);
        match self.finalizer.finalize(&buffer, block, &mut self.sink) {
            Ok(count) => {
                info!(count, patient_id, block_id, "download finalized");
                count
            }
            Err(err) => {
                error!(error = %err, patient_id, block_id, "finalization failed");
                0
            }
        }
    }
}

impl<D, K> VitalsClient<D, K> {
    /// Current link state.
    pub fn connection_state(&self) -> ConnectionState {
        self.handle.connection_state()
    }

    /// Report of the last download that reached the wait stage.
    pub fn last_report(&self) -> Option<DownloadReport> {
        self.last_report
    }

    /// Engine handle for `Result`-level control.
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Measurement sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the client and return the sink.
    pub fn into_sink(self) -> K {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VitalSigns;
    use crate::session::StopReason;
    use crate::sink::MemorySink;
    use crate::transport::memory::{self, MemoryPeer, RecordedSequence};

    fn temperature_only(_: &[i64], _: &[i64], scalar: f32) -> VitalSigns {
        VitalSigns {
            temperature: f64::from(scalar),
            ..VitalSigns::default()
        }
    }

    type TestClient = VitalsClient<fn(&[i64], &[i64], f32) -> VitalSigns, MemorySink>;

    fn client() -> (TestClient, MemoryPeer) {
        let (transport, peer) = memory::pair();
        peer.advertise("PPG_HOLTER");
        let client = VitalsClientBuilder::new()
            .build(
                transport,
                temperature_only as fn(&[i64], &[i64], f32) -> VitalSigns,
                MemorySink::new(),
            )
            .unwrap();
        (client, peer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_report_false_without_link() {
        let (mut client, _peer) = client();

        assert!(!client.configure(72).await);
        assert!(!client.start_download(72).await);
        assert!(client.last_report().is_none());
        assert_eq!(client.finalize(1, 1).await, 0);
        assert_eq!(client.sink().commit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_and_finalize() {
        let (mut client, peer) = client();
        peer.load_recording(vec![
            RecordedSequence::filled(0, 1, 2, 36.5),
            RecordedSequence::filled(1, 1, 2, 36.7),
        ]);

        assert!(client.connect().await);
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert!(client.configure(2).await);
        assert!(client.start_download(2).await);
        assert_eq!(
            client.last_report().map(|r| r.stop_reason),
            Some(StopReason::Completed)
        );

        assert_eq!(client.finalize(5, 8).await, 2);
        let sink = client.into_sink();
        assert_eq!(sink.committed()[1].vitals.temperature, f64::from(36.7f32));
        assert_eq!(sink.committed()[0].block, MeasurementBlock::new(5, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reports_false_on_missing_device() {
        let (transport, _peer) = memory::pair();
        let client = VitalsClientBuilder::new()
            .device_name("NOBODY")
            .build(transport, temperature_only, MemorySink::new())
            .unwrap();

        assert!(!client.connect().await);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_agrees_with_report_threshold() {
        let (transport, peer) = memory::pair();
        peer.advertise("PPG_HOLTER");
        peer.load_recording(vec![RecordedSequence::from_samples(0, &[1; 16], &[2; 16], 36.5)]);
        let config = EngineConfig::builder().min_channel_bytes(64).build().unwrap();
        let mut client = VitalsClientBuilder::new()
            .config(config)
            .build(transport, temperature_only, MemorySink::new())
            .unwrap();

        assert!(client.connect().await);
        assert!(client.start_download(1).await);
        assert_eq!(client.last_report().unwrap().complete_records, 1);
        assert_eq!(client.finalize(1, 1).await, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (transport, _peer) = memory::pair();
        let result = VitalsClientBuilder::new()
            .device_name("")
            .build(transport, temperature_only, MemorySink::new());

        assert!(matches!(result, Err(VitalinkError::Config(_))));
    }
}
