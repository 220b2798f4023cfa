//! The session loop.

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

use super::handle::EngineHandle;
use super::request::Request;
use crate::config::EngineConfig;
use crate::core::constants::DEFAULT_EXPECTED_SEQUENCES;
use crate::core::{EngineError, LinkError};
use crate::protocol::{Command, WriteMode};
use crate::session::{FrameOutcome, SessionProgress, SessionState};
use crate::transport::{ConnectionState, NotificationStream, Transport};

/// Owner of the transport and the download session.
pub struct SessionEngine<T: Transport> {
    transport: T,
    config: EngineConfig,
    requests: mpsc::Receiver<Request>,
    state: watch::Sender<ConnectionState>,
    notifications: Option<NotificationStream>,
    session: SessionState,
    progress: Option<watch::Sender<SessionProgress>>,
    configured_count: Option<u32>,
}

impl<T: Transport> SessionEngine<T> {
    fn new(transport: T, config: EngineConfig) -> (Self, EngineHandle) {
        let (request_tx, requests) = mpsc::channel(config.request_queue_depth.max(1));
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handle = EngineHandle::new(
            request_tx,
            state_rx,
            config.timeouts,
            config.min_channel_bytes,
        );

        let engine = Self {
            transport,
            requests,
            state,
            notifications: None,
            session: SessionState::new(DEFAULT_EXPECTED_SEQUENCES, Instant::now()),
            progress: None,
            configured_count: None,
            config,
        };
        (engine, handle)
    }

    /// Run the loop on the current tokio runtime.
    ///
    /// The loop ends once every handle is dropped.
    pub fn spawn(transport: T, config: EngineConfig) -> EngineHandle {
        let (engine, handle) = Self::new(transport, config);
        tokio::spawn(engine.run());
        handle
    }

    /// Run the loop on its own thread with a current-thread runtime.
    ///
    /// Handles may be used from any runtime.
    pub fn spawn_dedicated(transport: T, config: EngineConfig) -> std::io::Result<EngineHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (engine, handle) = Self::new(transport, config);

        std::thread::Builder::new()
            .name("vitalink-session".into())
            .spawn(move || runtime.block_on(engine.run()))?;
        Ok(handle)
    }

    async fn run(mut self) {
        info!(device = %self.config.device_name, "session engine started");

        loop {
            // Frames queued before a request belong to the session that was
            // current when they arrived, so drain them first.
            tokio::select! {
                biased;

                frame = next_notification(&mut self.notifications) => match frame {
                    Some(bytes) => self.on_frame(&bytes),
                    None => self.on_link_lost(),
                },
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        self.release().await;
        info!("session engine stopped");
    }

    async fn handle(&mut self, request: Request) {
        trace!(request = request.name(), "request received");

        // A dropped reply channel means the caller gave up; nothing to do.
        match request {
            Request::Connect { reply } => {
                let _ = reply.send(self.connect().await);
            }
            Request::Disconnect { reply } => {
                self.release().await;
                let _ = reply.send(());
            }
            Request::Configure {
                sequence_count,
                reply,
            } => {
                let _ = reply.send(self.configure(sequence_count).await);
            }
            Request::StartDownload {
                expected_count,
                reply,
            } => {
                let _ = reply.send(self.start_download(expected_count).await);
            }
            Request::CancelDownload { reply } => {
                let _ = reply.send(self.cancel_download());
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.session.buffer().clone());
            }
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(%previous, %next, "connection state changed");
        }
    }

    #[instrument(skip(self), fields(device = %self.config.device_name))]
    async fn connect(&mut self) -> Result<(), EngineError> {
        if self.connection_state() == ConnectionState::Connected {
            return Err(EngineError::AlreadyConnected);
        }

        self.set_state(ConnectionState::Scanning);
        match self.establish().await {
            Ok(stream) => {
                self.notifications = Some(stream);
                self.set_state(ConnectionState::Connected);
                info!("recorder connected");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                self.transport.disconnect().await;
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn establish(&mut self) -> Result<NotificationStream, EngineError> {
        let name = self.config.device_name.clone();
        let window = self.config.scan_timeout;

        let device = self
            .transport
            .scan(&name, window)
            .await?
            .ok_or(EngineError::DeviceNotFound { name })?;
        debug!(id = %device.id, "recorder found");

        let bound = self.config.connect_timeout;
        timeout(bound, self.transport.connect(&device, bound))
            .await
            .map_err(|_| LinkError::ConnectTimeout(bound))??;

        Ok(self
            .transport
            .subscribe(self.config.notify_characteristic)
            .await?)
    }

    /// Drop the link. The session buffer is left alone.
    async fn release(&mut self) {
        self.notifications = None;
        self.transport.disconnect().await;
        if self.connection_state() != ConnectionState::Disconnected {
            info!("recorder disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn on_link_lost(&mut self) {
        self.notifications = None;
        self.set_state(ConnectionState::Disconnected);
        warn!(
            ack_count = self.session.ack_count(),
            expected_count = self.session.expected_count(),
            "link lost"
        );
    }

    async fn send(&mut self, command: Command, mode: WriteMode) -> Result<(), EngineError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(EngineError::NotConnected);
        }
        self.transport
            .write(self.config.write_characteristic, &command.encode(), mode)
            .await?;
        debug!(?command, ?mode, "command written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn configure(&mut self, sequence_count: u32) -> Result<(), EngineError> {
        let command = Command::Configure { sequence_count };
        let acknowledged = self
            .transport
            .supports_acknowledged_write(self.config.write_characteristic);

        self.send(command, command.write_mode(acknowledged)).await?;
        self.configured_count = Some(sequence_count);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn start_download(
        &mut self,
        expected_count: u32,
    ) -> Result<watch::Receiver<SessionProgress>, EngineError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(EngineError::NotConnected);
        }
        if let Some(configured) = self.configured_count.filter(|c| *c != expected_count) {
            warn!(configured, expected_count, "expected count differs from configured count");
        }

        // Reset before the command goes out so no frame of the new download
        // lands in the old buffer.
        self.session.reset(expected_count, Instant::now());
        let (progress, receiver) = watch::channel(self.session.progress());
        self.progress = Some(progress);

        let command = Command::StartDownload;
        let acknowledged = self
            .transport
            .supports_acknowledged_write(self.config.write_characteristic);
        if let Err(err) = self.send(command, command.write_mode(acknowledged)).await {
            error!(error = %err, "start command failed");
            self.progress = None;
            return Err(err);
        }

        info!(expected_count, "download started");
        Ok(receiver)
    }

    fn cancel_download(&mut self) -> bool {
        let Some(progress) = &self.progress else {
            return false;
        };
        // Nobody waits once the download stopped on a timeout.
        if progress.is_closed() {
            self.progress = None;
            return false;
        }
        if self.session.is_done() {
            return false;
        }
        progress.send_modify(|p| p.cancelled = true);
        info!(ack_count = self.session.ack_count(), "download cancelled");
        true
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        let outcome = self.session.on_notification(bytes, Instant::now());
        if matches!(outcome, FrameOutcome::Discarded(_)) {
            return;
        }

        if let FrameOutcome::Acked {
            completed: true, ..
        } = outcome
        {
            info!(ack_count = self.session.ack_count(), "all sequences acknowledged");
        }

        if let Some(progress) = &self.progress {
            let snapshot = self.session.progress();
            progress.send_modify(|p| {
                *p = SessionProgress {
                    cancelled: p.cancelled,
                    ..snapshot
                }
            });
        }
    }
}

/// Next notification, or pending forever without a subscription.
async fn next_notification(stream: &mut Option<NotificationStream>) -> Option<Vec<u8>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
