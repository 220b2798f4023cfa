//! Caller side of the session engine.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{info, instrument};

use super::request::{Reply, Request};
use crate::core::EngineError;
use crate::session::{SessionBuffer, StopReason, TimeoutPolicy, supervise};
use crate::transport::ConnectionState;

/// Summary of one download wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Why waiting ended.
    pub stop_reason: StopReason,
    /// Acks received.
    pub ack_count: u32,
    /// Acks the session waited for.
    pub expected_count: u32,
    /// Sequences with at least one frame.
    pub records: usize,
    /// Sequences meeting the completeness threshold.
    pub complete_records: usize,
    /// Time spent waiting.
    pub elapsed: Duration,
}

impl DownloadReport {
    /// At least one sequence is complete.
    pub fn is_success(&self) -> bool {
        self.complete_records > 0
    }
}

/// Cloneable handle to a running [`SessionEngine`](super::SessionEngine).
#[derive(Debug, Clone)]
pub struct EngineHandle {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ConnectionState>,
    timeouts: TimeoutPolicy,
    min_channel_bytes: usize,
}

impl EngineHandle {
    pub(super) fn new(
        requests: mpsc::Sender<Request>,
        state: watch::Receiver<ConnectionState>,
        timeouts: TimeoutPolicy,
        min_channel_bytes: usize,
    ) -> Self {
        Self {
            requests,
            state,
            timeouts,
            min_channel_bytes,
        }
    }

    async fn call<R>(&self, build: impl FnOnce(Reply<R>) -> Request) -> Result<R, EngineError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        response.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Current link state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Scan, connect and subscribe to notifications.
    pub async fn connect(&self) -> Result<(), EngineError> {
        self.call(|reply| Request::Connect { reply }).await?
    }

    /// Release the link. Never fails and never touches the session buffer.
    pub async fn disconnect(&self) {
        // A stopped engine holds no link.
        let _ = self.call(|reply| Request::Disconnect { reply }).await;
    }

    /// Arm the recorder for `sequence_count` sequences.
    pub async fn configure(&self, sequence_count: u32) -> Result<(), EngineError> {
        self.call(|reply| Request::Configure {
            sequence_count,
            reply,
        })
        .await?
    }

    /// Start a download and wait until it completes, is cancelled or times out.
    ///
    /// The session is reset on the engine before the start command is
    /// written. A timeout is not an error: check
    /// [`DownloadReport::is_success`].
    #[instrument(skip(self), level = "debug")]
    pub async fn start_download(&self, expected_count: u32) -> Result<DownloadReport, EngineError> {
        let started = Instant::now();
        let progress = self
            .call(|reply| Request::StartDownload {
                expected_count,
                reply,
            })
            .await??;

        let (stop_reason, last) = supervise(&self.timeouts, progress).await;
        let buffer = self.snapshot().await?;

        let report = DownloadReport {
            stop_reason,
            ack_count: last.ack_count,
            expected_count: last.expected_count,
            records: buffer.len(),
            complete_records: buffer.complete_count(self.min_channel_bytes),
            elapsed: started.elapsed(),
        };
        info!(
            ?stop_reason,
            ack_count = report.ack_count,
            complete = report.complete_records,
            records = report.records,
            "download finished"
        );
        Ok(report)
    }

    /// Ask a running download to stop. Returns false if none is running.
    pub async fn cancel_download(&self) -> Result<bool, EngineError> {
        self.call(|reply| Request::CancelDownload { reply }).await
    }

    /// Copy of the session buffer as it stands.
    pub async fn snapshot(&self) -> Result<SessionBuffer, EngineError> {
        self.call(|reply| Request::Snapshot { reply }).await
    }
}
