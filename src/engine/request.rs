//! Messages from handles to the session loop.

use tokio::sync::{oneshot, watch};

use crate::core::EngineError;
use crate::session::{SessionBuffer, SessionProgress};

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Request {
    Connect {
        reply: Reply<Result<(), EngineError>>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Configure {
        sequence_count: u32,
        reply: Reply<Result<(), EngineError>>,
    },
    StartDownload {
        expected_count: u32,
        reply: Reply<Result<watch::Receiver<SessionProgress>, EngineError>>,
    },
    CancelDownload {
        reply: Reply<bool>,
    },
    Snapshot {
        reply: Reply<SessionBuffer>,
    },
}

impl Request {
    /// Short name for logs.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Configure { .. } => "configure",
            Self::StartDownload { .. } => "start_download",
            Self::CancelDownload { .. } => "cancel_download",
            Self::Snapshot { .. } => "snapshot",
        }
    }
}
