//! Timeout supervision for an outstanding download.
//!
//! The waiting caller polls a [`SessionProgress`] snapshot published by the
//! session loop and stops on the first of:
//!
//! 1. the session was marked done by the ack rule,
//! 2. the download was cancelled,
//! 3. the global ceiling elapsed since the download started,
//! 4. the stall ceiling elapsed since the last accepted frame.
//!
//! The supervisor only unblocks the caller. Whether the download succeeded
//! is decided afterwards from record completeness.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::core::constants::{COMPLETION_POLL_INTERVAL, GLOBAL_SESSION_TIMEOUT, STALL_TIMEOUT};

/// Snapshot of a download as seen by the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    /// Acks the session waits for.
    pub expected_count: u32,
    /// Acks received.
    pub ack_count: u32,
    /// When the download was requested.
    pub started_at: Instant,
    /// When the last accepted frame arrived.
    pub last_activity: Instant,
    /// Ack count reached the expected count.
    pub done: bool,
    /// The caller cancelled the download.
    pub cancelled: bool,
}

/// Why waiting on a download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Every expected ack arrived.
    Completed,
    /// The caller cancelled.
    Cancelled,
    /// The global ceiling elapsed.
    GlobalTimeout,
    /// No frame arrived within the stall ceiling.
    Stalled,
    /// The session loop dropped the session (shutdown or a newer download).
    EngineClosed,
}

impl StopReason {
    /// Whether the wait ended on one of the two ceilings.
    pub fn is_timeout(self) -> bool {
        matches!(self, Self::GlobalTimeout | Self::Stalled)
    }
}

/// Timeout ceilings and the poll period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Ceiling on the whole download.
    #[serde(rename = "global_timeout_secs", with = "secs")]
    pub global: Duration,
    /// Ceiling on silence between frames.
    #[serde(rename = "stall_timeout_secs", with = "secs")]
    pub stall: Duration,
    /// Poll period of the waiter.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            global: GLOBAL_SESSION_TIMEOUT,
            stall: STALL_TIMEOUT,
            poll_interval: COMPLETION_POLL_INTERVAL,
        }
    }
}

impl TimeoutPolicy {
    /// Decide whether waiting should stop at `now`.
    pub fn evaluate(&self, progress: &SessionProgress, now: Instant) -> Option<StopReason> {
        if progress.done {
            Some(StopReason::Completed)
        } else if progress.cancelled {
            Some(StopReason::Cancelled)
        } else if now.saturating_duration_since(progress.started_at) > self.global {
            Some(StopReason::GlobalTimeout)
        } else if now.saturating_duration_since(progress.last_activity) > self.stall {
            Some(StopReason::Stalled)
        } else {
            None
        }
    }
}

/// Wait on a download until it completes, is cancelled or times out.
///
/// Returns the stop reason and the last snapshot seen.
pub async fn supervise(
    policy: &TimeoutPolicy,
    mut progress: watch::Receiver<SessionProgress>,
) -> (StopReason, SessionProgress) {
    // `interval` panics on a zero period.
    let period = policy.poll_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let closed = progress.has_changed().is_err();
        let snapshot = *progress.borrow_and_update();

        if let Some(reason) = policy.evaluate(&snapshot, Instant::now()) {
            debug!(?reason, ack_count = snapshot.ack_count, "download wait ended");
            return (reason, snapshot);
        }
        if closed {
            debug!(ack_count = snapshot.ack_count, "session dropped while waiting");
            return (StopReason::EngineClosed, snapshot);
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_at(now: Instant) -> SessionProgress {
        SessionProgress {
            expected_count: 72,
            ack_count: 0,
            started_at: now,
            last_activity: now,
            done: false,
            cancelled: false,
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.global, Duration::from_secs(180));
        assert_eq!(policy.stall, Duration::from_secs(20));
        assert_eq!(policy.poll_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_evaluate_precedence() {
        let policy = TimeoutPolicy::default();
        let start = Instant::now();
        let mut progress = progress_at(start);

        assert_eq!(policy.evaluate(&progress, start + Duration::from_secs(5)), None);

        let late = start + Duration::from_secs(200);
        assert_eq!(policy.evaluate(&progress, late), Some(StopReason::GlobalTimeout));

        progress.cancelled = true;
        assert_eq!(policy.evaluate(&progress, late), Some(StopReason::Cancelled));

        progress.done = true;
        assert_eq!(policy.evaluate(&progress, late), Some(StopReason::Completed));
    }

    #[test]
    fn test_stall_boundary() {
        let policy = TimeoutPolicy::default();
        let start = Instant::now();
        let mut progress = progress_at(start);
        progress.last_activity = start + Duration::from_secs(30);

        let at_limit = progress.last_activity + Duration::from_secs(20);
        assert_eq!(policy.evaluate(&progress, at_limit), None);

        let past_limit = at_limit + Duration::from_millis(1);
        assert_eq!(policy.evaluate(&progress, past_limit), Some(StopReason::Stalled));
    }

    #[test]
    fn test_timeout_classification() {
        assert!(StopReason::Stalled.is_timeout());
        assert!(StopReason::GlobalTimeout.is_timeout());
        assert!(!StopReason::Completed.is_timeout());
        assert!(!StopReason::Cancelled.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_fires_before_global() {
        let start = Instant::now();
        let (_tx, rx) = watch::channel(progress_at(start));

        let (reason, _) = supervise(&TimeoutPolicy::default(), rx).await;

        assert_eq!(reason, StopReason::Stalled);
        let waited = start.elapsed();
        assert!(waited > Duration::from_secs(20));
        assert!(waited < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_fires_despite_activity() {
        let start = Instant::now();
        let (tx, rx) = watch::channel(progress_at(start));

        let feeder = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                if tx.is_closed() {
                    break;
                }
                tx.send_modify(|p| p.last_activity = Instant::now());
            }
        });

        let (reason, last) = supervise(&TimeoutPolicy::default(), rx).await;
        feeder.abort();

        assert_eq!(reason, StopReason::GlobalTimeout);
        assert!(start.elapsed() > Duration::from_secs(180));
        assert!(start.elapsed() < Duration::from_secs(181));
        assert!(last.last_activity > start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_signal_ends_wait_on_next_poll() {
        let start = Instant::now();
        let (tx, rx) = watch::channel(progress_at(start));

        let waiter = tokio::spawn(async move { supervise(&TimeoutPolicy::default(), rx).await });
        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send_modify(|p| {
            p.ack_count = 72;
            p.done = true;
        });

        let (reason, last) = waiter.await.unwrap();
        assert_eq!(reason, StopReason::Completed);
        assert_eq!(last.ack_count, 72);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_session_ends_wait() {
        let (tx, rx) = watch::channel(progress_at(Instant::now()));
        drop(tx);

        let (reason, _) = supervise(&TimeoutPolicy::default(), rx).await;
        assert_eq!(reason, StopReason::EngineClosed);
    }
}
