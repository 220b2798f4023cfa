//! Wire protocol between host and recorder.
//!
//! - **Notifications** (device -> host): [`Notification`], [`FrameKind`]
//! - **Commands** (host -> device): [`Command`], [`WriteMode`]

mod command;
mod frame;

pub use command::{Command, CommandError, WriteMode};
pub use frame::{FrameError, FrameKind, Notification, NotificationHeader, encode_notification};
