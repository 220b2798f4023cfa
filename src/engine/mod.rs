//! Session engine.
//!
//! One task owns the transport and every piece of session state. Callers
//! talk to it through a cloneable [`EngineHandle`]; each request carries a
//! oneshot reply. Notifications are applied on the same task, strictly in
//! arrival order, so no lock guards the reassembly buffer.
//!
//! ```text
//!  caller ──► EngineHandle ──mpsc──► SessionEngine ──► Transport
//!     ▲                                   │
//!     └──── watch<SessionProgress> ◄──────┘  (one channel per download)
//! ```

#[allow(clippy::module_inception)]
mod engine;
mod handle;
mod request;

pub use engine::SessionEngine;
pub use handle::{DownloadReport, EngineHandle};
