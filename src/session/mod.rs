//! Download session: reassembly state, timeout supervision and
//! finalization into a sink.

mod buffer;
mod finalize;
mod reassembly;
mod supervisor;

pub use buffer::{Channel, SequenceRecord, SessionBuffer};
pub use finalize::{Finalizer, decode_samples};
pub use reassembly::{FrameOutcome, SessionState};
pub use supervisor::{SessionProgress, StopReason, TimeoutPolicy, supervise};
