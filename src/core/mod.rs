//! Core constants, error types and traits (always included).

pub mod constants;
mod error;
mod traits;

pub use error::{EngineError, LinkError, VitalinkError};
pub use traits::{VitalSigns, VitalsDeriver};
