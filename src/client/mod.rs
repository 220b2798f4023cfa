//! Client API.
//!
//! High-level, bool-returning API over the session engine.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
