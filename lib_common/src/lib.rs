//! Shared library for the ticker snapshot service.
//!
//! Modules are gated by cargo features so a consumer can pull in only the
//! synchronous core (`core`) or the full exchange ingestion stack
//! (`ingestors`).

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ingestors")]
pub mod ingestors;

// Re-export the types every consumer needs
#[cfg(feature = "core")]
pub use crate::core::{FeedState, FeedStatus, Quote, Slot, TickerContext, TickerRecord};
