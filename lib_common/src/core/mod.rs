//! # Core Engine Module
//!
//! The concurrency-sensitive heart of the ticker cache. Everything in here is
//! synchronous and runtime-agnostic; the async plumbing lives in
//! [`crate::ingestors`] and in the `servers` crate.
//!
//! ## Core Components:
//!
//! - **`registry`**: Immutable symbol <-> slot mapping, fixed at startup.
//!
//! - **`store`**: One record per slot, each behind its own guard. Single-record
//!   reads are never torn; full-table reads are a set of per-slot snapshots.
//!
//! - **`health`**: Atomic feed state and ingestion counters, so readers can
//!   tell a live cache from a frozen one.
//!
//! - **`context`**: The explicit owner of the three above, shared by the
//!   ingestion task and the HTTP handlers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Symbol <-> slot mapping.
pub mod registry;
/// Per-slot guarded ticker records.
pub mod store;
/// Feed state and ingestion counters.
pub mod health;
/// Shared owner of registry, store and health.
pub mod context;

// --- Public API Re-exports ---
pub use context::TickerContext;
pub use health::{FeedHealth, FeedState, FeedStatus};
pub use registry::{RegistryError, Slot, SymbolRegistry};
pub use store::{Quote, SnapshotStore, StaticFields, TickerRecord};
