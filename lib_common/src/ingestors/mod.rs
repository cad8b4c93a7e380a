//! # Data Ingestors Module
//!
//! Everything that talks to the exchange. The ingestor turns the exchange's
//! JSON-RPC WebSocket stream into writes on the shared
//! [`TickerContext`](crate::core::TickerContext).
//!
//! ## Contained Modules:
//! - **`protocol`**: Command, response and ticker notification wire types.
//! - **`transport`**: The `FeedTransport` seam and its `tokio-tungstenite`
//!   implementation.
//! - **`hitbtc_wss`**: Static-field initialization, subscription and the
//!   streaming loop.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// JSON-RPC wire types.
pub mod protocol;
/// Text-frame transport to the exchange.
pub mod transport;
/// The ticker ingestor.
pub mod hitbtc_wss;

// --- Public API Re-exports ---
pub use hitbtc_wss::{IngestOutcome, TickerWssIngestor};
pub use transport::{FeedError, FeedTransport, WsTransport};
