//! # feed-core
//!
//! Shared kernel for the market data feed workspace, providing:
//!
//! - **Types** (`types`) — exchange and market-segment identifiers
//! - **Canonical store** (`store`) — latest-value cache keyed by
//!   exchange / symbol / segment / event type
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `FeedError` via thiserror
//! - **WebSocket** (`ws`) — WS client with auto-reconnect
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use store::{CanonicalStore, StoreKey};
pub use types::*;
