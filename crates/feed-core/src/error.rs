//! Typed error definitions shared across the feed.
//!
//! Provides [`FeedError`] for infrastructure errors that are more informative
//! than plain `anyhow::Error` strings. Dispatch and authentication errors live
//! next to the code that raises them (`feed-md`, `feed-auth`).

use thiserror::Error;

/// Infrastructure-level errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Identifier or payload parsing error.
    #[error("parse error: {0}")]
    Parse(String),
}
