//! # feed-md
//!
//! Event normalization and dispatch for exchange market data and user-data
//! streams.
//!
//! ## Architecture
//!
//! ```text
//! transport ──► Router::dispatch_text(segment, text)
//!                 │  classify envelope (stream data / notification / ack)
//!                 │  split batches, resolve (segment, event type)
//!                 ▼
//!               HandlerTree ──► handler fn ──► CanonicalStore::put
//! ```
//!
//! - [`router`] — envelope decoding, handler resolution, error reporting
//! - [`envelope`] — inbound message classification
//! - [`binance`] — event taxonomy, typed records, handlers, stream names
//! - [`ws_helper`] — binds a WebSocket connection to the router
//! - [`json_util`] — numeric parsing helpers

pub mod binance;
pub mod envelope;
pub mod error;
pub mod json_util;
pub mod router;
pub mod ws_helper;

pub use error::{DispatchError, HandlerError, UnresolvedReason};
pub use router::{DispatchReport, HandlerTree, Router};
