//! Binance spot and USDT-margined futures streams.
//!
//! - [`taxonomy`] — event types and their `"e"` discriminators
//! - [`records`] — typed record shapes
//! - [`handlers`] — per-event handlers and the standard handler tree
//! - [`streams`] — endpoint URLs, stream names, SUBSCRIBE messages

pub mod handlers;
pub mod records;
pub mod streams;
pub mod taxonomy;
