//! Dispatch error taxonomy.
//!
//! None of these errors stop the router: each one is logged, attached to the
//! [`DispatchReport`](crate::router::DispatchReport) of the message that
//! caused it, and the offending record is dropped.

use feed_core::Segment;
use serde_json::Value;
use thiserror::Error;

use crate::binance::taxonomy::EventType;

/// Why a record could not be routed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The discriminator names no known event type.
    UnknownDiscriminator(String),
    /// The event type is known but nothing is registered for this segment.
    NoHandler(EventType),
    /// No discriminator, and the stream name matched no inference rule.
    MissingDiscriminator,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDiscriminator(tag) => write!(f, "unknown event type {tag:?}"),
            Self::NoHandler(et) => write!(f, "no handler registered for {et}"),
            Self::MissingDiscriminator => {
                f.write_str("no event type and none inferable from stream name")
            }
        }
    }
}

/// A record (or whole message) the router dropped.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler for the (segment, event type) pair.
    #[error("unresolved dispatch on {segment} stream {stream:?}: {reason}")]
    Unresolved {
        segment: Segment,
        stream: String,
        reason: UnresolvedReason,
        record: Value,
    },

    /// A handler exists but deliberately does not decode this event type.
    #[error("{event_type} on {segment} stream {stream:?} is not implemented")]
    NotImplemented {
        segment: Segment,
        event_type: EventType,
        stream: String,
    },

    /// The record did not match the shape its event type declares.
    #[error("cannot decode {event_type} on {segment} stream {stream:?}: {message}")]
    Decode {
        segment: Segment,
        event_type: EventType,
        stream: String,
        message: String,
    },

    /// The inbound text was not a JSON envelope.
    #[error("malformed envelope on {segment}: {message}")]
    MalformedEnvelope { segment: Segment, message: String },
}

impl DispatchError {
    /// True for the "we don't route this" class, as opposed to "we chose not
    /// to decode this".
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}

/// Failure inside a single handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// Neither the record nor the stream name identifies a symbol.
    #[error("record carries no symbol")]
    MissingSymbol,

    #[error("event type not implemented")]
    NotImplemented,
}
