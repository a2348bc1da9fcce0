//! Session lifecycle events.
//!
//! Published on an unbounded channel so a slow consumer never stalls renewal.

use feed_core::Segment;

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session token was issued; private streams can be subscribed.
    Authenticated { segment: Segment },

    /// The segment fell back to public data only.
    Unauthenticated { segment: Segment, reason: String },

    /// The session was extended. `token_changed` is set when the exchange
    /// issued a different token than the one in use.
    TokenRenewed { segment: Segment, token_changed: bool },

    /// Renewal failed. A rejection is followed by `Unauthenticated`; a
    /// transport error leaves the session as it was.
    RenewalFailed { segment: Segment, error: AuthError },

    /// The session token was closed at shutdown.
    Closed { segment: Segment },
}

impl SessionEvent {
    pub fn segment(&self) -> Segment {
        match self {
            Self::Authenticated { segment }
            | Self::Unauthenticated { segment, .. }
            | Self::TokenRenewed { segment, .. }
            | Self::RenewalFailed { segment, .. }
            | Self::Closed { segment } => *segment,
        }
    }
}

/// Sender half of the session event channel.
pub type SessionEventSender = tokio::sync::mpsc::UnboundedSender<SessionEvent>;

/// Receiver half of the session event channel.
pub type SessionEventReceiver = tokio::sync::mpsc::UnboundedReceiver<SessionEvent>;
