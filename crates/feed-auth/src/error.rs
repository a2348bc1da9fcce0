//! Authentication error types.

use feed_core::Segment;
use thiserror::Error;

/// Failure while opening, renewing or closing a session.
///
/// `Rejected` is recoverable by re-entering credentials. `Transport` is
/// reported to the caller unchanged; retry policy belongs to whoever
/// schedules the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The exchange refused the key pair or the session token.
    #[error("rejected by exchange (code {code:?}): {msg}")]
    Rejected { code: Option<i64>, msg: String },

    /// The request never got an answer from the exchange, or got a server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange accepted the request but returned no session token.
    #[error("response carried no session token")]
    MissingToken,

    #[error("{0} session is not authenticated")]
    NotAuthenticated(Segment),
}

impl AuthError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
