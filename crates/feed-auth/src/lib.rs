//! # feed-auth
//!
//! Credential and session lifecycle for private (user-data) streams.
//!
//! Each market segment runs its own state machine
//! (`Unauthenticated → Authenticating → Authenticated`). A session token is
//! issued when the key pair is accepted and must be renewed before the
//! exchange lets it expire. Renewal scheduling belongs to the caller; this
//! crate only performs the renewal and reports the outcome.
//!
//! ## Supported exchanges
//!
//! | Exchange | Module    | Segments | Session token |
//! |----------|-----------|----------|---------------|
//! | Binance  | `binance` | spot, um | listen key    |

pub mod binance;
pub mod credentials;
pub mod error;
pub mod event;
pub mod lifecycle;

use async_trait::async_trait;
use feed_core::Segment;

pub use credentials::{
    CredentialPrompt, CredentialSource, EnvCredentialSource, KeyPair, NonInteractivePrompt,
    StaticCredentials,
};
pub use error::AuthError;
pub use event::{SessionEvent, SessionEventReceiver, SessionEventSender};
pub use lifecycle::{AuthOutcome, AuthState, CredentialLifecycle, Session};

/// Exchange-side session operations for one segment.
///
/// Implementations perform network I/O and report the outcome; they keep no
/// session state of their own.
#[async_trait]
pub trait SessionEndpoint: Send + Sync {
    fn segment(&self) -> Segment;

    /// Validate `keys` and open a session. Returns the session token.
    async fn open(&self, keys: &KeyPair) -> Result<String, AuthError>;

    /// Extend the session. Returns the token to use from now on.
    async fn renew(&self, keys: &KeyPair, token: &str) -> Result<String, AuthError>;

    /// Invalidate the session token.
    async fn close(&self, keys: &KeyPair, token: &str) -> Result<(), AuthError>;
}
