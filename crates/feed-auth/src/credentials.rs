//! Key pairs, where they come from, and what to do when they are missing or
//! rejected.

use feed_core::config::CredentialsConfig;
use tracing::{info, warn};

use crate::error::AuthError;

/// API key and secret for one exchange account.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub api_key: String,
    pub secret_key: String,
}

impl KeyPair {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl From<CredentialsConfig> for KeyPair {
    fn from(c: CredentialsConfig) -> Self {
        Self::new(c.api_key, c.secret_key)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where to look for a key pair when none was supplied.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> Option<KeyPair>;
}

/// Reads the key pair from two environment variables. Both must be set and
/// non-empty.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    pub api_key_var: String,
    pub secret_key_var: String,
}

impl Default for EnvCredentialSource {
    fn default() -> Self {
        Self {
            api_key_var: "BINANCE_API_KEY".into(),
            secret_key_var: "BINANCE_SECRET_KEY".into(),
        }
    }
}

impl CredentialSource for EnvCredentialSource {
    fn load(&self) -> Option<KeyPair> {
        let api_key = std::env::var(&self.api_key_var).ok().filter(|v| !v.is_empty())?;
        let secret_key = std::env::var(&self.secret_key_var).ok().filter(|v| !v.is_empty())?;
        info!("[auth] key pair loaded from ${}", self.api_key_var);
        Some(KeyPair { api_key, secret_key })
    }
}

/// A fixed answer. `StaticCredentials(None)` never finds anything.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<KeyPair>);

impl CredentialSource for StaticCredentials {
    fn load(&self) -> Option<KeyPair> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Decisions the lifecycle cannot make on its own. An interactive front end
/// asks the operator; a daemon answers from its configuration.
pub trait CredentialPrompt: Send + Sync {
    /// No key pair was supplied or found. `true` continues with public market
    /// data only, `false` abandons start-up.
    fn continue_unauthenticated(&self) -> bool;

    /// The key pair was refused. Return a replacement to retry with, or
    /// `None` to continue unauthenticated.
    fn request_credentials(&self, error: &AuthError) -> Option<KeyPair>;
}

/// Answers every question from a flag, never supplies new keys.
#[derive(Debug, Clone, Copy)]
pub struct NonInteractivePrompt {
    pub allow_unauthenticated: bool,
}

impl CredentialPrompt for NonInteractivePrompt {
    fn continue_unauthenticated(&self) -> bool {
        if !self.allow_unauthenticated {
            warn!("[auth] no credentials and unauthenticated mode not allowed");
        }
        self.allow_unauthenticated
    }

    fn request_credentials(&self, error: &AuthError) -> Option<KeyPair> {
        warn!("[auth] credentials not accepted ({error}), continuing without private streams");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pair_is_redacted_in_debug() {
        let keys = KeyPair::new("visible-key", "visible-secret");
        let dbg = format!("{keys:?}");
        assert!(!dbg.contains("visible-key"));
        assert!(!dbg.contains("visible-secret"));
    }

    #[test]
    fn env_source_requires_both_vars() {
        let source = EnvCredentialSource {
            api_key_var: "FEED_AUTH_TEST_KEY_UNSET_1".into(),
            secret_key_var: "FEED_AUTH_TEST_SECRET_UNSET_1".into(),
        };
        assert_eq!(source.load(), None);
    }

    #[test]
    fn static_source() {
        assert_eq!(StaticCredentials(None).load(), None);
        let keys = KeyPair::new("k", "s");
        assert_eq!(StaticCredentials(Some(keys.clone())).load(), Some(keys));
    }

    #[test]
    fn from_config_block() {
        let cfg: CredentialsConfig =
            serde_json::from_str(r#"{"api_key": "k", "secret_key": "s"}"#).unwrap();
        assert_eq!(KeyPair::from(cfg), KeyPair::new("k", "s"));
    }

    #[test]
    fn non_interactive_prompt() {
        let prompt = NonInteractivePrompt { allow_unauthenticated: true };
        assert!(prompt.continue_unauthenticated());
        assert_eq!(prompt.request_credentials(&AuthError::MissingToken), None);
        assert!(!NonInteractivePrompt { allow_unauthenticated: false }.continue_unauthenticated());
    }
}
