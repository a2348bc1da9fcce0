//! Configuration parsing for the feed runner.
//!
//! All settings come from a single JSON file. Every block except `spot` or
//! `um` is optional and falls back to production defaults.
//!
//! # Example config
//!
//! ```json
//! {
//!   "feed": { "module_name": "binance_feed", "log_path": "/tmp/log" },
//!   "spot": { "symbols": ["BTCUSDT"], "streams": ["aggTrade", "bookTicker", "kline_1m"] },
//!   "um": { "global_streams": ["!bookTicker", "!markPrice@arr"] },
//!   "credentials": { "api_key": "...", "secret_key": "..." },
//!   "session": { "renew_interval_secs": 1800 },
//!   "notification_backoff_ms": 1000
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::FeedError;
use crate::types::Segment;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub feed: Option<ModuleMeta>,

    /// Spot market streams.
    #[serde(default)]
    pub spot: Option<ProductConfig>,

    /// USDT-margined futures streams.
    #[serde(default)]
    pub um: Option<ProductConfig>,

    /// Optional API key pair. Absent means "look in the environment".
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,

    /// Session-token endpoints and renewal cadence.
    #[serde(default)]
    pub session: SessionConfig,

    /// Pause after an exchange-pushed error notification, in milliseconds.
    #[serde(default = "default_notification_backoff_ms")]
    pub notification_backoff_ms: u64,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"feed-runner"`.
    pub fn module_name(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "feed-runner".into())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.feed.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Product block for one segment.
    pub fn product(&self, segment: Segment) -> Option<&ProductConfig> {
        match segment {
            Segment::Spot => self.spot.as_ref(),
            Segment::Um => self.um.as_ref(),
        }
    }

    /// Segments with at least one stream to subscribe.
    pub fn enabled_segments(&self) -> Vec<Segment> {
        Segment::ALL
            .into_iter()
            .filter(|s| self.product(*s).is_some_and(|p| !p.stream_names().is_empty()))
            .collect()
    }

    pub fn notification_backoff(&self) -> Duration {
        Duration::from_millis(self.notification_backoff_ms)
    }

    /// Reject configs that would start nothing.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.enabled_segments().is_empty() {
            return Err(FeedError::Config(
                "no streams configured: add symbols or global_streams to `spot` or `um`".into(),
            ));
        }
        if self.session.renew_interval_secs == 0 {
            return Err(FeedError::Config("session.renew_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Streams to activate for one market segment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductConfig {
    /// Symbols to subscribe (e.g. `["BTCUSDT", "ETHUSDT"]`).
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Per-symbol stream types (e.g. `["aggTrade", "kline_1m", "depth5@100ms"]`).
    /// Defaults to `aggTrade` when symbols are given without stream types.
    #[serde(default)]
    pub streams: Vec<String>,

    /// Streams not bound to one symbol (e.g. `"!bookTicker"`, `"!markPrice@arr"`).
    #[serde(default)]
    pub global_streams: Vec<String>,

    /// Combined-stream WebSocket URL override.
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl ProductConfig {
    /// Every stream name this block subscribes to: `<symbol>@<type>` pairs
    /// first, then the global streams.
    pub fn stream_names(&self) -> Vec<String> {
        let types: Vec<&str> = if self.streams.is_empty() {
            vec!["aggTrade"]
        } else {
            self.streams.iter().map(String::as_str).collect()
        };

        let capacity = self.symbols.len() * types.len() + self.global_streams.len();
        let mut names = Vec::with_capacity(capacity);
        for symbol in &self.symbols {
            let lower = symbol.to_lowercase();
            for t in &types {
                names.push(format!("{lower}@{t}"));
            }
        }
        names.extend(self.global_streams.iter().cloned());
        names
    }
}

/// API key pair supplied in the config file.
#[derive(Clone, Deserialize)]
pub struct CredentialsConfig {
    pub api_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Session-token endpoints and renewal cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Spot REST base URL.
    #[serde(default = "default_spot_rest_url")]
    pub spot_rest_url: String,

    /// USDT-margined futures REST base URL.
    #[serde(default = "default_um_rest_url")]
    pub um_rest_url: String,

    /// Session-token renewal interval in seconds.
    #[serde(default = "default_renew_interval")]
    pub renew_interval_secs: u64,

    /// `recvWindow` for signed requests (milliseconds).
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spot_rest_url: default_spot_rest_url(),
            um_rest_url: default_um_rest_url(),
            renew_interval_secs: default_renew_interval(),
            recv_window: default_recv_window(),
        }
    }
}

impl SessionConfig {
    pub fn rest_url(&self, segment: Segment) -> &str {
        match segment {
            Segment::Spot => &self.spot_rest_url,
            Segment::Um => &self.um_rest_url,
        }
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_notification_backoff_ms() -> u64 {
    1000
}

fn default_spot_rest_url() -> String {
    "https://api.binance.com".into()
}

fn default_um_rest_url() -> String {
    "https://fapi.binance.com".into()
}

fn default_renew_interval() -> u64 {
    1800 // tokens expire after 60 min
}

fn default_recv_window() -> u64 {
    5000
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
