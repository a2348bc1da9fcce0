//! Binance session endpoints.

pub mod auth;
pub mod session;

use std::sync::Arc;

use feed_core::Segment;
use feed_core::config::SessionConfig;

pub use self::session::BinanceSessionEndpoint;
use crate::SessionEndpoint;

/// One endpoint per segment, sharing a single HTTP client.
pub fn endpoints(config: &SessionConfig, segments: &[Segment]) -> Vec<Arc<dyn SessionEndpoint>> {
    let http = reqwest::Client::new();
    segments
        .iter()
        .map(|&segment| {
            Arc::new(BinanceSessionEndpoint::new(
                segment,
                http.clone(),
                config.rest_url(segment),
                config.recv_window,
            )) as Arc<dyn SessionEndpoint>
        })
        .collect()
}
