//! Binds one combined-stream WebSocket connection to the router.

use std::collections::HashMap;
use std::sync::Arc;

use feed_core::Segment;
use feed_core::error::FeedError;
use feed_core::ws::{OnMessageCallback, WsConnConfig, WsConnection};
use tracing::info;

use crate::binance::streams::{build_subscribe, build_unsubscribe};
use crate::router::Router;

/// One segment's live feed. Every text frame is dispatched through the shared
/// router on the connection task; a notification backoff pauses that task.
pub struct SegmentFeed {
    segment: Segment,
    conn: WsConnection,
    streams: Vec<String>,
    next_id: u64,
}

impl SegmentFeed {
    /// Connect to `url` and subscribe to `streams`. Returns immediately; the
    /// connection runs on its own task.
    pub fn start(
        segment: Segment,
        url: impl Into<String>,
        streams: Vec<String>,
        router: Arc<Router>,
        id: usize,
    ) -> Self {
        let config = WsConnConfig {
            url: url.into(),
            subscribe_msg: Some(build_subscribe(&streams, 1)),
            extra_headers: HashMap::new(),
            id,
        };

        let on_text: OnMessageCallback = Arc::new(move |_conn_id, text: &str| {
            router.dispatch_text(segment, text).backoff
        });

        info!(
            "[feed-{segment}] starting with {} streams on {}",
            streams.len(),
            config.url
        );

        let mut conn = WsConnection::new(config);
        conn.start(on_text);

        Self {
            segment,
            conn,
            streams,
            next_id: 1,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// Streams replayed on every reconnect.
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// Subscribe to more streams on the live connection and keep them across
    /// reconnects.
    pub async fn subscribe(&mut self, streams: &[String]) -> Result<(), FeedError> {
        let added: Vec<String> = streams
            .iter()
            .filter(|s| !self.streams.contains(s))
            .cloned()
            .collect();
        if added.is_empty() {
            return Ok(());
        }
        self.streams.extend(added.iter().cloned());
        self.conn
            .replace_subscription(build_subscribe(&self.streams, 1));
        let id = self.request_id();
        self.conn.send(build_subscribe(&added, id)).await
    }

    pub async fn unsubscribe(&mut self, streams: &[String]) -> Result<(), FeedError> {
        let before = self.streams.len();
        self.streams.retain(|s| !streams.contains(s));
        if self.streams.len() == before {
            return Ok(());
        }
        self.conn
            .replace_subscription(build_subscribe(&self.streams, 1));
        let id = self.request_id();
        self.conn.send(build_unsubscribe(streams, id)).await
    }

    /// Swap one stream for another, e.g. a renewed session token.
    pub async fn replace_stream(&mut self, old: &str, new: &str) -> Result<(), FeedError> {
        if old == new {
            return Ok(());
        }
        self.subscribe(&[new.to_owned()]).await?;
        self.unsubscribe(&[old.to_owned()]).await
    }

    pub async fn stop(mut self) {
        info!("[feed-{}] stopping", self.segment);
        self.conn.stop().await;
    }

    fn request_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
