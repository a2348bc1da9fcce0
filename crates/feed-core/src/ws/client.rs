//! Single WebSocket connection with auto-reconnect.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the exchange WebSocket endpoint (TLS).
//! 2. Sends the current subscription message.
//! 3. Reads text frames and forwards them to a callback.
//! 4. Pauses reading when the callback asks for it.
//! 5. Automatically reconnects on disconnection with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::{debug, error, info, warn};

use crate::error::FeedError;

/// Callback invoked for each received text message.
///
/// Parameters: `(connection_id, message_text)`. A returned duration makes
/// the connection stop reading for that long before the next frame.
pub type OnMessageCallback = Arc<dyn Fn(usize, &str) -> Option<Duration> + Send + Sync>;

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://stream.binance.com:9443/stream`).
    pub url: String,
    /// Message sent after every (re)connect.
    pub subscribe_msg: Option<String>,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Connection identifier, used in log lines.
    pub id: usize,
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound messages.
    outbound_tx: Option<mpsc::Sender<String>>,
    /// Latest subscription message, replayed on reconnect.
    subscribe_tx: watch::Sender<Option<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        let (subscribe_tx, _) = watch::channel(config.subscribe_msg.clone());
        Self {
            config,
            outbound_tx: None,
            subscribe_tx,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Text frames are forwarded to `on_text`.
    pub fn start(&mut self, on_text: OnMessageCallback) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let config = self.config.clone();
        let subscribe_rx = self.subscribe_tx.subscribe();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, outbound_rx, subscribe_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
        self.task = Some(task);
    }

    /// Send a text message on the live connection.
    pub async fn send(&self, msg: String) -> Result<(), FeedError> {
        if let Some(tx) = &self.outbound_tx {
            tx.send(msg)
                .await
                .map_err(|e| FeedError::WebSocket(format!("outbound channel closed: {e}")))?;
        }
        Ok(())
    }

    /// Replace the message sent after each future reconnect.
    pub fn replace_subscription(&self, msg: String) {
        self.subscribe_tx.send_replace(Some(msg));
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Main connection loop; reconnects with backoff until stopped.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    mut outbound_rx: mpsc::Receiver<String>,
    subscribe_rx: watch::Receiver<Option<String>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let conn_id = config.id;

    loop {
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);

        let ws_stream = match connect_ws(&config).await {
            Ok(s) => {
                backoff = Duration::from_millis(100);
                info!("[ws-{conn_id}] connected");
                s
            }
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let sub_msg = subscribe_rx.borrow().clone();
        if let Some(sub_msg) = sub_msg {
            debug!("[ws-{conn_id}] subscribing: {sub_msg}");
            if let Err(e) = ws_write.send(Message::Text(sub_msg.into())).await {
                error!("[ws-{conn_id}] subscribe send failed: {e}");
                continue;
            }
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[ws-{conn_id}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(pause) = on_text(conn_id, &text) {
                                tokio::select! {
                                    _ = tokio::time::sleep(pause) => {},
                                    _ = shutdown_rx.changed() => {
                                        let _ = ws_write.close().await;
                                        return;
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws-{conn_id}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws-{conn_id}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[ws-{conn_id}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame
                    }
                }

                Some(msg) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        error!("[ws-{conn_id}] send error: {e}");
                        break;
                    }
                }
            }
        }

        warn!("[ws-{conn_id}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Establish a TLS WebSocket connection.
async fn connect_ws(
    config: &WsConnConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    FeedError,
> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| FeedError::WebSocket(format!("invalid url {}: {e}", config.url)))?;

    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| FeedError::WebSocket(format!("bad header name {key}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FeedError::WebSocket(format!("bad header value for {key}: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| FeedError::WebSocket(e.to_string()))?;
    Ok(stream)
}
