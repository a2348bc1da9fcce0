//! # feed-runner
//!
//! Main entry point for the Binance event feed.
//!
//! Loads a JSON configuration file, authenticates private streams when a key
//! pair is available, opens one combined-stream connection per configured
//! segment, and dispatches every inbound message into the canonical store.
//!
//! # Usage
//!
//! ```bash
//! feed-runner config.json --log-level info --allow-unauthenticated --watch BTCUSDT
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use feed_auth::{
    AuthOutcome, CredentialLifecycle, EnvCredentialSource, KeyPair, NonInteractivePrompt,
    SessionEvent, SessionEventReceiver,
};
use feed_core::config::AppConfig;
use feed_core::{CanonicalStore, Exchange, Segment};
use feed_md::Router;
use feed_md::binance::records::BookTicker;
use feed_md::binance::streams::combined_stream_url;
use feed_md::binance::taxonomy::store_key;
use feed_md::json_util::parse_str_f64;
use feed_md::ws_helper::SegmentFeed;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

/// Binance market data and user-data feed.
#[derive(Parser)]
#[command(name = "feed-runner", about = "Binance event normalization and dispatch feed")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Run with public streams only when no key pair is configured or the
    /// key pair is refused.
    #[arg(long)]
    allow_unauthenticated: bool,

    /// Symbols whose latest book ticker and mark price are logged periodically.
    #[arg(long)]
    watch: Vec<String>,

    /// Seconds between status lines for `--watch`.
    #[arg(long, default_value_t = 5)]
    status_interval: u64,
}

type Feeds = Arc<Mutex<BTreeMap<Segment, SegmentFeed>>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    feed_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "feed-runner");

    info!("feed-runner starting — config={}, log_level={}", cli.config.display(), cli.log_level);

    // 2. Load configuration
    let config = feed_core::config::load_config(&cli.config)?;
    let segments = config.enabled_segments();
    info!("config loaded — module={}, segments={segments:?}", config.module_name());

    // 3. Store and router
    let store = Arc::new(CanonicalStore::new());
    let router = Arc::new(
        Router::new(Arc::clone(&store)).with_notification_backoff(config.notification_backoff()),
    );

    // 4. Authenticate private streams
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let lifecycle = Arc::new(
        CredentialLifecycle::new(feed_auth::binance::endpoints(&config.session, &segments))
            .with_events(event_tx),
    );
    let event_task = tokio::spawn(log_session_events(event_rx));

    let prompt = NonInteractivePrompt {
        allow_unauthenticated: cli.allow_unauthenticated,
    };
    let supplied = config.credentials.clone().map(KeyPair::from);
    match lifecycle
        .authenticate(supplied, &EnvCredentialSource::default(), &prompt)
        .await
    {
        AuthOutcome::Authenticated(authed) => info!("authenticated segments: {authed:?}"),
        AuthOutcome::Unauthenticated => info!("running unauthenticated — public streams only"),
        AuthOutcome::Declined => {
            bail!(
                "no credentials found; pass --allow-unauthenticated to run on public streams only"
            )
        }
    }

    // 5. Start one feed per segment
    let mut tokens: BTreeMap<Segment, String> = BTreeMap::new();
    let feeds: Feeds = Arc::new(Mutex::new(BTreeMap::new()));
    for (idx, &segment) in segments.iter().enumerate() {
        let Some(product) = config.product(segment) else {
            continue;
        };
        let mut streams = product.stream_names();
        if let Some(token) = lifecycle.session_token(segment).await {
            streams.push(token.clone());
            tokens.insert(segment, token);
        }
        let url = product
            .ws_url
            .clone()
            .unwrap_or_else(|| combined_stream_url(segment).to_owned());
        let feed = SegmentFeed::start(segment, url, streams, Arc::clone(&router), idx);
        feeds.lock().await.insert(segment, feed);
    }

    info!("all {} feed(s) started — press Ctrl+C to stop", segments.len());

    // 6. Background tasks
    let mut tasks = vec![event_task];
    if !tokens.is_empty() {
        tasks.push(spawn_session_renewal(
            Arc::clone(&lifecycle),
            Arc::clone(&feeds),
            tokens,
            &config,
        ));
    }
    if !cli.watch.is_empty() {
        tasks.push(spawn_status_line(
            Arc::clone(&store),
            cli.watch.clone(),
            segments.clone(),
            Duration::from_secs(cli.status_interval.max(1)),
        ));
    }

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 8. Stop everything
    for task in &tasks {
        task.abort();
    }
    let feeds = std::mem::take(&mut *feeds.lock().await);
    for (segment, feed) in feeds {
        info!("stopping {segment} feed");
        feed.stop().await;
    }
    lifecycle.shutdown().await;

    info!("{} leaves in store at exit — goodbye", store.len());
    Ok(())
}

/// Renew every session token on the configured cadence and move the private
/// stream subscription when the exchange hands out a new token.
fn spawn_session_renewal(
    lifecycle: Arc<CredentialLifecycle>,
    feeds: Feeds,
    mut tokens: BTreeMap<Segment, String>,
    config: &AppConfig,
) -> tokio::task::JoinHandle<()> {
    let period = config.session.renew_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // skip the immediate first tick

        loop {
            interval.tick().await;

            for (segment, result) in lifecycle.renew_all().await {
                let Some(old) = tokens.get(&segment).cloned() else {
                    continue;
                };
                let mut guard = feeds.lock().await;
                let Some(feed) = guard.get_mut(&segment) else {
                    continue;
                };

                match result {
                    Ok(new) if new != old => {
                        if let Err(e) = feed.replace_stream(&old, &new).await {
                            error!("[{segment}] failed to move private stream to new token: {e}");
                        }
                        tokens.insert(segment, new);
                    }
                    Ok(_) => {}
                    Err(e) if e.is_rejected() => {
                        if let Err(e) = feed.unsubscribe(&[old]).await {
                            warn!("[{segment}] failed to drop private stream: {e}");
                        }
                        tokens.remove(&segment);
                    }
                    Err(e) => {
                        warn!("[{segment}] session renewal failed, will retry next interval: {e}")
                    }
                }
            }
        }
    })
}

async fn log_session_events(mut rx: SessionEventReceiver) {
    while let Some(event) = rx.recv().await {
        match &event {
            SessionEvent::RenewalFailed { segment, error } => {
                warn!("[session] {segment} renewal failed: {error}")
            }
            SessionEvent::Unauthenticated { segment, reason } => {
                warn!("[session] {segment} unauthenticated: {reason}")
            }
            other => info!("[session] {other:?}"),
        }
    }
}

/// Periodically log the latest best bid/ask and mark price per watched symbol.
fn spawn_status_line(
    store: Arc<CanonicalStore>,
    symbols: Vec<String>,
    segments: Vec<Segment>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    let exchange = Exchange::Binance.as_str();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            for symbol in &symbols {
                let symbol = symbol.to_uppercase();
                for &segment in &segments {
                    let bbo = store
                        .get_as::<BookTicker>(exchange, &symbol, segment, store_key::BOOK_TICKER)
                        .ok()
                        .flatten();
                    let mark = store
                        .get(exchange, &symbol, segment, store_key::MARK_PRICE)
                        .and_then(|v| parse_str_f64(Some(v.as_ref())));

                    match (bbo, mark) {
                        (None, None) => {}
                        (bbo, mark) => info!(
                            "[status] {symbol} {segment} bid={:?} ask={:?} mid={:?} mark={mark:?}",
                            bbo.as_ref().and_then(BookTicker::bid),
                            bbo.as_ref().and_then(BookTicker::ask),
                            bbo.as_ref().and_then(BookTicker::mid),
                        ),
                    }
                }
            }
        }
    })
}
