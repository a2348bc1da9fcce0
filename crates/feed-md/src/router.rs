//! Dispatch router.
//!
//! ```text
//! text ──► serde_json ──► Envelope::classify
//!                            │
//!        ┌───────────────────┼──────────────────────┐
//!        ▼                   ▼                      ▼
//!   Stream{stream,data}     Ack               Notification
//!        │                (ignored)     (logged, backoff hint)
//!        ▼
//!   for each record, in order:
//!     "e" present?  ──yes──► EventType::from_discriminator
//!        │ no
//!        ▼
//!     EventType::infer_from_stream(stream)
//!        │
//!        ▼
//!     HandlerTree[(segment, event type)] ──► handler(ctx, record)
//! ```
//!
//! Nothing here returns early on a bad record. Every failure becomes a
//! [`DispatchError`] in the message's [`DispatchReport`], and the next record
//! is dispatched as if nothing happened.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use feed_core::{CanonicalStore, Exchange, Segment};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::binance::handlers::{self, HandlerContext, HandlerFn};
use crate::binance::taxonomy::EventType;
use crate::envelope::{Envelope, ExchangeNotification, Payload};
use crate::error::{DispatchError, HandlerError, UnresolvedReason};

const DEFAULT_NOTIFICATION_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Handler tree
// ---------------------------------------------------------------------------

/// Static `(segment, event type) → handler` table. Built once, read-only
/// afterwards.
#[derive(Clone, Default)]
pub struct HandlerTree {
    handlers: AHashMap<(Segment, EventType), HandlerFn>,
}

impl HandlerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same pair.
    pub fn with(mut self, segment: Segment, event_type: EventType, handler: HandlerFn) -> Self {
        self.handlers.insert((segment, event_type), handler);
        self
    }

    pub fn get(&self, segment: Segment, event_type: EventType) -> Option<HandlerFn> {
        self.handlers.get(&(segment, event_type)).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerTree").field("routes", &keys).finish()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of dispatching one inbound message.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Event types of the records that reached a handler and succeeded, in order.
    pub dispatched: Vec<EventType>,
    /// Records (or the whole message) that were dropped.
    pub errors: Vec<DispatchError>,
    /// Set when the message was an exchange error notification.
    pub notification: Option<ExchangeNotification>,
    /// How long the caller should pause before processing more messages.
    pub backoff: Option<Duration>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.notification.is_none()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Callback invoked with every decoded message after dispatch.
pub type Observer = Arc<dyn Fn(Segment, &Value) + Send + Sync>;

/// Routes decoded messages to handlers. Shared across feed connections
/// behind an `Arc`; dispatch takes `&self`.
pub struct Router {
    exchange: Exchange,
    tree: HandlerTree,
    store: Arc<CanonicalStore>,
    observer: Option<Observer>,
    notification_backoff: Duration,
}

impl Router {
    /// Router over the standard Binance handler tree.
    pub fn new(store: Arc<CanonicalStore>) -> Self {
        Self {
            exchange: Exchange::Binance,
            tree: handlers::standard_tree(),
            store,
            observer: None,
            notification_backoff: DEFAULT_NOTIFICATION_BACKOFF,
        }
    }

    pub fn with_tree(mut self, tree: HandlerTree) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_notification_backoff(mut self, backoff: Duration) -> Self {
        self.notification_backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<CanonicalStore> {
        &self.store
    }

    /// Decode and dispatch one raw text frame.
    pub fn dispatch_text(&self, segment: Segment, text: &str) -> DispatchReport {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.dispatch_value(segment, &message),
            Err(e) => {
                let err = DispatchError::MalformedEnvelope {
                    segment,
                    message: e.to_string(),
                };
                warn!("[router] {err}");
                DispatchReport {
                    errors: vec![err],
                    ..Default::default()
                }
            }
        }
    }

    /// Dispatch one decoded message.
    pub fn dispatch_value(&self, segment: Segment, message: &Value) -> DispatchReport {
        let mut report = DispatchReport::default();

        match Envelope::classify(message) {
            Envelope::Stream { stream, data } => match data {
                Payload::Single(record) => {
                    self.dispatch_record(segment, stream, record, &mut report)
                }
                Payload::Batch(records) => {
                    for record in records {
                        self.dispatch_record(segment, stream, record, &mut report);
                    }
                }
            },
            Envelope::Ack { id } => {
                debug!("[router] {segment} subscription ack id={id:?}");
            }
            Envelope::Notification(notification) => {
                error!("[router] {segment} exchange notification: {notification}");
                report.notification = Some(notification);
                report.backoff = Some(self.notification_backoff);
            }
        }

        if let Some(observer) = &self.observer {
            observer(segment, message);
        }

        report
    }

    fn dispatch_record(
        &self,
        segment: Segment,
        stream: &str,
        record: &Value,
        report: &mut DispatchReport,
    ) {
        let unresolved = |reason: UnresolvedReason| DispatchError::Unresolved {
            segment,
            stream: stream.to_owned(),
            reason,
            record: record.clone(),
        };

        let event_type = match resolve_event_type(stream, record) {
            Ok(et) => et,
            Err(reason) => {
                let err = unresolved(reason);
                warn!("[router] {err}");
                report.errors.push(err);
                return;
            }
        };

        let Some(handler) = self.tree.get(segment, event_type) else {
            let err = unresolved(UnresolvedReason::NoHandler(event_type));
            warn!("[router] {err}");
            report.errors.push(err);
            return;
        };

        let ctx = HandlerContext {
            exchange: self.exchange.as_str(),
            segment,
            stream,
            store: &self.store,
        };

        match handler(&ctx, record) {
            Ok(()) => report.dispatched.push(event_type),
            Err(HandlerError::NotImplemented) => {
                let err = DispatchError::NotImplemented {
                    segment,
                    event_type,
                    stream: stream.to_owned(),
                };
                debug!("[router] {err}");
                report.errors.push(err);
            }
            Err(e) => {
                let err = DispatchError::Decode {
                    segment,
                    event_type,
                    stream: stream.to_owned(),
                    message: e.to_string(),
                };
                warn!("[router] {err}");
                report.errors.push(err);
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("exchange", &self.exchange)
            .field("tree", &self.tree)
            .field("observer", &self.observer.is_some())
            .field("notification_backoff", &self.notification_backoff)
            .finish()
    }
}

/// Explicit discriminator first, stream-name inference only when `"e"` is absent.
fn resolve_event_type(stream: &str, record: &Value) -> Result<EventType, UnresolvedReason> {
    match record.get("e") {
        Some(Value::String(tag)) => EventType::from_discriminator(tag)
            .ok_or_else(|| UnresolvedReason::UnknownDiscriminator(tag.clone())),
        Some(other) => Err(UnresolvedReason::UnknownDiscriminator(other.to_string())),
        None => EventType::infer_from_stream(stream).ok_or(UnresolvedReason::MissingDiscriminator),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn router() -> Router {
        Router::new(Arc::new(CanonicalStore::new()))
    }

    fn wrap(stream: &str, data: Value) -> Value {
        json!({"stream": stream, "data": data})
    }

    #[test]
    fn agg_trade_lands_verbatim() {
        let r = router();
        let rec = json!({
            "e":"aggTrade","E":1,"s":"BTCUSDT","a":1,"p":"100","q":"2","f":1,"l":1,"T":1,"m":false
        });
        let report = r.dispatch_value(Segment::Um, &wrap("btcusdt@aggTrade", rec.clone()));
        assert!(report.is_clean());
        assert_eq!(report.dispatched, vec![EventType::AggTrade]);
        assert_eq!(
            *r.store().get("binance", "BTCUSDT", Segment::Um, "aggTrade").unwrap(),
            rec
        );
    }

    #[test]
    fn klines_per_interval_are_distinct() {
        let r = router();
        let k = |i: &str, c: &str| {
            json!({
                "e":"kline","E":1,"s":"BTCUSDT",
                "k":{"i":i,"o":"1","h":"2","l":"0.5","c":c,"v":"10","x":false}
            })
        };
        r.dispatch_value(Segment::Spot, &wrap("btcusdt@kline_1m", k("1m", "1.1")));
        r.dispatch_value(Segment::Spot, &wrap("btcusdt@kline_5m", k("5m", "1.2")));

        let one = r.store().get("binance", "BTCUSDT", Segment::Spot, "kline__1m").unwrap();
        let five = r.store().get("binance", "BTCUSDT", Segment::Spot, "kline__5m").unwrap();
        assert_ne!(one, five);
        assert_eq!(one["k"]["c"], "1.1");
        assert_eq!(five["k"]["c"], "1.2");
    }

    #[test]
    fn mark_price_populates_four_coordinates() {
        let r = router();
        let rec = json!({"e":"markPriceUpdate","s":"BTCUSDT","p":"100.5","r":"0.0001","T":999});
        let report = r.dispatch_value(Segment::Um, &wrap("btcusdt@markPrice", rec.clone()));
        assert!(report.is_clean());

        let store = r.store();
        let leaf = |key: &str| store.get("binance", "BTCUSDT", Segment::Um, key).unwrap();
        assert_eq!(*leaf("markPriceUpdate"), rec);
        assert_eq!(*leaf("markPrice"), json!("100.5"));
        assert_eq!(*leaf("fundingRate"), json!("0.0001"));
        assert_eq!(*leaf("nextFundingTime"), json!(999));
    }

    #[test]
    fn book_ticker_inferred_from_stream_name() {
        let r = router();
        let rec = json!({
            "u":400900217,"s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000",
            "A":"40.66000000"
        });
        let report = r.dispatch_value(Segment::Spot, &wrap("bnbusdt@bookTicker", rec.clone()));
        assert!(report.errors.is_empty());
        assert_eq!(report.dispatched, vec![EventType::BookTicker]);
        assert_eq!(
            *r.store().get("binance", "BNBUSDT", Segment::Spot, "bookTicker").unwrap(),
            rec
        );
    }

    #[test]
    fn partial_depth_inferred_from_stream_name() {
        let r = router();
        let rec = json!({
            "lastUpdateId":160,
            "bids":[["0.0024","10"]],
            "asks":[["0.0026","100"]]
        });
        for segment in [Segment::Spot, Segment::Um] {
            let report = r.dispatch_value(segment, &wrap("btcusdt@depth5@100ms", rec.clone()));
            assert!(report.is_clean(), "{segment}: {:?}", report.errors);
            assert_eq!(report.dispatched, vec![EventType::DepthUpdate]);
            assert_eq!(*r.store().get("binance", "BTCUSDT", segment, "depth").unwrap(), rec);
        }
    }

    #[test]
    fn bad_record_does_not_block_its_batch_siblings() {
        let r = router();
        let good = json!({"e":"aggTrade","s":"ETHUSDT","p":"1","q":"1","T":1,"m":true});
        let bad = json!({"e":"somethingNew","s":"ETHUSDT"});
        let report = r.dispatch_value(Segment::Um, &wrap("!aggTrade@arr", json!([bad, good])));

        assert_eq!(report.dispatched, vec![EventType::AggTrade]);
        assert_eq!(report.errors.len(), 1);
        match &report.errors[0] {
            DispatchError::Unresolved { segment, stream, reason, record } => {
                assert_eq!(*segment, Segment::Um);
                assert_eq!(stream, "!aggTrade@arr");
                assert_eq!(*reason, UnresolvedReason::UnknownDiscriminator("somethingNew".into()));
                assert_eq!(record["e"], "somethingNew");
            }
            other => panic!("expected unresolved, got {other:?}"),
        }
        assert!(r.store().contains("binance", "ETHUSDT", Segment::Um, "aggTrade"));
    }

    #[test]
    fn known_event_without_handler_on_segment() {
        let r = router();
        let rec = json!({"e":"trade","s":"BTCUSDT","p":"1","q":"1","T":1,"m":true});
        let report = r.dispatch_value(Segment::Um, &wrap("btcusdt@trade", rec));
        assert!(matches!(
            &report.errors[..],
            [DispatchError::Unresolved {
                reason: UnresolvedReason::NoHandler(EventType::Trade),
                ..
            }]
        ));
    }

    #[test]
    fn missing_discriminator_without_inference_rule() {
        let r = router();
        let msg = wrap("btcusdt@aggTrade", json!({"s":"BTCUSDT"}));
        let report = r.dispatch_value(Segment::Spot, &msg);
        assert!(matches!(
            &report.errors[..],
            [DispatchError::Unresolved {
                reason: UnresolvedReason::MissingDiscriminator,
                ..
            }]
        ));
    }

    #[test]
    fn redispatch_is_idempotent() {
        let r = router();
        let rec = json!({
            "e":"24hrTicker","E":1,"s":"BTCUSDT",
            "p":"1","P":"0.1","c":"10","w":"9","v":"100","q":"1000"
        });
        let msg = wrap("btcusdt@ticker", rec);
        r.dispatch_value(Segment::Spot, &msg);
        let first = r.store().get("binance", "BTCUSDT", Segment::Spot, "ticker").unwrap();
        r.dispatch_value(Segment::Spot, &msg);
        let second = r.store().get("binance", "BTCUSDT", Segment::Spot, "ticker").unwrap();
        assert_eq!(first, second);
        assert_eq!(r.store().len(), 1);
    }

    #[test]
    fn not_implemented_is_distinct_from_unresolved() {
        let r = router();
        let report = r.dispatch_value(
            Segment::Spot,
            &wrap("listenKey123", json!({"e":"executionReport","s":"BTCUSDT"})),
        );
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].is_not_implemented());
        assert!(!report.errors[0].is_unresolved());
        assert!(r.store().is_empty());
    }

    #[test]
    fn decode_failure_is_reported() {
        let r = router();
        let msg = wrap("btcusdt@aggTrade", json!({"e":"aggTrade","s":"BTCUSDT"}));
        let report = r.dispatch_value(Segment::Spot, &msg);
        assert!(matches!(
            &report.errors[..],
            [DispatchError::Decode { event_type: EventType::AggTrade, .. }]
        ));
    }

    #[test]
    fn notification_sets_backoff() {
        let r = router().with_notification_backoff(Duration::from_millis(250));
        let report = r.dispatch_text(Segment::Spot, r#"{"code": 2, "msg": "Invalid request"}"#);
        assert_eq!(report.backoff, Some(Duration::from_millis(250)));
        assert_eq!(report.notification.unwrap().code, Some(2));
        assert!(report.errors.is_empty());
    }

    #[test]
    fn ack_is_silent() {
        let report = router().dispatch_text(Segment::Um, r#"{"result": null, "id": 1}"#);
        assert!(report.is_clean());
        assert!(report.backoff.is_none());
    }

    #[test]
    fn malformed_text() {
        let report = router().dispatch_text(Segment::Spot, "not json");
        assert!(matches!(&report.errors[..], [DispatchError::MalformedEnvelope { .. }]));
    }

    #[test]
    fn observer_sees_every_message() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let r = router().with_observer(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        r.dispatch_text(Segment::Spot, r#"{"code": 1}"#);
        r.dispatch_value(Segment::Spot, &wrap("x@y", json!({"e":"bogus"})));
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }
}
