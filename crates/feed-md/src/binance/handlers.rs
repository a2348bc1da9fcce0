//! Binance event handlers.
//!
//! A handler decodes one record into its typed shape, then writes to the
//! store. The stored value is the record exactly as received, so readers see
//! every field the exchange sent, not only the ones the typed shape names.
//!
//! | event type        | store event type(s)                                        | segments |
//! |-------------------|------------------------------------------------------------|----------|
//! | `aggTrade`        | `aggTrade`                                                 | spot, um |
//! | `trade`           | `trade`                                                    | spot     |
//! | `kline`           | `kline__<interval>`                                        | spot, um |
//! | `24hrMiniTicker`  | `miniTicker`                                               | spot, um |
//! | `24hrTicker`      | `ticker`                                                   | spot, um |
//! | `bookTicker`      | `bookTicker`                                               | spot, um |
//! | `depthUpdate`     | `depth`                                                    | spot, um |
//! | `markPriceUpdate` | `markPriceUpdate`, `markPrice`, `fundingRate`, `nextFundingTime` | um |
//! | `forceOrder`      | `forceOrder` (keyed by `o.s`)                              | um       |
//!
//! Everything else registered in [`standard_tree`] is [`not_implemented`].

use feed_core::{CanonicalStore, Segment};
use serde::Deserialize;
use serde_json::Value;

use super::records::{
    AggTrade, BookTicker, DepthUpdate, ForceOrder, Kline, MarkPriceUpdate, MiniTicker,
    PartialDepth, Ticker, Trade,
};
use super::streams::symbol_from_stream;
use super::taxonomy::{EventType, store_key};
use crate::error::HandlerError;
use crate::router::HandlerTree;

/// What a handler knows about the record besides its content.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub exchange: &'a str,
    pub segment: Segment,
    /// Origin stream name.
    pub stream: &'a str,
    pub store: &'a CanonicalStore,
}

impl HandlerContext<'_> {
    fn put(&self, symbol: &str, event_type: &str, value: impl Into<Value>) {
        self.store
            .put(self.exchange, symbol, self.segment, event_type, value);
    }
}

/// A statically registered handler.
pub type HandlerFn = fn(&HandlerContext<'_>, &Value) -> Result<(), HandlerError>;

// ---------------------------------------------------------------------------
// Market handlers
// ---------------------------------------------------------------------------

pub fn agg_trade(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let trade = AggTrade::deserialize(record)?;
    ctx.put(&trade.symbol, store_key::AGG_TRADE, record.clone());
    Ok(())
}

pub fn trade(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let trade = Trade::deserialize(record)?;
    ctx.put(&trade.symbol, store_key::TRADE, record.clone());
    Ok(())
}

pub fn kline(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let kline = Kline::deserialize(record)?;
    ctx.put(
        &kline.symbol,
        &store_key::kline(&kline.bar.interval),
        record.clone(),
    );
    Ok(())
}

pub fn mini_ticker(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let ticker = MiniTicker::deserialize(record)?;
    ctx.put(&ticker.symbol, store_key::MINI_TICKER, record.clone());
    Ok(())
}

pub fn ticker(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let ticker = Ticker::deserialize(record)?;
    ctx.put(&ticker.symbol, store_key::TICKER, record.clone());
    Ok(())
}

/// The segment comes from the context: spot payloads carry no discriminator
/// and are otherwise indistinguishable from um ones.
pub fn book_ticker(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let bbo = BookTicker::deserialize(record)?;
    ctx.put(&bbo.symbol, store_key::BOOK_TICKER, record.clone());
    Ok(())
}

/// Diff depth (`depthUpdate`) or partial depth snapshot. Partial snapshots
/// have no `s`, so the symbol comes from the stream name.
pub fn depth(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let symbol = if record.get("s").is_some() {
        DepthUpdate::deserialize(record)?.symbol
    } else {
        PartialDepth::deserialize(record)?;
        symbol_from_stream(ctx.stream).ok_or(HandlerError::MissingSymbol)?
    };
    ctx.put(&symbol, store_key::DEPTH, record.clone());
    Ok(())
}

/// Writes the raw record plus three scalar projections for cheap point reads.
pub fn mark_price(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let update = MarkPriceUpdate::deserialize(record)?;
    let symbol = update.symbol.as_str();
    ctx.put(symbol, store_key::MARK_PRICE_UPDATE, record.clone());
    ctx.put(symbol, store_key::MARK_PRICE, update.mark_price.as_str());
    ctx.put(symbol, store_key::FUNDING_RATE, update.funding_rate.as_str());
    ctx.put(symbol, store_key::NEXT_FUNDING_TIME, update.next_funding_time);
    Ok(())
}

pub fn force_order(ctx: &HandlerContext<'_>, record: &Value) -> Result<(), HandlerError> {
    let order = ForceOrder::deserialize(record)?;
    ctx.put(&order.order.symbol, store_key::FORCE_ORDER, record.clone());
    Ok(())
}

/// Registered for event types the feed recognises but does not decode.
pub fn not_implemented(_ctx: &HandlerContext<'_>, _record: &Value) -> Result<(), HandlerError> {
    Err(HandlerError::NotImplemented)
}

// ---------------------------------------------------------------------------
// Handler tree
// ---------------------------------------------------------------------------

/// Every (segment, event type) pair the Binance feed routes.
pub fn standard_tree() -> HandlerTree {
    use EventType as E;
    use Segment::{Spot, Um};

    HandlerTree::new()
        // spot market
        .with(Spot, E::AggTrade, agg_trade)
        .with(Spot, E::Trade, trade)
        .with(Spot, E::Kline, kline)
        .with(Spot, E::MiniTicker, mini_ticker)
        .with(Spot, E::Ticker, ticker)
        .with(Spot, E::WindowTicker1h, not_implemented)
        .with(Spot, E::WindowTicker4h, not_implemented)
        .with(Spot, E::WindowTicker1d, not_implemented)
        .with(Spot, E::DepthUpdate, depth)
        .with(Spot, E::BookTicker, book_ticker)
        // spot user data
        .with(Spot, E::OutboundAccountPosition, not_implemented)
        .with(Spot, E::BalanceUpdate, not_implemented)
        .with(Spot, E::ExecutionReport, not_implemented)
        // um market
        .with(Um, E::AggTrade, agg_trade)
        .with(Um, E::MarkPriceUpdate, mark_price)
        .with(Um, E::Kline, kline)
        .with(Um, E::ContinuousKline, not_implemented)
        .with(Um, E::MiniTicker, mini_ticker)
        .with(Um, E::Ticker, ticker)
        .with(Um, E::BookTicker, book_ticker)
        .with(Um, E::ForceOrder, force_order)
        .with(Um, E::DepthUpdate, depth)
        .with(Um, E::CompositeIndex, not_implemented)
        .with(Um, E::ContractInfo, not_implemented)
        .with(Um, E::AssetIndexUpdate, not_implemented)
        // um user data
        .with(Um, E::MarginCall, not_implemented)
        .with(Um, E::AccountUpdate, not_implemented)
        .with(Um, E::OrderTradeUpdate, not_implemented)
        .with(Um, E::AccountConfigUpdate, not_implemented)
        .with(Um, E::StrategyUpdate, not_implemented)
        .with(Um, E::GridUpdate, not_implemented)
        .with(Um, E::ConditionalOrderTriggerReject, not_implemented)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx<'a>(store: &'a CanonicalStore, segment: Segment, stream: &'a str) -> HandlerContext<'a> {
        HandlerContext {
            exchange: "binance",
            segment,
            stream,
            store,
        }
    }

    #[test]
    fn agg_trade_stored_verbatim() {
        let store = CanonicalStore::new();
        let rec = json!({
            "e":"aggTrade","E":1,"s":"BTCUSDT","a":5,"p":"16500.50","q":"0.001","f":100,"l":105,
            "T":2,"m":true,"M":true
        });
        agg_trade(&ctx(&store, Segment::Um, "btcusdt@aggTrade"), &rec).unwrap();
        assert_eq!(
            *store.get("binance", "BTCUSDT", Segment::Um, "aggTrade").unwrap(),
            rec
        );
    }

    #[test]
    fn mark_price_projections() {
        let store = CanonicalStore::new();
        let rec = json!({"s":"BTCUSDT","p":"100.5","r":"0.0001","T":999});
        mark_price(&ctx(&store, Segment::Um, "btcusdt@markPrice"), &rec).unwrap();
        let get = |et| store.get("binance", "BTCUSDT", Segment::Um, et).unwrap();
        assert_eq!(*get("markPriceUpdate"), rec);
        assert_eq!(*get("markPrice"), json!("100.5"));
        assert_eq!(*get("fundingRate"), json!("0.0001"));
        assert_eq!(*get("nextFundingTime"), json!(999));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn book_ticker_uses_context_segment() {
        let store = CanonicalStore::new();
        let rec = json!({"u":1,"s":"BNBUSDT","b":"25.35","B":"31.21","a":"25.36","A":"40.66"});
        book_ticker(&ctx(&store, Segment::Spot, "bnbusdt@bookTicker"), &rec).unwrap();
        assert!(store.contains("binance", "BNBUSDT", Segment::Spot, "bookTicker"));
        assert!(!store.contains("binance", "BNBUSDT", Segment::Um, "bookTicker"));
    }

    #[test]
    fn partial_depth_takes_symbol_from_stream() {
        let store = CanonicalStore::new();
        let rec = json!({"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"]]});
        depth(&ctx(&store, Segment::Spot, "btcusdt@depth5@100ms"), &rec).unwrap();
        assert!(store.contains("binance", "BTCUSDT", Segment::Spot, "depth"));

        let err = depth(&ctx(&store, Segment::Spot, "!depth"), &rec).unwrap_err();
        assert!(matches!(err, HandlerError::MissingSymbol));
    }

    #[test]
    fn force_order_keyed_by_order_symbol() {
        let store = CanonicalStore::new();
        let rec = json!({
            "e":"forceOrder","E":1,"o":{"s":"ETHUSDT","S":"BUY","q":"1","ap":"3000","X":"FILLED"}
        });
        force_order(&ctx(&store, Segment::Um, "!forceOrder@arr"), &rec).unwrap();
        assert!(store.contains("binance", "ETHUSDT", Segment::Um, "forceOrder"));
    }

    #[test]
    fn malformed_record_writes_nothing() {
        let store = CanonicalStore::new();
        let rec = json!({"e":"kline","s":"BTCUSDT","k":{"o":"1"}});
        let err = kline(&ctx(&store, Segment::Spot, "btcusdt@kline_1m"), &rec).unwrap_err();
        assert!(matches!(err, HandlerError::Decode(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn tree_covers_both_segments() {
        let tree = standard_tree();
        assert_eq!(tree.len(), 32);
        assert!(tree.get(Segment::Spot, EventType::Trade).is_some());
        assert!(tree.get(Segment::Um, EventType::Trade).is_none());
        assert!(tree.get(Segment::Spot, EventType::MarkPriceUpdate).is_none());
        assert!(tree.get(Segment::Um, EventType::GridUpdate).is_some());
    }
}
