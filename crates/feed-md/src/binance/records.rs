//! Typed record shapes, one per event type the handlers decode.
//!
//! Handlers decode an incoming record into its shape before touching the
//! store, so a record with missing or mistyped key fields is reported as a
//! decode error instead of producing a half-populated store entry. Fields the
//! exchange adds later are ignored.
//!
//! Prices and quantities stay decimal strings, exactly as sent. Use the
//! accessor methods for `f64` views.

use serde::{Deserialize, Serialize};

use crate::json_util::parse_decimal;

/// One `[price, quantity]` book level.
pub type Level = (String, String);

/// `aggTrade`: trades aggregated per taker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a", default)]
    pub agg_trade_id: Option<u64>,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "f", default)]
    pub first_trade_id: Option<u64>,
    #[serde(rename = "l", default)]
    pub last_trade_id: Option<u64>,
    #[serde(rename = "T")]
    pub trade_time: u64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl AggTrade {
    pub fn price_f64(&self) -> Option<f64> {
        parse_decimal(&self.price)
    }

    pub fn quantity_f64(&self) -> Option<f64> {
        parse_decimal(&self.quantity)
    }
}

/// `trade`: raw spot trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", default)]
    pub trade_id: Option<u64>,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: u64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// `kline`: candlestick update, pushed while the bar is open and once on close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub bar: KlineBar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineBar {
    #[serde(rename = "t", default)]
    pub start_time: Option<u64>,
    #[serde(rename = "T", default)]
    pub close_time: Option<u64>,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n", default)]
    pub trade_count: Option<u64>,
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl KlineBar {
    pub fn close_f64(&self) -> Option<f64> {
        parse_decimal(&self.close)
    }
}

/// `24hrMiniTicker`: rolling 24h window, reduced field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniTicker {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub base_volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
}

/// `24hrTicker`: rolling 24h window statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "w")]
    pub weighted_avg_price: String,
    #[serde(rename = "v")]
    pub base_volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "o", default)]
    pub open: Option<String>,
    #[serde(rename = "h", default)]
    pub high: Option<String>,
    #[serde(rename = "l", default)]
    pub low: Option<String>,
    #[serde(rename = "n", default)]
    pub trade_count: Option<u64>,
}

/// `bookTicker`: best bid/ask. Spot payloads have no `e`, `E` or `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    #[serde(rename = "u", default)]
    pub update_id: Option<u64>,
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "T", default)]
    pub transaction_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid_price: String,
    #[serde(rename = "B")]
    pub bid_qty: String,
    #[serde(rename = "a")]
    pub ask_price: String,
    #[serde(rename = "A")]
    pub ask_qty: String,
}

impl BookTicker {
    pub fn bid(&self) -> Option<f64> {
        parse_decimal(&self.bid_price)
    }

    pub fn ask(&self) -> Option<f64> {
        parse_decimal(&self.ask_price)
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.bid()? + self.ask()?) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.ask()? - self.bid()?)
    }
}

/// `depthUpdate`: order book diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "T", default)]
    pub transaction_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "pu", default)]
    pub prev_final_update_id: Option<i64>,
    #[serde(rename = "b")]
    pub bids: Vec<Level>,
    #[serde(rename = "a")]
    pub asks: Vec<Level>,
}

/// Partial book depth snapshot (`<symbol>@depth<levels>` on spot). Carries
/// neither event type nor symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDepth {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// `markPriceUpdate`: mark price and funding for one perpetual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPriceUpdate {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: String,
    #[serde(rename = "i", default)]
    pub index_price: Option<String>,
    #[serde(rename = "P", default)]
    pub estimated_settle_price: Option<String>,
    #[serde(rename = "r")]
    pub funding_rate: String,
    #[serde(rename = "T")]
    pub next_funding_time: u64,
}

impl MarkPriceUpdate {
    pub fn mark_price_f64(&self) -> Option<f64> {
        parse_decimal(&self.mark_price)
    }

    pub fn funding_rate_f64(&self) -> Option<f64> {
        parse_decimal(&self.funding_rate)
    }
}

/// `forceOrder`: liquidation order snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceOrder {
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
    #[serde(rename = "o")]
    pub order: LiquidationOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationOrder {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o", default)]
    pub order_type: Option<String>,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p", default)]
    pub price: Option<String>,
    #[serde(rename = "ap")]
    pub average_price: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "T", default)]
    pub trade_time: Option<u64>,
}
