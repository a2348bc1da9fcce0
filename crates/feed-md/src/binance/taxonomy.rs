//! Binance event taxonomy.
//!
//! Every inbound record belongs to one [`EventType`]. Most records name it
//! in their `"e"` field (the discriminator). Two feeds omit it:
//!
//! - `<symbol>@bookTicker` on spot (best bid/ask snapshots)
//! - `<symbol>@depth<levels>` partial book depth
//!
//! For those the type is inferred from the origin stream name by
//! [`EventType::infer_from_stream`]. The rule is deliberately limited to
//! these two substrings; the set of feeds without a discriminator is fixed by
//! the exchange.

use serde::{Deserialize, Serialize};

/// Which kind of stream an event arrives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamFamily {
    /// Public market streams (`<symbol>@<type>`, `!<type>@arr`).
    Market,
    /// Private per-account streams, subscribed by session token.
    UserData,
}

/// Every event type the exchange pushes on spot and USDT-margined streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    // -- market --
    AggTrade,
    Trade,
    Kline,
    ContinuousKline,
    MiniTicker,
    Ticker,
    WindowTicker1h,
    WindowTicker4h,
    WindowTicker1d,
    BookTicker,
    DepthUpdate,
    MarkPriceUpdate,
    ForceOrder,
    CompositeIndex,
    ContractInfo,
    AssetIndexUpdate,

    // -- spot user data --
    OutboundAccountPosition,
    BalanceUpdate,
    ExecutionReport,

    // -- um user data --
    MarginCall,
    AccountUpdate,
    OrderTradeUpdate,
    AccountConfigUpdate,
    StrategyUpdate,
    GridUpdate,
    ConditionalOrderTriggerReject,
}

impl EventType {
    pub const ALL: [EventType; 26] = [
        Self::AggTrade,
        Self::Trade,
        Self::Kline,
        Self::ContinuousKline,
        Self::MiniTicker,
        Self::Ticker,
        Self::WindowTicker1h,
        Self::WindowTicker4h,
        Self::WindowTicker1d,
        Self::BookTicker,
        Self::DepthUpdate,
        Self::MarkPriceUpdate,
        Self::ForceOrder,
        Self::CompositeIndex,
        Self::ContractInfo,
        Self::AssetIndexUpdate,
        Self::OutboundAccountPosition,
        Self::BalanceUpdate,
        Self::ExecutionReport,
        Self::MarginCall,
        Self::AccountUpdate,
        Self::OrderTradeUpdate,
        Self::AccountConfigUpdate,
        Self::StrategyUpdate,
        Self::GridUpdate,
        Self::ConditionalOrderTriggerReject,
    ];

    /// The `"e"` value the exchange uses for this event type.
    pub fn discriminator(self) -> &'static str {
        match self {
            Self::AggTrade => "aggTrade",
            Self::Trade => "trade",
            Self::Kline => "kline",
            Self::ContinuousKline => "continuous_kline",
            Self::MiniTicker => "24hrMiniTicker",
            Self::Ticker => "24hrTicker",
            Self::WindowTicker1h => "1hTicker",
            Self::WindowTicker4h => "4hTicker",
            Self::WindowTicker1d => "1dTicker",
            Self::BookTicker => "bookTicker",
            Self::DepthUpdate => "depthUpdate",
            Self::MarkPriceUpdate => "markPriceUpdate",
            Self::ForceOrder => "forceOrder",
            Self::CompositeIndex => "compositeIndex",
            Self::ContractInfo => "contractInfo",
            Self::AssetIndexUpdate => "assetIndexUpdate",
            Self::OutboundAccountPosition => "outboundAccountPosition",
            Self::BalanceUpdate => "balanceUpdate",
            Self::ExecutionReport => "executionReport",
            Self::MarginCall => "MARGIN_CALL",
            Self::AccountUpdate => "ACCOUNT_UPDATE",
            Self::OrderTradeUpdate => "ORDER_TRADE_UPDATE",
            Self::AccountConfigUpdate => "ACCOUNT_CONFIG_UPDATE",
            Self::StrategyUpdate => "STRATEGY_UPDATE",
            Self::GridUpdate => "GRID_UPDATE",
            Self::ConditionalOrderTriggerReject => "CONDITIONAL_ORDER_TRIGGER_REJECT",
        }
    }

    /// Look up an event type by its `"e"` value.
    pub fn from_discriminator(tag: &str) -> Option<Self> {
        // Older spot user streams still send the pre-2020 account event name.
        if tag == "outboundAccountInfo" {
            return Some(Self::OutboundAccountPosition);
        }
        Self::ALL.into_iter().find(|et| et.discriminator() == tag)
    }

    /// Infer the event type of a record without a discriminator from the
    /// name of the stream it arrived on.
    pub fn infer_from_stream(stream: &str) -> Option<Self> {
        if stream.contains("depth") {
            Some(Self::DepthUpdate)
        } else if stream.contains("bookTicker") {
            Some(Self::BookTicker)
        } else {
            None
        }
    }

    pub fn family(self) -> StreamFamily {
        match self {
            Self::OutboundAccountPosition
            | Self::BalanceUpdate
            | Self::ExecutionReport
            | Self::MarginCall
            | Self::AccountUpdate
            | Self::OrderTradeUpdate
            | Self::AccountConfigUpdate
            | Self::StrategyUpdate
            | Self::GridUpdate
            | Self::ConditionalOrderTriggerReject => StreamFamily::UserData,
            _ => StreamFamily::Market,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.discriminator())
    }
}

// ---------------------------------------------------------------------------
// Store event-type names
// ---------------------------------------------------------------------------

/// Event-type component of store keys written by the handlers.
pub mod store_key {
    pub const AGG_TRADE: &str = "aggTrade";
    pub const TRADE: &str = "trade";
    pub const MINI_TICKER: &str = "miniTicker";
    pub const TICKER: &str = "ticker";
    pub const BOOK_TICKER: &str = "bookTicker";
    pub const DEPTH: &str = "depth";
    pub const MARK_PRICE_UPDATE: &str = "markPriceUpdate";
    pub const MARK_PRICE: &str = "markPrice";
    pub const FUNDING_RATE: &str = "fundingRate";
    pub const NEXT_FUNDING_TIME: &str = "nextFundingTime";
    pub const FORCE_ORDER: &str = "forceOrder";

    /// Klines are keyed per interval so `1m` and `5m` bars never collide.
    pub fn kline(interval: &str) -> String {
        format!("kline__{interval}")
    }
}
