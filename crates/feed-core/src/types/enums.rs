//! Enumerations used throughout the feed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

// ---------------------------------------------------------------------------
// Exchange identifiers
// ---------------------------------------------------------------------------

/// Supported cryptocurrency exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
}

impl Exchange {
    /// Store-level name of the exchange.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Market segments
// ---------------------------------------------------------------------------

/// Market / account partition on the exchange.
///
/// Each segment has its own streaming connection, its own handler table and
/// its own session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Spot trading.
    Spot,
    /// USDT-margined futures.
    Um,
}

impl Segment {
    /// All segments, in a stable order.
    pub const ALL: [Segment; 2] = [Segment::Spot, Segment::Um];

    /// Store-level name of the segment (`"spot"`, `"um"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Um => "um",
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "um" | "ubase" | "futures" => Ok(Self::Um),
            other => Err(FeedError::Parse(format!("unknown segment: {other}"))),
        }
    }
}
