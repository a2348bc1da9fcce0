//! Canonical market data store.
//!
//! Holds the most recent value observed for every
//! `(exchange, symbol, segment, event type)` coordinate. Entries are created
//! lazily on first write and live for the rest of the process; there is no
//! deletion and no expiry.
//!
//! # Concurrency
//!
//! ```text
//! spot feed ──► put() ──┐
//!                       ├──► DashMap<StoreKey, Arc<Value>>  (sharded locks)
//! um feed   ──► put() ──┘            ▲
//! reader    ──► get() ───────────────┘  clone of the leaf Arc
//! ```
//!
//! A write swaps the whole leaf `Arc` under its shard lock, so a reader sees
//! either the previous value or the new one, never a mix. Writes to different
//! coordinates never wait on a global lock.
//!
//! The store is **not transactional**: each `get` observes one leaf in
//! isolation. Reading `bookTicker` and `markPrice` for the same symbol may
//! return values from different moments.

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::Segment;

/// Full key path of one store leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub exchange: String,
    pub symbol: String,
    pub segment: Segment,
    pub event_type: String,
}

impl StoreKey {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        segment: Segment,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            segment,
            event_type: event_type.into(),
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.exchange, self.symbol, self.segment, self.event_type
        )
    }
}

/// Process-wide latest-value cache.
///
/// Construct once at start-up and share it behind an `Arc` with every
/// handler and reader.
#[derive(Debug, Default)]
pub struct CanonicalStore {
    leaves: DashMap<StoreKey, Arc<Value>, ahash::RandomState>,
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self {
            leaves: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Unconditional upsert. The previous value at this coordinate, if any,
    /// is replaced as a whole.
    pub fn put(
        &self,
        exchange: &str,
        symbol: &str,
        segment: Segment,
        event_type: &str,
        value: impl Into<Value>,
    ) {
        self.put_key(StoreKey::new(exchange, symbol, segment, event_type), value);
    }

    /// Upsert with a prebuilt key.
    pub fn put_key(&self, key: StoreKey, value: impl Into<Value>) {
        self.leaves.insert(key, Arc::new(value.into()));
    }

    /// Latest value at this coordinate, or `None` if it was never written.
    pub fn get(
        &self,
        exchange: &str,
        symbol: &str,
        segment: Segment,
        event_type: &str,
    ) -> Option<Arc<Value>> {
        self.get_key(&StoreKey::new(exchange, symbol, segment, event_type))
    }

    pub fn get_key(&self, key: &StoreKey) -> Option<Arc<Value>> {
        self.leaves.get(key).map(|leaf| Arc::clone(leaf.value()))
    }

    /// Decode the latest value at this coordinate into a typed record.
    ///
    /// Returns `Ok(None)` when the coordinate is empty and `Err` when the
    /// stored value does not have the requested shape.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        exchange: &str,
        symbol: &str,
        segment: Segment,
        event_type: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        match self.get(exchange, symbol, segment, event_type) {
            Some(value) => T::deserialize(value.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    /// Whether the coordinate has ever been written.
    pub fn contains(
        &self,
        exchange: &str,
        symbol: &str,
        segment: Segment,
        event_type: &str,
    ) -> bool {
        self.leaves
            .contains_key(&StoreKey::new(exchange, symbol, segment, event_type))
    }

    /// Number of populated coordinates.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Sorted snapshot of every populated key. Intended for diagnostics.
    pub fn keys(&self) -> Vec<StoreKey> {
        let mut keys: Vec<StoreKey> = self.leaves.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn untouched_path_is_empty() {
        let store = CanonicalStore::new();
        store.put("binance", "BTCUSDT", Segment::Um, "aggTrade", json!({"p": "1"}));

        assert!(store.get("binance", "BTCUSDT", Segment::Spot, "aggTrade").is_none());
        assert!(store.get("binance", "ETHUSDT", Segment::Um, "aggTrade").is_none());
        assert!(store.get("binance", "BTCUSDT", Segment::Um, "trade").is_none());
        assert!(store.get("okx", "BTCUSDT", Segment::Um, "aggTrade").is_none());
    }

    #[test]
    fn last_write_wins_without_merging() {
        let store = CanonicalStore::new();
        store.put("binance", "BTCUSDT", Segment::Spot, "bookTicker", json!({"b": "1", "B": "2"}));
        store.put("binance", "BTCUSDT", Segment::Spot, "bookTicker", json!({"a": "3"}));

        let v = store.get("binance", "BTCUSDT", Segment::Spot, "bookTicker").unwrap();
        assert_eq!(*v, json!({"a": "3"}));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scalar_leaves() {
        let store = CanonicalStore::new();
        store.put("binance", "BTCUSDT", Segment::Um, "markPrice", "100.5");
        store.put("binance", "BTCUSDT", Segment::Um, "nextFundingTime", 999u64);

        assert_eq!(
            *store.get("binance", "BTCUSDT", Segment::Um, "markPrice").unwrap(),
            json!("100.5")
        );
        assert_eq!(
            *store.get("binance", "BTCUSDT", Segment::Um, "nextFundingTime").unwrap(),
            json!(999)
        );
    }

    #[test]
    fn typed_read() {
        #[derive(Deserialize)]
        struct Quote {
            b: String,
        }

        let store = CanonicalStore::new();
        assert!(store.get_as::<Quote>("binance", "X", Segment::Spot, "q").unwrap().is_none());

        store.put("binance", "X", Segment::Spot, "q", json!({"b": "7"}));
        let q = store.get_as::<Quote>("binance", "X", Segment::Spot, "q").unwrap().unwrap();
        assert_eq!(q.b, "7");

        store.put("binance", "X", Segment::Spot, "q", json!(1));
        assert!(store.get_as::<Quote>("binance", "X", Segment::Spot, "q").is_err());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(CanonicalStore::new());
        let mut workers = Vec::new();

        for w in 0..4u64 {
            let store = Arc::clone(&store);
            workers.push(thread::spawn(move || {
                for i in 0..500u64 {
                    // Every write carries the same value twice; a torn read
                    // would show two different numbers.
                    let rec = json!({"a": i, "b": i, "w": w});
                    store.put("binance", "BTCUSDT", Segment::Um, "aggTrade", rec);
                    store.put("binance", &format!("SYM{w}"), Segment::Spot, "trade", json!(i));
                }
            }));
        }
        {
            let store = Arc::clone(&store);
            workers.push(thread::spawn(move || {
                for _ in 0..2000 {
                    if let Some(v) = store.get("binance", "BTCUSDT", Segment::Um, "aggTrade") {
                        assert_eq!(v["a"], v["b"]);
                    }
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }

        for w in 0..4u64 {
            let v = store.get("binance", &format!("SYM{w}"), Segment::Spot, "trade").unwrap();
            assert_eq!(*v, json!(499));
        }
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn keys_are_sorted() {
        let store = CanonicalStore::new();
        store.put("binance", "ETHUSDT", Segment::Um, "markPrice", "1");
        store.put("binance", "BTCUSDT", Segment::Spot, "trade", json!({}));

        let keys = store.keys();
        assert_eq!(keys[0].symbol, "BTCUSDT");
        assert_eq!(keys[1].to_string(), "binance/ETHUSDT/um/markPrice");
    }
}
