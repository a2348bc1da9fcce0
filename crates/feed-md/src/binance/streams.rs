//! Stream names and combined-stream control messages.

use feed_core::Segment;

/// Combined-stream endpoint. Payloads arrive wrapped as `{"stream", "data"}`.
pub fn combined_stream_url(segment: Segment) -> &'static str {
    match segment {
        Segment::Spot => "wss://stream.binance.com:9443/stream",
        Segment::Um => "wss://fstream.binance.com/stream",
    }
}

/// `<symbol>@<stream type>` with the symbol lowercased.
pub fn stream_pair(symbol: &str, stream_type: &str) -> String {
    format!("{}@{stream_type}", symbol.to_lowercase())
}

pub fn build_subscribe(params: &[String], id: u64) -> String {
    control_message("SUBSCRIBE", params, id)
}

pub fn build_unsubscribe(params: &[String], id: u64) -> String {
    control_message("UNSUBSCRIBE", params, id)
}

fn control_message(method: &str, params: &[String], id: u64) -> String {
    serde_json::json!({
        "method": method,
        "params": params,
        "id": id
    })
    .to_string()
}

/// Uppercased symbol prefix of a per-symbol stream name
/// (`btcusdt@depth5@100ms` → `BTCUSDT`). Global streams (`!bookTicker`) and
/// listen-key streams carry no symbol.
pub fn symbol_from_stream(stream: &str) -> Option<String> {
    if stream.starts_with('!') {
        return None;
    }
    let prefix = stream.split('@').next()?;
    if prefix.is_empty() || prefix.len() == stream.len() {
        return None;
    }
    Some(prefix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_message() {
        let params = vec![stream_pair("BTCUSDT", "aggTrade"), "!markPrice@arr".to_string()];
        let msg: serde_json::Value = serde_json::from_str(&build_subscribe(&params, 3)).unwrap();
        assert_eq!(msg["method"], "SUBSCRIBE");
        assert_eq!(msg["params"][0], "btcusdt@aggTrade");
        assert_eq!(msg["params"][1], "!markPrice@arr");
        assert_eq!(msg["id"], 3);

        let msg: serde_json::Value = serde_json::from_str(&build_unsubscribe(&params, 4)).unwrap();
        assert_eq!(msg["method"], "UNSUBSCRIBE");
    }

    #[test]
    fn symbol_prefix() {
        assert_eq!(symbol_from_stream("btcusdt@depth5@100ms").as_deref(), Some("BTCUSDT"));
        assert_eq!(symbol_from_stream("ethusdt@bookTicker").as_deref(), Some("ETHUSDT"));
        assert_eq!(symbol_from_stream("!bookTicker"), None);
        assert_eq!(symbol_from_stream("!markPrice@arr@1s"), None);
        assert_eq!(symbol_from_stream("pqrsListenKey"), None);
    }

    #[test]
    fn endpoints() {
        assert!(combined_stream_url(Segment::Spot).ends_with("/stream"));
        assert!(combined_stream_url(Segment::Um).starts_with("wss://fstream"));
    }
}
