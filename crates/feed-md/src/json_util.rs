//! Numeric parsing helpers.
//!
//! Binance encodes prices and quantities as decimal strings. Records keep
//! them as strings (so the store holds exactly what the exchange sent) and
//! parse on demand through these helpers.

/// Parse a decimal string as `f64`.
#[inline]
pub fn parse_decimal(s: &str) -> Option<f64> {
    fast_float2::parse(s).ok()
}

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        parse_decimal(s)
    } else {
        v.as_f64()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decimal_strings_and_numbers() {
        assert_eq!(parse_decimal("25.35190000"), Some(25.3519));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_str_f64(Some(&json!("0.0001"))), Some(0.0001));
        assert_eq!(parse_str_f64(Some(&json!(1.5))), Some(1.5));
        assert_eq!(parse_str_f64(None), None);
    }
}
