//! Request signing for Binance signed endpoints (HMAC-SHA256).
//!
//! The signature is the hex HMAC-SHA256 of the URL-encoded query string,
//! keyed by the API secret, appended as `&signature=<hex>`.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `message` keyed by `secret`, as lowercase hex.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// URL-encode `params`, join them with `&`, and append the signature.
/// `params` must already include `timestamp`.
pub fn build_signed_query(params: &[(&str, &str)], secret: &str) -> Result<String, InvalidLength> {
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let signature = hmac_sha256_sign(secret, &query)?;
    Ok(format!("{query}&signature={signature}"))
}

pub(crate) fn current_timestamp_ms() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}
