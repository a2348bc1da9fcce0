//! Binance user-data session tokens (listen keys).
//!
//! | Operation          | Spot                           | USDT-margined          |
//! |--------------------|--------------------------------|------------------------|
//! | Validate key pair  | GET `/api/v3/account` (signed) | GET `/fapi/v2/balance` (signed) |
//! | Create listen key  | POST `/api/v3/userDataStream`  | POST `/fapi/v1/listenKey` |
//! | Keep alive         | PUT `/api/v3/userDataStream`   | PUT `/fapi/v1/listenKey`  |
//! | Close              | DELETE `/api/v3/userDataStream`| DELETE `/fapi/v1/listenKey` |
//!
//! Creating a listen key only needs the API key, so the signed probe runs
//! first to catch a wrong secret before a session is reported as open.
//!
//! A listen key stays valid for 60 minutes after the last keepalive.

use async_trait::async_trait;
use feed_core::Segment;
use serde_json::Value;
use tracing::{debug, info};

use super::auth;
use crate::SessionEndpoint;
use crate::credentials::KeyPair;
use crate::error::AuthError;

/// REST paths for one segment.
#[derive(Debug, Clone, Copy)]
struct Paths {
    probe: &'static str,
    listen_key: &'static str,
}

impl Paths {
    fn for_segment(segment: Segment) -> Self {
        match segment {
            Segment::Spot => Self {
                probe: "/api/v3/account",
                listen_key: "/api/v3/userDataStream",
            },
            Segment::Um => Self {
                probe: "/fapi/v2/balance",
                listen_key: "/fapi/v1/listenKey",
            },
        }
    }
}

/// Listen-key endpoint for one segment.
pub struct BinanceSessionEndpoint {
    segment: Segment,
    http: reqwest::Client,
    base_url: String,
    recv_window: u64,
    paths: Paths,
}

impl BinanceSessionEndpoint {
    pub fn new(
        segment: Segment,
        http: reqwest::Client,
        base_url: impl Into<String>,
        recv_window: u64,
    ) -> Self {
        Self {
            segment,
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            recv_window,
            paths: Paths::for_segment(segment),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Signed read-only request; any success means the secret is right.
    async fn probe(&self, keys: &KeyPair) -> Result<(), AuthError> {
        let timestamp = auth::current_timestamp_ms();
        let recv_window = self.recv_window.to_string();
        let query = auth::build_signed_query(
            &[("recvWindow", &recv_window), ("timestamp", &timestamp)],
            &keys.secret_key,
        )
        .map_err(|e| AuthError::Rejected {
            code: None,
            msg: format!("unusable secret key: {e}"),
        })?;
        let url = format!("{}?{}", self.url(self.paths.probe), query);
        let request = self.http.get(&url).header("X-MBX-APIKEY", &keys.api_key);
        read_response(request).await?;
        debug!("[auth] {} key pair validated", self.segment);
        Ok(())
    }
}

#[async_trait]
impl SessionEndpoint for BinanceSessionEndpoint {
    fn segment(&self) -> Segment {
        self.segment
    }

    async fn open(&self, keys: &KeyPair) -> Result<String, AuthError> {
        self.probe(keys).await?;

        let request = self
            .http
            .post(self.url(self.paths.listen_key))
            .header("X-MBX-APIKEY", &keys.api_key);
        let body = read_response(request).await?;
        let token = listen_key_from(&body).ok_or(AuthError::MissingToken)?;
        info!("[auth] {} listen key created", self.segment);
        Ok(token)
    }

    async fn renew(&self, keys: &KeyPair, token: &str) -> Result<String, AuthError> {
        let request = self
            .http
            .put(self.url(self.paths.listen_key))
            .header("X-MBX-APIKEY", &keys.api_key)
            .query(&[("listenKey", token)]);
        let body = read_response(request).await?;
        debug!("[auth] {} listen key keepalive sent", self.segment);
        // Spot answers `{}`; futures echoes the key, which may have changed.
        Ok(listen_key_from(&body).unwrap_or_else(|| token.to_owned()))
    }

    async fn close(&self, keys: &KeyPair, token: &str) -> Result<(), AuthError> {
        let request = self
            .http
            .delete(self.url(self.paths.listen_key))
            .header("X-MBX-APIKEY", &keys.api_key)
            .query(&[("listenKey", token)]);
        read_response(request).await?;
        Ok(())
    }
}

/// Send the request and sort the outcome: 4xx other than throttling is a
/// rejection carrying the exchange's `{code, msg}`, any other non-2xx is
/// transport.
async fn read_response(request: reqwest::RequestBuilder) -> Result<Value, AuthError> {
    let resp = request
        .send()
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;

    if status.is_success() {
        return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
    }
    Err(failure_from(status, &text))
}

/// 429 and 418 are rate limits and IP bans; they say nothing about the key
/// pair and must not end the session.
fn failure_from(status: reqwest::StatusCode, body: &str) -> AuthError {
    let throttled = status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::IM_A_TEAPOT;
    if status.is_client_error() && !throttled {
        return rejection_from(body, status.as_u16());
    }
    AuthError::Transport(format!("HTTP {status}: {body}"))
}

fn rejection_from(body: &str, status: u16) -> AuthError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_i64);
    let msg = parsed
        .as_ref()
        .and_then(|v| v.get("msg"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("HTTP {status}: {body}"), str::to_owned);
    AuthError::Rejected { code, msg }
}

fn listen_key_from(body: &Value) -> Option<String> {
    body.get("listenKey")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejection_carries_exchange_code() {
        let err = rejection_from(
            r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#,
            401,
        );
        assert_eq!(
            err,
            AuthError::Rejected {
                code: Some(-2015),
                msg: "Invalid API-key, IP, or permissions for action.".into(),
            }
        );
    }

    #[test]
    fn rejection_without_json_body() {
        let err = rejection_from("Forbidden", 403);
        assert_eq!(
            err,
            AuthError::Rejected {
                code: None,
                msg: "HTTP 403: Forbidden".into(),
            }
        );
    }

    #[test]
    fn throttling_is_transport_not_rejection() {
        let body = r#"{"code":-1003,"msg":"Too many requests; current limit is 6000."}"#;
        let err = failure_from(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(err.is_transport(), "{err:?}");

        let err = failure_from(reqwest::StatusCode::IM_A_TEAPOT, body);
        assert!(err.is_transport(), "{err:?}");

        let err = failure_from(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"code":-1125,"msg":"This listenKey does not exist."}"#,
        );
        assert_eq!(
            err,
            AuthError::Rejected {
                code: Some(-1125),
                msg: "This listenKey does not exist.".into(),
            }
        );

        let err = failure_from(reqwest::StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(err.is_transport());
    }

    #[test]
    fn listen_key_extraction() {
        let key = "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1";
        assert_eq!(
            listen_key_from(&json!({ "listenKey": key })).as_deref(),
            Some(key)
        );
        assert_eq!(listen_key_from(&json!({})), None);
        assert_eq!(listen_key_from(&json!({"listenKey": ""})), None);
    }

    #[test]
    fn segment_paths() {
        let ep = BinanceSessionEndpoint::new(
            Segment::Um,
            reqwest::Client::new(),
            "https://fapi.binance.com/",
            5000,
        );
        assert_eq!(
            ep.url(ep.paths.listen_key),
            "https://fapi.binance.com/fapi/v1/listenKey"
        );
        assert_eq!(Paths::for_segment(Segment::Spot).probe, "/api/v3/account");
    }
}
