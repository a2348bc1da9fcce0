//! Inbound message classification.
//!
//! Combined-stream connections deliver three kinds of JSON objects:
//!
//! | shape                                  | meaning                         |
//! |----------------------------------------|---------------------------------|
//! | `{"stream": "...", "data": {..}\|[..]}` | market / user data              |
//! | `{"result": null, "id": 1}`            | (un)subscribe acknowledgement   |
//! | anything else, e.g. `{"code": 2, "msg": "Invalid request"}` | exchange error notification |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-pushed error notification. Not a local fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeNotification {
    pub code: Option<i64>,
    pub msg: Option<String>,
}

impl ExchangeNotification {
    fn from_message(message: &Value) -> Self {
        Self {
            code: message.get("code").and_then(Value::as_i64),
            msg: message.get("msg").and_then(Value::as_str).map(str::to_owned),
        }
    }
}

impl std::fmt::Display for ExchangeNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.msg) {
            (Some(code), Some(msg)) => write!(f, "error code {code}: {msg}"),
            (Some(code), None) => write!(f, "error code {code}"),
            (None, Some(msg)) => write!(f, "error: {msg}"),
            (None, None) => f.write_str("error notification without code or message"),
        }
    }
}

/// Data payload of a stream envelope.
#[derive(Debug, PartialEq)]
pub enum Payload<'a> {
    Single(&'a Value),
    Batch(&'a [Value]),
}

impl Payload<'_> {
    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A classified inbound message, borrowing from the decoded JSON.
#[derive(Debug, PartialEq)]
pub enum Envelope<'a> {
    /// Stream data with the name of the originating feed.
    Stream { stream: &'a str, data: Payload<'a> },
    /// Acknowledgement of a SUBSCRIBE / UNSUBSCRIBE request.
    Ack { id: Option<&'a Value> },
    /// Anything lacking both a stream name and a data payload.
    Notification(ExchangeNotification),
}

impl<'a> Envelope<'a> {
    pub fn classify(message: &'a Value) -> Self {
        let stream = message.get("stream").and_then(Value::as_str);
        let data = message.get("data");

        if let (Some(stream), Some(data)) = (stream, data) {
            let data = match data {
                Value::Array(records) => Payload::Batch(records),
                record => Payload::Single(record),
            };
            return Self::Stream { stream, data };
        }

        if message.get("code").is_none()
            && message.get("result").is_some_and(Value::is_null)
            && message.get("id").is_some()
        {
            return Self::Ack { id: message.get("id") };
        }

        Self::Notification(ExchangeNotification::from_message(message))
    }
}
