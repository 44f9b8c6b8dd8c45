//! Command protocol: one JSON object per line, UTF-8, in both directions.
//!
//! Requests are tagged by `"cmd"`. Responses are free-form envelopes with a
//! `"status"` field (`"ok"`, `"error"`, or the deferred `"transcribing"`
//! shape that is followed by exactly one result envelope on the same
//! connection).

use serde::{Deserialize, Serialize};

/// How long a client waits for a response before giving up. Generous enough
/// to cover a full transcription round-trip.
pub const RECV_TIMEOUT_MS: u64 = 30_000;

/// Entries returned by `history` when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// A client request. Unknown `cmd` values fail to deserialize; the daemon
/// answers those with an `unknown command` error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Request {
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Stop,
    Toggle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Status,
    History {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shapes() {
        let start: Request = serde_json::from_str(r#"{"cmd":"start","output":"clipboard"}"#).unwrap();
        assert_eq!(
            start,
            Request::Start {
                output: Some("clipboard".into())
            }
        );

        let stop: Request = serde_json::from_str(r#"{"cmd":"stop"}"#).unwrap();
        assert_eq!(stop, Request::Stop);

        let toggle: Request = serde_json::from_str(r#"{"cmd":"toggle"}"#).unwrap();
        assert_eq!(toggle, Request::Toggle { output: None });

        let history: Request = serde_json::from_str(r#"{"cmd":"history","limit":5}"#).unwrap();
        assert_eq!(history, Request::History { limit: Some(5) });
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"cmd":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"limit":5}"#).is_err());
    }

    #[test]
    fn test_serialize_omits_absent_options() {
        let json = serde_json::to_string(&Request::Start { output: None }).unwrap();
        assert_eq!(json, r#"{"cmd":"start"}"#);
    }
}
