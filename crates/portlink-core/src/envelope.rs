//! Wire envelope exchanged over a port.
//!
//! Every message is `{ "type": ..., "data": ... }`. The derived names
//! `<name>:response` and `<name>:error` are reserved for request/response
//! completions and must never be used as organic event names. Correlated
//! request traffic additionally carries a `"callId"` token, echoed on the
//! reply; compatibility-mode envelopes omit it entirely, so their wire shape
//! stays exactly `{type, data}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CallId;

/// Suffix of the derived success-reply name.
pub const RESPONSE_SUFFIX: &str = ":response";

/// Suffix of the derived failure-reply name.
pub const ERROR_SUFFIX: &str = ":error";

/// Failure message substituted when an `:error` payload is not a string.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Derived name carrying the successful reply for `name`.
#[must_use]
pub fn response_name(name: &str) -> String {
    format!("{name}{RESPONSE_SUFFIX}")
}

/// Derived name carrying the failure reply for `name`.
#[must_use]
pub fn error_name(name: &str) -> String {
    format!("{name}{ERROR_SUFFIX}")
}

/// Whether `name` collides with the reserved reply-name convention.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.ends_with(RESPONSE_SUFFIX) || name.ends_with(ERROR_SUFFIX)
}

/// Strip a reserved reply suffix, returning the base event name.
///
/// Returns `None` for organic (non-reply) names.
#[must_use]
pub fn base_name(name: &str) -> Option<&str> {
    name.strip_suffix(RESPONSE_SUFFIX)
        .or_else(|| name.strip_suffix(ERROR_SUFFIX))
}

/// One message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, or a reserved `:response` / `:error` derived name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload; shape varies by event name.
    pub data: Value,
    /// Correlation token echoed on replies. Absent on fire-and-forget
    /// events and on all compatibility-mode traffic.
    #[serde(rename = "callId", skip_serializing_if = "Option::is_none", default)]
    pub call_id: Option<CallId>,
}

impl Envelope {
    /// Fire-and-forget event envelope.
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: name.into(),
            data,
            call_id: None,
        }
    }

    /// Request envelope, correlated when `call_id` is present.
    pub fn request(name: impl Into<String>, call_id: Option<CallId>, data: Value) -> Self {
        Self {
            event_type: name.into(),
            data,
            call_id,
        }
    }

    /// Successful reply for `name`, echoing the request's correlation token.
    pub fn response(name: &str, call_id: Option<CallId>, data: Value) -> Self {
        Self {
            event_type: response_name(name),
            data,
            call_id,
        }
    }

    /// Failure reply for `name`. Only the message crosses the wire.
    pub fn failure(name: &str, call_id: Option<CallId>, message: impl Into<String>) -> Self {
        Self {
            event_type: error_name(name),
            data: Value::String(message.into()),
            call_id,
        }
    }

    /// Read an `:error` payload, falling back to [`UNKNOWN_ERROR`] when the
    /// payload is not a string.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.data
            .as_str()
            .map_or_else(|| UNKNOWN_ERROR.to_owned(), ToOwned::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Reserved name helpers ───────────────────────────────────────

    #[test]
    fn derived_names() {
        assert_eq!(response_name("page.getInfo"), "page.getInfo:response");
        assert_eq!(error_name("page.getInfo"), "page.getInfo:error");
    }

    #[test]
    fn reserved_name_detection() {
        assert!(is_reserved_name("ping:response"));
        assert!(is_reserved_name("ping:error"));
        assert!(!is_reserved_name("ping"));
        assert!(!is_reserved_name("ping:other"));
    }

    #[test]
    fn base_name_strips_either_suffix() {
        assert_eq!(base_name("ping:response"), Some("ping"));
        assert_eq!(base_name("ping:error"), Some("ping"));
        assert_eq!(base_name("ping"), None);
    }

    // ── Constructors ────────────────────────────────────────────────

    #[test]
    fn event_constructor() {
        let env = Envelope::event("download.progress", json!({"pct": 50}));
        assert_eq!(env.event_type, "download.progress");
        assert_eq!(env.data["pct"], 50);
        assert!(env.call_id.is_none());
    }

    #[test]
    fn response_constructor_derives_name_and_echoes_call_id() {
        let id = CallId::from("c1");
        let env = Envelope::response("echo", Some(id.clone()), json!(10));
        assert_eq!(env.event_type, "echo:response");
        assert_eq!(env.call_id, Some(id));
    }

    #[test]
    fn failure_constructor_carries_message_string() {
        let env = Envelope::failure("echo", None, "boom");
        assert_eq!(env.event_type, "echo:error");
        assert_eq!(env.data, json!("boom"));
        assert_eq!(env.failure_message(), "boom");
    }

    #[test]
    fn failure_message_falls_back_for_non_string_payload() {
        let env = Envelope {
            event_type: "echo:error".into(),
            data: json!({"weird": true}),
            call_id: None,
        };
        assert_eq!(env.failure_message(), UNKNOWN_ERROR);
    }

    // ── Wire format fixtures ────────────────────────────────────────

    #[test]
    fn wire_format_plain_event() {
        let env = Envelope::event("theme.changed", json!({"dark": true}));
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"theme.changed\""));
        assert!(!json.contains("callId"));
    }

    #[test]
    fn wire_format_correlated_request() {
        let env = Envelope::request("page.getInfo", Some(CallId::from("c42")), json!({}));
        let v: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "page.getInfo");
        assert_eq!(v["callId"], "c42");
    }

    #[test]
    fn wire_format_parses_legacy_envelope_without_call_id() {
        let raw = r#"{"type": "download.progress", "data": {"pct": 99}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.event_type, "download.progress");
        assert_eq!(env.data["pct"], 99);
        assert!(env.call_id.is_none());
    }

    #[test]
    fn wire_format_parses_correlated_reply() {
        let raw = r#"{"type": "echo:response", "data": 10, "callId": "c7"}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.event_type, "echo:response");
        assert_eq!(env.call_id, Some(CallId::from("c7")));
    }

    #[test]
    fn serde_round_trip() {
        let env = Envelope::failure("zoom.set", Some(CallId::new()), "out of range");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
