//! Wire protocol between a parent process and its direct children

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Events understood by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Child -> parent: the hosted service finished `create()`
    Ready,
    /// Parent -> child: begin an orderly shutdown
    Close,
    /// Child -> parent: the child finished its own teardown
    Teardown,
}

impl Event {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::Close => "close",
            Event::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Event::Ready),
            "close" => Ok(Event::Close),
            "teardown" => Ok(Event::Teardown),
            other => Err(format!("unknown event: {}", other)),
        }
    }
}

/// A single protocol message: `{event, data?, error?}`
///
/// The event name is kept as a plain string so that peers speaking a newer
/// dialect do not break older ones; unknown events are simply ignored by
/// the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Event name
    pub event: String,

    /// Arbitrary payload (readiness result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message reported by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Create a bare message for an event
    pub fn new(event: Event) -> Self {
        Self {
            event: event.as_str().to_string(),
            data: None,
            error: None,
        }
    }

    /// Successful readiness report carrying the `create()` result
    pub fn ready(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(Event::Ready)
        }
    }

    /// Failed readiness report
    pub fn ready_failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(Event::Ready)
        }
    }

    /// Shutdown request sent by a launcher to its child
    pub fn close() -> Self {
        Self::new(Event::Close)
    }

    /// Teardown report, optionally carrying the error that caused it
    pub fn teardown(error: Option<String>) -> Self {
        Self {
            error,
            ..Self::new(Event::Teardown)
        }
    }

    /// Parsed event kind, `None` for events this version does not know
    pub fn kind(&self) -> Option<Event> {
        self.event.parse().ok()
    }

    /// Whether this message reports a failure
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_wire_format() {
        let msg = Message::ready(json!({"port": 8080}));
        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded, json!({"event": "ready", "data": {"port": 8080}}));
    }

    #[test]
    fn test_close_has_no_optional_fields() {
        let encoded = serde_json::to_string(&Message::close()).unwrap();
        assert_eq!(encoded, r#"{"event":"close"}"#);
    }

    #[test]
    fn test_teardown_carries_error() {
        let msg: Message =
            serde_json::from_str(r#"{"event":"teardown","error":"boom"}"#).unwrap();
        assert_eq!(msg.kind(), Some(Event::Teardown));
        assert_eq!(msg.error.as_deref(), Some("boom"));
        assert!(msg.is_error());
    }

    #[test]
    fn test_unknown_event_is_tolerated() {
        let msg: Message = serde_json::from_str(r#"{"event":"heartbeat","data":1}"#).unwrap();
        assert_eq!(msg.kind(), None);
        assert_eq!(msg.data, Some(json!(1)));
    }

    #[test]
    fn test_failed_ready() {
        let msg = Message::ready_failed("port in use");
        assert_eq!(msg.kind(), Some(Event::Ready));
        assert!(msg.data.is_none());
        assert_eq!(msg.error.as_deref(), Some("port in use"));
    }
}
