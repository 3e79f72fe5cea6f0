//! Dialog bridge between the voice session and the message bus
//!
//! Wire shape: subjects are `<root>.<event>.<source>` with a JSON payload
//! `{"session_id": 0, "text": "..."}`. The gateway publishes under
//! [`PUB_ROOT`] and consumes `say`/`ask` events addressed to its source name
//! under [`SUB_ROOT`]. Session affecting work is injected through
//! [`DialogHandler`] rather than late-bound callbacks.

mod nats;

pub use nats::NatsDialog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Root of outbound subjects
pub const PUB_ROOT: &str = "raw_text";

/// Root of inbound subjects
pub const SUB_ROOT: &str = "speech";

/// Dialog event kinds carried in the subject's second token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A finalized wake utterance from the front-end
    Input,

    /// Backend requests unsolicited speech
    Say,

    /// Backend requests a spoken prompt answered by the next utterance
    Ask,

    /// The front-end's answer to an `ask`
    Response,
}

impl EventKind {
    /// Wire name of this event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Say => "say",
            Self::Ask => "ask",
            Self::Response => "response",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "input" => Some(Self::Input),
            "say" => Some(Self::Say),
            "ask" => Some(Self::Ask),
            "response" => Some(Self::Response),
            _ => None,
        }
    }
}

/// Message payload; `session_id` is fixed at 0 pending real multi-session
/// correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogPayload {
    /// Session correlation id (always 0)
    pub session_id: u64,

    /// Utterance or prompt text
    pub text: String,
}

/// Build a `<root>.<event>.<source>` subject
#[must_use]
pub fn subject(root: &str, event: EventKind, source: &str) -> String {
    format!("{root}.{}.{source}", event.as_str())
}

/// Extract the event kind from a `<root>.<event>.<source>` subject
#[must_use]
pub fn parse_subject(subject: &str) -> Option<EventKind> {
    let mut parts = subject.split('.');
    let _root = parts.next()?;
    let event = EventKind::parse(parts.next()?)?;
    let _source = parts.next()?;
    parts.next().is_none().then_some(event)
}

/// Session-affecting operations the bridge can invoke on inbound messages
#[async_trait]
pub trait DialogHandler: Send + Sync {
    /// Speak `text`; returns once the utterance is queued
    ///
    /// # Errors
    ///
    /// Returns error if the utterance cannot be queued
    async fn handle_say(&self, text: &str) -> Result<()>;

    /// Speak `text`, then wait for the next finalized utterance and return
    /// it (possibly empty)
    ///
    /// # Errors
    ///
    /// Returns error if the listening episode is abandoned
    async fn handle_ask(&self, text: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_round_trip() {
        let subject = subject(PUB_ROOT, EventKind::Input, "assistant");
        assert_eq!(subject, "raw_text.input.assistant");
        assert_eq!(parse_subject(&subject), Some(EventKind::Input));
    }

    #[test]
    fn malformed_subjects_are_rejected() {
        assert_eq!(parse_subject("speech.say"), None);
        assert_eq!(parse_subject("speech.shout.assistant"), None);
        assert_eq!(parse_subject("speech.say.assistant.extra"), None);
    }

    #[test]
    fn payload_wire_shape() {
        let payload = DialogPayload { session_id: 0, text: "Hello.".to_string() };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"session_id":0,"text":"Hello."}"#);

        let parsed: DialogPayload = serde_json::from_str(r#"{"session_id":0,"text":"hi"}"#).unwrap();
        assert_eq!(parsed.text, "hi");
    }

    #[test]
    fn event_names_round_trip() {
        for kind in [EventKind::Input, EventKind::Say, EventKind::Ask, EventKind::Response] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("unknown"), None);
    }
}
