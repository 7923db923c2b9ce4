use crate::recognizer::TranscriptEvent;
use serde::{Deserialize, Serialize};

pub use crate::recognizer::DEFAULT_FAILURE_MESSAGE;

/// JSON text frame sent to the client
///
/// Fields are omitted when absent:
/// - `{"type":"partial","text":"..."}`
/// - `{"type":"final","text":"..."}`
/// - `{"error":"..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResultKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Partial,
    Final,
}

impl OutboundMessage {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            kind: Some(ResultKind::Partial),
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            kind: Some(ResultKind::Final),
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            text: None,
            error: Some(message.into()),
        }
    }

    /// Translate a backend event into what the client sees
    ///
    /// `Started` and empty partials produce nothing.
    pub fn from_event(event: &TranscriptEvent) -> Option<Self> {
        match event {
            TranscriptEvent::Started { .. } => None,
            TranscriptEvent::Partial(text) if text.is_empty() => None,
            TranscriptEvent::Partial(text) => Some(Self::partial(text.as_str())),
            TranscriptEvent::Final(text) => {
                Some(Self::final_result(text.clone().unwrap_or_default()))
            }
            TranscriptEvent::Failure { .. } => event.failure().map(|e| Self::error(e.detail())),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
