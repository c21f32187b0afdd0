use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// One chat line as it travels over the wire: `{"from": ..., "text": ...}`.
///
/// Fields are private so a message can't be altered once built; use
/// [`ChatMessage::new`] for local messages and [`ChatMessage::from_frame`]
/// for inbound ones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    from: String,
    text: String,
}

impl ChatMessage {
    /// Builds a local message. `text` is trimmed; both fields must be non-blank.
    pub fn new(from: impl Into<String>, text: &str) -> Result<Self, ChatError> {
        let from = from.into();
        if from.trim().is_empty() {
            return Err(ChatError::InvalidMessage("sender identity is empty"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidMessage("message text is empty"));
        }
        Ok(ChatMessage {
            from,
            text: text.to_string(),
        })
    }

    /// Decodes one inbound frame payload.
    ///
    /// The payload must be UTF-8 JSON carrying non-blank `from` and `text`
    /// strings. Extra fields are ignored.
    pub fn from_frame(payload: &[u8]) -> Result<Self, ChatError> {
        let raw = std::str::from_utf8(payload)
            .map_err(|e| ChatError::MalformedFrame(format!("invalid utf-8: {e}")))?;
        let message: ChatMessage = serde_json::from_str(raw)
            .map_err(|e| ChatError::MalformedFrame(e.to_string()))?;
        if message.from.trim().is_empty() {
            return Err(ChatError::MalformedFrame("empty `from`".to_string()));
        }
        if message.text.trim().is_empty() {
            return Err(ChatError::MalformedFrame("empty `text`".to_string()));
        }
        Ok(message)
    }

    /// Serializes the message to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
