//! Chat-completion payload model.
//!
//! Messages are held as raw JSON so that fields this crate does not model
//! (names, tool calls, multimodal parts, ...) survive a rewrite verbatim.
//! Only the `content` of a user message is ever replaced.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

pub const USER_ROLE: &str = "user";

const ROLE_KEY: &str = "role";
const CONTENT_KEY: &str = "content";
const MESSAGES_KEY: &str = "messages";

/// One entry of a chat payload's `messages` array.
///
/// Any JSON value is accepted, including non-objects, so a malformed entry is
/// carried through untouched instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(Value);

impl ChatMessage {
    #[must_use]
    pub fn new(role: &str, content: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(ROLE_KEY.to_string(), Value::String(role.to_string()));
        fields.insert(CONTENT_KEY.to_string(), content.into());
        Self(Value::Object(fields))
    }

    #[must_use]
    pub fn user(content: impl Into<Value>) -> Self {
        Self::new(USER_ROLE, content)
    }

    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.0.get(ROLE_KEY).and_then(Value::as_str)
    }

    #[must_use]
    pub fn content(&self) -> Option<&Value> {
        self.0.get(CONTENT_KEY)
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role() == Some(USER_ROLE)
    }

    /// Plain-text content of a user message.
    ///
    /// `None` for other roles and for structured content (arrays of parts,
    /// objects, null), which is never compressed.
    #[must_use]
    pub fn user_text(&self) -> Option<&str> {
        if self.is_user() {
            self.content().and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Replace the content with plain text, keeping every other field and its
    /// position. No-op for entries that are not JSON objects.
    pub fn set_text(&mut self, text: String) {
        if let Some(fields) = self.0.as_object_mut() {
            fields.insert(CONTENT_KEY.to_string(), Value::String(text));
        }
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ChatMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request body is not a JSON object")]
    NotAnObject,
    #[error("request body has no `messages` field")]
    MissingMessages,
    #[error("`messages` is not an array")]
    MessagesNotArray,
}

/// A parsed chat-completions request body.
///
/// Invariant: the body is a JSON object whose `messages` field is an array.
/// Every other field is kept as-is and serialized back in its original
/// position.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPayload {
    // `messages` stays in this map as a placeholder so its key position survives.
    fields: Map<String, Value>,
    messages: Vec<ChatMessage>,
}

impl ChatPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Value::Object(mut fields) = value else {
            return Err(PayloadError::NotAnObject);
        };
        let slot = fields
            .get_mut(MESSAGES_KEY)
            .ok_or(PayloadError::MissingMessages)?;
        let Value::Array(raw) = std::mem::take(slot) else {
            return Err(PayloadError::MessagesNotArray);
        };
        let messages = raw.into_iter().map(ChatMessage::from).collect();
        Ok(Self { fields, messages })
    }

    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        let mut fields = Map::new();
        fields.insert(MESSAGES_KEY.to_string(), Value::Null);
        Self { fields, messages }
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Swap in a new message sequence, returning the old one.
    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        std::mem::replace(&mut self.messages, messages)
    }

    /// A non-`messages` top-level field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        if key == MESSAGES_KEY {
            return None;
        }
        self.fields.get(key)
    }

    /// Serialize back to UTF-8 JSON (non-ASCII characters are not escaped).
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for ChatPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            if key == MESSAGES_KEY {
                map.serialize_entry(key, &self.messages)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}
