use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    User,
    Bot,
    System,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Bot => "Bot",
            Sender::System => "System",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a chat transcript. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_loading: bool,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp: Utc::now().timestamp_millis(),
            is_loading: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    /// Placeholder shown while a reply is outstanding; never stored in a transcript.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::new(Sender::Bot, "")
        }
    }

    pub fn to_event_payload(&self) -> Map<String, Value> {
        match json!({
            "message_id": self.id,
            "sender": self.sender.as_str(),
            "text": self.text,
            "timestamp": self.timestamp,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Chat,
    Vision,
}

impl AppMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AppMode::Chat => "chat",
            AppMode::Vision => "vision",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "chat" | "text" => Some(AppMode::Chat),
            "vision" | "image" => Some(AppMode::Vision),
            _ => None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{AppMode, Message, Sender};

    #[test]
    fn messages_get_distinct_ids_and_timestamps() {
        let first = Message::user("ping");
        let second = Message::bot("OK");
        assert_ne!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(first.sender, Sender::User);
        assert_eq!(second.sender, Sender::Bot);
        assert!(!first.is_loading);
    }

    #[test]
    fn loading_flag_only_serialized_when_set() -> anyhow::Result<()> {
        let stored = serde_json::to_value(Message::system("boom"))?;
        assert!(stored.get("is_loading").is_none());
        assert_eq!(stored["sender"], Value::String("System".to_string()));

        let placeholder = serde_json::to_value(Message::loading())?;
        assert_eq!(placeholder["is_loading"], Value::Bool(true));
        Ok(())
    }

    #[test]
    fn event_payload_carries_sender_and_text() {
        let message = Message::user("hello");
        let payload = message.to_event_payload();
        assert_eq!(payload["sender"], Value::String("User".to_string()));
        assert_eq!(payload["text"], Value::String("hello".to_string()));
        assert_eq!(payload["message_id"], Value::String(message.id.clone()));
    }

    #[test]
    fn app_mode_parses_aliases() {
        assert_eq!(AppMode::parse(" Vision "), Some(AppMode::Vision));
        assert_eq!(AppMode::parse("image"), Some(AppMode::Vision));
        assert_eq!(AppMode::parse("chat"), Some(AppMode::Chat));
        assert_eq!(AppMode::parse("video"), None);
        assert_eq!(AppMode::default(), AppMode::Chat);
    }
}
