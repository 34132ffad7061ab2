use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A chat target: the numeric id Telegram assigns, or a public `@handle`.
/// Serializes as a JSON number or string respectively, which is what the Bot
/// API accepts for every `chat_id` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    Id(i64),
    Handle(String),
}

impl ChatRef {
    /// Parse the stored string form back: signed integers become [`ChatRef::Id`],
    /// anything else stays a handle.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Handle(raw.to_string()),
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Handle(handle) => f.write_str(handle),
        }
    }
}

impl From<i64> for ChatRef {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => serializer.serialize_i64(*id),
            Self::Handle(handle) => serializer.serialize_str(handle),
        }
    }
}

impl<'de> Deserialize<'de> for ChatRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Handle(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Self::Id(id),
            Raw::Handle(handle) => Self::Handle(handle),
        })
    }
}

/// One incoming Bot API update. Only the `message` variant matters to the
/// relay; everything else is classified and dropped by the router.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    #[serde(default)]
    pub sticker: Option<IgnoredAny>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    pub fn has_command_entity(&self) -> bool {
        self.entities.iter().any(|e| e.entity_type == "bot_command")
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// "First Last" with absent parts dropped; empty when both are missing.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// One entry of the bot's command menu (`setMyCommands`).
#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ref_roundtrips_numeric_and_handle() {
        assert_eq!(ChatRef::parse("42"), ChatRef::Id(42));
        assert_eq!(ChatRef::parse("-1001234"), ChatRef::Id(-1_001_234));
        assert_eq!(
            ChatRef::parse("@somechannel"),
            ChatRef::Handle("@somechannel".into())
        );

        assert_eq!(serde_json::to_string(&ChatRef::Id(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&ChatRef::Handle("@c".into())).unwrap(),
            "\"@c\""
        );
    }

    #[test]
    fn update_parses_a_typical_text_message() {
        let raw = serde_json::json!({
            "update_id": 99,
            "message": {
                "message_id": 7,
                "from": {"id": 1001, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 1001, "type": "private"},
                "date": 1700000000,
                "text": "/ban 55",
                "entities": [{"type": "bot_command", "offset": 0, "length": 4}]
            }
        });
        let update: Update = serde_json::from_value(raw).unwrap();
        let message = update.message.unwrap();
        assert!(message.has_command_entity());
        assert_eq!(message.sender_id(), Some(1001));
        assert_eq!(message.text.as_deref(), Some("/ban 55"));
    }

    #[test]
    fn update_without_message_is_tolerated() {
        let raw = serde_json::json!({
            "update_id": 100,
            "edited_message": {"message_id": 1}
        });
        let update: Update = serde_json::from_value(raw).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn full_name_drops_missing_parts() {
        let user = User {
            id: 1,
            first_name: Some("Ada".into()),
            last_name: None,
            username: None,
        };
        assert_eq!(user.full_name(), "Ada");
    }
}
