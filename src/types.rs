use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    pub fn user(id: u64, text: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            id,
            text: text.into(),
            sender: Sender::User,
            timestamp,
        }
    }

    pub fn bot(id: u64, text: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            id,
            text: text.into(),
            sender: Sender::Bot,
            timestamp,
        }
    }
}

/// A persisted conversation. Field names follow the on-device schema
/// (`createdAt`, `updatedAt`, `lastMessage`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub last_message: String,
}

/// Ordered sessions in display order. Entries are shared so an update only
/// reallocates the session it touches.
pub type SessionCollection = Vec<Arc<ChatSession>>;
