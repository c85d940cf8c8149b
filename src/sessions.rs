//! Session mutation engine.
//!
//! Every function here is pure: it reads the current collection and returns a
//! new one. Sessions that an operation does not touch are carried over as the
//! same `Arc`, so callers can compare entries with `Arc::ptr_eq` to find out
//! what changed. Each operation reads the clock once; the `*_at` variants take
//! that instant explicitly.

use crate::format::{ELLIPSIS, default_chat_title, preview, truncate_chars};
use crate::types::{ChatMessage, ChatSession, Sender, SessionCollection};
use rand::Rng;
use std::sync::Arc;
use time::OffsetDateTime;

pub const GREETING: &str = "Hello! How can I assist you today?";
pub const WELCOME_TITLE: &str = "Welcome Chat";
pub const FALLBACK_TITLE: &str = "New Chat";

const GREETING_ID: u64 = 1;
const PREVIEW_CHARS: usize = 50;
const TITLE_CHARS: usize = 30;
const TITLE_WORDS: usize = 4;
const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn unix_millis(at: OffsetDateTime) -> u64 {
    u64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
}

/// `chat_<millis>_<9 base36 chars>`
pub fn generate_chat_id(now: OffsetDateTime) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("chat_{}_{}", unix_millis(now), suffix)
}

pub fn create_session(title_override: Option<&str>) -> ChatSession {
    create_session_at(title_override, OffsetDateTime::now_utc())
}

pub fn create_session_at(title_override: Option<&str>, now: OffsetDateTime) -> ChatSession {
    let title = match title_override {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => default_chat_title(now),
    };

    ChatSession {
        id: generate_chat_id(now),
        title,
        messages: vec![ChatMessage::bot(GREETING_ID, GREETING, now)],
        created_at: now,
        updated_at: now,
        last_message: GREETING.to_string(),
    }
}

/// Preview shown in the session list for the latest message.
pub fn preview_text(text: &str) -> String {
    preview(text, PREVIEW_CHARS)
}

pub fn append_message(
    sessions: &[Arc<ChatSession>],
    chat_id: &str,
    message: ChatMessage,
) -> SessionCollection {
    append_message_at(sessions, chat_id, message, OffsetDateTime::now_utc())
}

pub fn append_message_at(
    sessions: &[Arc<ChatSession>],
    chat_id: &str,
    message: ChatMessage,
    now: OffsetDateTime,
) -> SessionCollection {
    let mut pending = Some(message);
    sessions
        .iter()
        .map(|session| {
            if session.id != chat_id {
                return Arc::clone(session);
            }
            let Some(message) = pending.take() else {
                return Arc::clone(session);
            };
            let mut updated = ChatSession::clone(session);
            updated.last_message = preview_text(&message.text);
            updated.messages.push(message);
            updated.updated_at = now;
            Arc::new(updated)
        })
        .collect()
}

/// Apply `patch` to the matching session and bump its `updated_at`.
pub fn update_session<F>(sessions: &[Arc<ChatSession>], chat_id: &str, patch: F) -> SessionCollection
where
    F: FnOnce(&mut ChatSession),
{
    update_session_at(sessions, chat_id, patch, OffsetDateTime::now_utc())
}

pub fn update_session_at<F>(
    sessions: &[Arc<ChatSession>],
    chat_id: &str,
    patch: F,
    now: OffsetDateTime,
) -> SessionCollection
where
    F: FnOnce(&mut ChatSession),
{
    let mut patch = Some(patch);
    sessions
        .iter()
        .map(|session| {
            if session.id != chat_id {
                return Arc::clone(session);
            }
            let Some(patch) = patch.take() else {
                return Arc::clone(session);
            };
            let mut updated = ChatSession::clone(session);
            patch(&mut updated);
            updated.updated_at = now;
            Arc::new(updated)
        })
        .collect()
}

/// Sets the title verbatim. Trimming and blank checks belong to the caller.
pub fn rename_session(
    sessions: &[Arc<ChatSession>],
    chat_id: &str,
    new_title: &str,
) -> SessionCollection {
    rename_session_at(sessions, chat_id, new_title, OffsetDateTime::now_utc())
}

pub fn rename_session_at(
    sessions: &[Arc<ChatSession>],
    chat_id: &str,
    new_title: &str,
    now: OffsetDateTime,
) -> SessionCollection {
    update_session_at(
        sessions,
        chat_id,
        |session| session.title = new_title.to_string(),
        now,
    )
}

pub fn delete_session(sessions: &[Arc<ChatSession>], chat_id: &str) -> SessionCollection {
    sessions
        .iter()
        .filter(|session| session.id != chat_id)
        .cloned()
        .collect()
}

pub fn find_session<'a>(
    sessions: &'a [Arc<ChatSession>],
    chat_id: &str,
) -> Option<&'a Arc<ChatSession>> {
    sessions.iter().find(|session| session.id == chat_id)
}

/// Title derived from the first user message: its first four words, cut to
/// 30 chars. The ellipsis is added when the *full* input is longer than
/// 30 chars, even if the four-word join itself fits.
pub fn auto_title(first_user_message: Option<&str>) -> String {
    let Some(text) = first_user_message.filter(|text| !text.trim().is_empty()) else {
        return FALLBACK_TITLE.to_string();
    };

    let joined = text
        .split_whitespace()
        .take(TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let mut title = truncate_chars(&joined, TITLE_CHARS).to_string();
    if text.chars().count() > TITLE_CHARS {
        title.push_str(ELLIPSIS);
    }
    title
}

pub fn user_message_count(session: &ChatSession) -> usize {
    session
        .messages
        .iter()
        .filter(|msg| msg.sender == Sender::User)
        .count()
}

/// Millisecond-derived id, bumped past the last id so ids in a session stay
/// unique and increasing even when two messages land in the same millisecond.
pub fn next_message_id(session: &ChatSession, now: OffsetDateTime) -> u64 {
    let floor = session
        .messages
        .last()
        .map(|msg| msg.id.saturating_add(1))
        .unwrap_or(GREETING_ID);
    unix_millis(now).max(floor)
}
