//! Conversation controller.
//!
//! Holds the current session collection and selection, and runs each user
//! turn: append the user message, call the completion client, append the
//! reply (or an apology). Every change to the collection is persisted through
//! the `SessionStore`.

use crate::ai::{ChatResult, CompletionClient};
use crate::sessions::{
    append_message_at, auto_title, create_session, delete_session, find_session,
    next_message_id, rename_session, rename_session_at, user_message_count,
};
use crate::storage::{SessionStore, StorageBackend};
use crate::types::{ChatMessage, ChatSession, SessionCollection};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub const APOLOGY: &str = "Sorry, I'm having trouble responding right now. Please try again later.";

/// A user turn whose reply has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    chat_id: String,
    prompt: String,
}

impl PendingTurn {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was appended as a bot message.
    Replied(String),
    /// The call failed; the fixed apology was appended instead.
    Apologized,
    /// The call was cancelled; nothing was appended.
    Cancelled,
}

pub struct ChatController<B, C> {
    store: SessionStore<B>,
    client: C,
    sessions: SessionCollection,
    current_id: Option<String>,
    busy: bool,
}

impl<B: StorageBackend, C: CompletionClient> ChatController<B, C> {
    /// Load sessions from `store`, write them back so a freshly seeded
    /// welcome session keeps its id across launches, and select the first one.
    pub fn open(store: SessionStore<B>, client: C) -> Self {
        let sessions = store.load();
        store.save(&sessions);
        let current_id = sessions.first().map(|session| session.id.clone());
        Self {
            store,
            client,
            sessions,
            current_id,
            busy: false,
        }
    }

    pub fn sessions(&self) -> &[Arc<ChatSession>] {
        &self.sessions
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn current_session(&self) -> Option<&Arc<ChatSession>> {
        find_session(&self.sessions, self.current_id.as_deref()?)
    }

    pub fn current_messages(&self) -> &[ChatMessage] {
        self.current_session()
            .map(|session| session.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &SessionStore<B> {
        &self.store
    }

    /// Prepend a fresh session and select it. Returns its id.
    pub fn new_chat(&mut self) -> String {
        let session = Arc::new(create_session(None));
        let id = session.id.clone();

        let mut next = Vec::with_capacity(self.sessions.len() + 1);
        next.push(session);
        next.extend(self.sessions.iter().cloned());
        self.commit(next);

        self.current_id = Some(id.clone());
        id
    }

    /// Select an existing session. Unknown ids leave the selection alone.
    pub fn select_chat(&mut self, chat_id: &str) -> bool {
        if find_session(&self.sessions, chat_id).is_none() {
            return false;
        }
        self.current_id = Some(chat_id.to_string());
        true
    }

    /// Delete a session. If it was selected, select the first remaining one,
    /// or start a new chat when none remain.
    pub fn delete_chat(&mut self, chat_id: &str) {
        let next = delete_session(&self.sessions, chat_id);
        self.commit(next);

        if self.current_id.as_deref() != Some(chat_id) {
            return;
        }
        match self.sessions.first() {
            Some(first) => self.current_id = Some(first.id.clone()),
            None => {
                self.new_chat();
            }
        }
    }

    /// Rename from user input: trimmed, and ignored when blank.
    pub fn rename_chat(&mut self, chat_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() || find_session(&self.sessions, chat_id).is_none() {
            return false;
        }
        let next = rename_session(&self.sessions, chat_id, title);
        self.commit(next);
        true
    }

    /// Append the user's message to the current session and mark the
    /// controller busy. The first user message also titles the session.
    /// Returns `None` when the input is blank, a turn is already pending,
    /// or no session is selected.
    pub fn begin_turn(&mut self, input: &str) -> Option<PendingTurn> {
        let text = input.trim();
        if text.is_empty() || self.busy {
            return None;
        }
        let chat_id = self.current_id.clone()?;
        let session = find_session(&self.sessions, &chat_id)?;

        let now = OffsetDateTime::now_utc();
        let message = ChatMessage::user(next_message_id(session, now), text, now);
        let mut next = append_message_at(&self.sessions, &chat_id, message, now);

        if find_session(&next, &chat_id).is_some_and(|session| user_message_count(session) == 1) {
            next = rename_session_at(&next, &chat_id, &auto_title(Some(text)), now);
        }

        self.commit(next);
        self.busy = true;
        Some(PendingTurn {
            chat_id,
            prompt: text.to_string(),
        })
    }

    /// Settle a pending turn. The reply lands in the session the turn started
    /// in, even if the selection has moved since.
    pub fn finish_turn(&mut self, turn: PendingTurn, result: ChatResult<String>) -> TurnOutcome {
        self.busy = false;

        let (text, outcome) = match result {
            Ok(reply) => (reply.clone(), TurnOutcome::Replied(reply)),
            Err(err) if err.is_cancelled() => {
                tracing::debug!(chat_id = %turn.chat_id, "turn cancelled");
                return TurnOutcome::Cancelled;
            }
            Err(err) => {
                tracing::warn!(chat_id = %turn.chat_id, "Error getting AI response: {err}");
                (APOLOGY.to_string(), TurnOutcome::Apologized)
            }
        };

        let now = OffsetDateTime::now_utc();
        let Some(session) = find_session(&self.sessions, &turn.chat_id) else {
            tracing::debug!(chat_id = %turn.chat_id, "session deleted before reply arrived");
            return outcome;
        };
        let message = ChatMessage::bot(next_message_id(session, now), text, now);
        let next = append_message_at(&self.sessions, &turn.chat_id, message, now);
        self.commit(next);
        outcome
    }

    /// Run one full turn. `None` means the input was not accepted.
    pub async fn send_message(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Option<TurnOutcome> {
        let turn = self.begin_turn(input)?;
        let result = self.client.generate_response(turn.prompt(), cancel).await;
        Some(self.finish_turn(turn, result))
    }

    /// Replace the collection and persist it if anything changed. An empty
    /// collection is never written.
    fn commit(&mut self, next: SessionCollection) {
        let changed = next.len() != self.sessions.len()
            || next
                .iter()
                .zip(&self.sessions)
                .any(|(after, before)| !Arc::ptr_eq(after, before));
        self.sessions = next;

        if changed && !self.sessions.is_empty() {
            self.store.save(&self.sessions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChatError;
    use crate::sessions::{GREETING, WELCOME_TITLE};
    use crate::storage::MemoryStorage;
    use crate::types::Sender;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies from a script, one entry per call.
    struct ScriptedClient {
        replies: Mutex<Vec<ChatResult<String>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<ChatResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn generate_response(
            &self,
            _prompt: &str,
            _cancel: &CancellationToken,
        ) -> ChatResult<String> {
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn controller(
        replies: Vec<ChatResult<String>>,
    ) -> ChatController<Arc<MemoryStorage>, ScriptedClient> {
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        ChatController::open(store, ScriptedClient::new(replies))
    }

    fn stored(controller: &ChatController<Arc<MemoryStorage>, ScriptedClient>) -> SessionCollection {
        let raw = controller
            .store()
            .backend()
            .get(controller.store().key())
            .unwrap()
            .expect("collection persisted");
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_open_selects_first_session() {
        let chat = controller(vec![]);
        assert_eq!(chat.sessions().len(), 1);
        assert_eq!(chat.current_session().unwrap().title, WELCOME_TITLE);
        assert_eq!(chat.current_messages().len(), 1);
        assert!(!chat.is_busy());
    }

    #[test]
    fn test_open_persists_seeded_session() {
        let backend = Arc::new(MemoryStorage::new());
        let first = ChatController::open(
            SessionStore::new(backend.clone()),
            ScriptedClient::new(vec![]),
        );
        let seeded = first.current_id().unwrap().to_string();
        assert_eq!(stored(&first).len(), 1);

        let second = ChatController::open(SessionStore::new(backend), ScriptedClient::new(vec![]));
        assert_eq!(second.current_id(), Some(seeded.as_str()));
        assert_eq!(second.sessions().len(), 1);
    }

    #[test]
    fn test_begin_turn_guards() {
        let mut chat = controller(vec![]);
        assert!(chat.begin_turn("   ").is_none());

        let turn = chat.begin_turn("  first  ").unwrap();
        assert_eq!(turn.prompt(), "first");
        assert!(chat.is_busy());
        assert!(chat.begin_turn("second").is_none());
        assert_eq!(chat.current_messages().len(), 2);
    }

    #[test]
    fn test_first_user_message_sets_title_once() {
        let mut chat = controller(vec![]);
        let turn = chat.begin_turn("plan a weekend trip to the coast").unwrap();
        assert_eq!(chat.current_session().unwrap().title, "plan a weekend trip...");
        chat.finish_turn(turn, Ok("Sure!".to_string()));

        let turn = chat.begin_turn("something else entirely").unwrap();
        chat.finish_turn(turn, Ok("ok".to_string()));
        assert_eq!(chat.current_session().unwrap().title, "plan a weekend trip...");
    }

    #[test]
    fn test_finish_turn_outcomes() {
        let mut chat = controller(vec![]);

        let turn = chat.begin_turn("hi").unwrap();
        let outcome = chat.finish_turn(turn, Ok("hello back".to_string()));
        assert_eq!(outcome, TurnOutcome::Replied("hello back".to_string()));

        let turn = chat.begin_turn("again").unwrap();
        let outcome = chat.finish_turn(turn, Err(ChatError::InvalidResponse));
        assert_eq!(outcome, TurnOutcome::Apologized);
        assert_eq!(chat.current_messages().last().unwrap().text, APOLOGY);

        let turn = chat.begin_turn("never mind").unwrap();
        let before = chat.current_messages().len();
        let outcome = chat.finish_turn(turn, Err(ChatError::Cancelled));
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(chat.current_messages().len(), before);
        assert!(!chat.is_busy());
    }

    #[test]
    fn test_reply_goes_to_originating_session() {
        let mut chat = controller(vec![]);
        let origin = chat.current_id().unwrap().to_string();
        let turn = chat.begin_turn("question").unwrap();

        let other = chat.new_chat();
        assert_eq!(chat.current_id(), Some(other.as_str()));
        chat.finish_turn(turn, Ok("answer".to_string()));

        let origin_session = find_session(chat.sessions(), &origin).unwrap();
        assert_eq!(origin_session.messages.last().unwrap().text, "answer");
        assert_eq!(chat.current_messages().len(), 1);
    }

    #[test]
    fn test_reply_for_deleted_session_is_dropped() {
        let mut chat = controller(vec![]);
        let origin = chat.current_id().unwrap().to_string();
        let turn = chat.begin_turn("question").unwrap();
        chat.delete_chat(&origin);

        let outcome = chat.finish_turn(turn, Ok("answer".to_string()));
        assert_eq!(outcome, TurnOutcome::Replied("answer".to_string()));
        assert!(find_session(chat.sessions(), &origin).is_none());
        assert!(chat.sessions().iter().all(|s| s.messages.len() == 1));
    }

    #[test]
    fn test_new_chat_prepends_and_persists() {
        let mut chat = controller(vec![]);
        let first = chat.current_id().unwrap().to_string();
        let id = chat.new_chat();

        assert_eq!(chat.sessions()[0].id, id);
        assert_eq!(chat.sessions()[1].id, first);
        assert_eq!(chat.current_session().unwrap().last_message, GREETING);

        let persisted = stored(&chat);
        let ids: Vec<&str> = persisted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![id.as_str(), first.as_str()]);
    }

    #[test]
    fn test_delete_current_falls_back() {
        let mut chat = controller(vec![]);
        let older = chat.current_id().unwrap().to_string();
        let newer = chat.new_chat();

        chat.delete_chat(&newer);
        assert_eq!(chat.current_id(), Some(older.as_str()));

        chat.delete_chat(&older);
        assert_eq!(chat.sessions().len(), 1);
        let replacement = chat.current_session().unwrap();
        assert_ne!(replacement.id, older);
        assert_eq!(replacement.messages[0].sender, Sender::Bot);
        assert_eq!(stored(&chat).len(), 1);
    }

    #[test]
    fn test_delete_other_keeps_selection() {
        let mut chat = controller(vec![]);
        let older = chat.current_id().unwrap().to_string();
        let newer = chat.new_chat();
        chat.delete_chat(&older);
        assert_eq!(chat.current_id(), Some(newer.as_str()));
        chat.delete_chat("missing");
        assert_eq!(chat.sessions().len(), 1);
    }

    #[test]
    fn test_rename_chat_trims_and_ignores_blank() {
        let mut chat = controller(vec![]);
        let id = chat.current_id().unwrap().to_string();

        assert!(!chat.rename_chat(&id, "   "));
        assert_eq!(chat.current_session().unwrap().title, WELCOME_TITLE);

        assert!(chat.rename_chat(&id, "  Budget  "));
        assert_eq!(chat.current_session().unwrap().title, "Budget");
        assert!(!chat.rename_chat("unknown", "x"));
    }

    #[test]
    fn test_select_chat() {
        let mut chat = controller(vec![]);
        let older = chat.current_id().unwrap().to_string();
        chat.new_chat();
        assert!(chat.select_chat(&older));
        assert_eq!(chat.current_id(), Some(older.as_str()));
        assert!(!chat.select_chat("nope"));
        assert_eq!(chat.current_id(), Some(older.as_str()));
    }

    #[tokio::test]
    async fn test_send_message_runs_full_turn() {
        let mut chat = controller(vec![Ok("hello back".to_string())]);
        let outcome = chat
            .send_message("hi", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Replied("hello back".to_string()));

        let session = chat.current_session().unwrap();
        assert_eq!(session.title, "hi");
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.last_message, "hello back");
        assert!(session.messages[1].id < session.messages[2].id);
    }
}
