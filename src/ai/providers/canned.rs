use crate::ai::client::{ChatResult, CompletionClient, run_cancellable};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CANNED_REPLIES: &[&str] = &[
    "I understand. Could you please provide more details?",
    "That's interesting! Tell me more.",
    "I'm here to help. What else would you like to discuss?",
    "Can you elaborate on that?",
    "How does that make you feel?",
    "What are your thoughts on this?",
    "Let's explore that further.",
    "Could you clarify what you mean?",
    "That's a great point!",
    "I'm glad you brought that up.",
];

/// Offline stand-in for the API: answers every prompt with a random canned line
/// after `delay`.
#[derive(Debug, Clone, Default)]
pub struct CannedResponder {
    delay: Duration,
}

impl CannedResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

pub fn random_reply() -> &'static str {
    CANNED_REPLIES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(CANNED_REPLIES[0])
}

#[async_trait]
impl CompletionClient for CannedResponder {
    async fn generate_response(
        &self,
        _prompt: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        let delay = self.delay;
        run_cancellable(cancel, async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(random_reply().to_string())
        })
        .await
    }
}
