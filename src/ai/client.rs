use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================
// Error Types
// ============================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No API credential; raised before any network I/O.
    #[error("Gemini API key is not configured")]
    NotConfigured,

    /// The caller cancelled the request. Not a failure to report to the user.
    #[error("Request was cancelled")]
    Cancelled,

    #[error("Gemini API Error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid response format from Gemini API")]
    InvalidResponse,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================
// Client seam
// ============================================

/// One outbound completion per user turn.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Resolve `prompt` into reply text. Cancelling `cancel` before the call
    /// settles yields `ChatError::Cancelled` and never a reply; cancelling
    /// afterwards has no effect.
    async fn generate_response(&self, prompt: &str, cancel: &CancellationToken)
    -> ChatResult<String>;

    fn is_configured(&self) -> bool {
        true
    }
}

#[async_trait]
impl<C: CompletionClient + ?Sized> CompletionClient for Arc<C> {
    async fn generate_response(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        (**self).generate_response(prompt, cancel).await
    }

    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }
}

/// Race `request` against `cancel`; cancellation wins ties.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, request: F) -> ChatResult<T>
where
    F: Future<Output = ChatResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(ChatError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        result = request => result,
    }
}
