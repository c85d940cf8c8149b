/// Completion client module
///
/// One outbound request per user turn, with cooperative cancellation and a
/// single success string (or a typed error) regardless of the response shape.
///
/// # Architecture
///
/// - `client` - `CompletionClient` trait, `ChatError`, cancellation helper
/// - `providers` - Gemini HTTP client and the offline canned responder
///
/// # Usage
///
/// ```rust,no_run
/// use chatbot::ai::{CompletionClient, GeminiClient};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> chatbot::ai::ChatResult<()> {
/// let client = GeminiClient::new(chatbot::ai::DEFAULT_ENDPOINT, Some("key".into()));
/// let reply = client.generate_response("Hello!", &CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
mod client;
pub mod providers;

// Re-export main types
pub use client::{ChatError, ChatResult, CompletionClient, run_cancellable};
pub use providers::gemini::{DEFAULT_ENDPOINT, GenerateContentResponse, extract_reply};
pub use providers::{CannedResponder, GeminiClient, ProviderClient};
