pub mod canned;
pub mod gemini;

use crate::ai::client::{ChatResult, CompletionClient};
use crate::config::Config;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use canned::CannedResponder;
pub use gemini::GeminiClient;

const CANNED_DELAY: Duration = Duration::from_millis(600);

/// Enum to hold the configured completion backend
pub enum ProviderClient {
    Gemini(GeminiClient),
    Canned(CannedResponder),
}

impl ProviderClient {
    /// Offline mode selects canned replies; otherwise Gemini, with or without a key.
    pub fn from_config(config: &Config) -> Self {
        if config.offline {
            tracing::info!("offline mode: answering with canned replies");
            return Self::Canned(CannedResponder::new(CANNED_DELAY));
        }

        Self::Gemini(GeminiClient::new(
            config.endpoint.clone(),
            config.api_key.clone(),
        ))
    }
}

#[async_trait]
impl CompletionClient for ProviderClient {
    async fn generate_response(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        match self {
            ProviderClient::Gemini(client) => client.generate_response(prompt, cancel).await,
            ProviderClient::Canned(client) => client.generate_response(prompt, cancel).await,
        }
    }

    fn is_configured(&self) -> bool {
        match self {
            ProviderClient::Gemini(client) => client.is_configured(),
            ProviderClient::Canned(client) => client.is_configured(),
        }
    }
}
