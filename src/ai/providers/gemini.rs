use crate::ai::client::{ChatError, ChatResult, CompletionClient, run_cancellable};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1/models/gemini-2.5-flash:generateContent";

pub const MAX_TOKENS_REPLY: &str = "I apologize, but my response was cut off due to length limits. Could you please try asking a more specific or shorter question?";
pub const SAFETY_REPLY: &str = "I'm sorry, but I can't provide a response to that message due to content policy restrictions.";

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str, generation_config: GenerationConfig) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config,
        }
    }
}

// Response envelope. Every field is optional because the endpoint does not
// always send the same shape, and a field of the wrong type reads as absent
// without discarding its siblings.

/// Decode a field, falling back to its default when the JSON type is wrong.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub candidates: Vec<Candidate>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<CandidateContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default, deserialize_with = "lenient")]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Parse a success body. Non-JSON is a decode error; a body that is not
    /// an object becomes an empty envelope so extraction reports it.
    pub fn parse(body: &str) -> ChatResult<Self> {
        let value: Value = serde_json::from_str(body)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

impl Candidate {
    fn has_parts(&self) -> bool {
        self.content
            .as_ref()
            .is_some_and(|content| !content.parts.is_empty())
    }
}

type Extractor = fn(&GenerateContentResponse) -> Option<String>;

/// Tried in order; the first hit wins.
const EXTRACTORS: &[Extractor] = &[
    length_limited,
    safety_blocked,
    primary_content,
    candidate_text,
    candidate_message,
    other_finish_reason,
    top_level_text,
    top_level_message,
];

fn finish_reason(response: &GenerateContentResponse) -> Option<&str> {
    response.first_candidate()?.finish_reason.as_deref()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

fn length_limited(response: &GenerateContentResponse) -> Option<String> {
    (finish_reason(response) == Some("MAX_TOKENS")).then(|| MAX_TOKENS_REPLY.to_string())
}

fn safety_blocked(response: &GenerateContentResponse) -> Option<String> {
    (finish_reason(response) == Some("SAFETY")).then(|| SAFETY_REPLY.to_string())
}

fn primary_content(response: &GenerateContentResponse) -> Option<String> {
    let content = response.first_candidate()?.content.as_ref()?;
    content.parts.first()?.text.clone()
}

fn candidate_text(response: &GenerateContentResponse) -> Option<String> {
    non_empty(&response.first_candidate()?.text)
}

fn candidate_message(response: &GenerateContentResponse) -> Option<String> {
    non_empty(&response.first_candidate()?.message)
}

fn other_finish_reason(response: &GenerateContentResponse) -> Option<String> {
    let candidate = response.first_candidate()?;
    let reason = candidate.finish_reason.as_deref().filter(|r| !r.is_empty())?;
    if candidate.has_parts() {
        return None;
    }
    Some(format!(
        "Unable to generate a response. Reason: {reason}. Please try a different message."
    ))
}

fn top_level_text(response: &GenerateContentResponse) -> Option<String> {
    non_empty(&response.text)
}

fn top_level_message(response: &GenerateContentResponse) -> Option<String> {
    non_empty(&response.message)
}

pub fn extract_reply(response: &GenerateContentResponse) -> ChatResult<String> {
    EXTRACTORS
        .iter()
        .find_map(|extract| extract(response))
        .ok_or(ChatError::InvalidResponse)
}

/// Server-supplied reason for a failed call: `error.message`, then a
/// top-level `message`, then the raw body, then the status reason phrase.
fn api_error_message(status: StatusCode, body: &str) -> String {
    let from_body = match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| json.get("message").and_then(Value::as_str))
            .filter(|msg| !msg.is_empty())
            .map(str::to_string),
        Err(_) => Some(body.trim().to_string()).filter(|msg| !msg.is_empty()),
    };

    from_body.unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    generation_config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            tracing::error!(
                "Gemini API key is not configured. Set GEMINI_API_KEY in the environment or a .env file."
            );
        }

        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn generation_config(&self) -> GenerationConfig {
        self.generation_config
    }

    async fn complete(&self, prompt: &str, api_key: &str) -> ChatResult<String> {
        let body = GenerateContentRequest::new(prompt, self.generation_config);
        if let Ok(json) = serde_json::to_string_pretty(&body) {
            tracing::debug!("Sending request to Gemini: {}", json);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: api_error_message(status, &text),
            });
        }

        tracing::debug!("Full API response: {}", text);
        let parsed = GenerateContentResponse::parse(&text)?;
        extract_reply(&parsed).inspect_err(|_| {
            tracing::error!("Unexpected response structure: {}", text);
        })
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn generate_response(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ChatError::NotConfigured);
        };

        let result = run_cancellable(cancel, self.complete(prompt, api_key)).await;
        match &result {
            Err(ChatError::Cancelled) => tracing::debug!("Gemini request cancelled"),
            Err(err) => tracing::error!("Error calling Gemini API: {err}"),
            Ok(_) => {}
        }
        result
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
