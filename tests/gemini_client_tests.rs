//! Gemini client against a mock HTTP endpoint

use chatbot::ai::{ChatError, CompletionClient, GeminiClient};
use chatbot::ai::providers::gemini::{MAX_TOKENS_REPLY, SAFETY_REPLY};
use chatbot::chat::{APOLOGY, ChatController, TurnOutcome};
use chatbot::storage::{MemoryStorage, SessionStore};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_PATH: &str = "/v1/models/test-model:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(format!("{}{API_PATH}", server.uri()), Some("test-key".into()))
}

async fn mount(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sends_prompt_key_and_generation_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": "What is Rust?" }] }],
            "generationConfig": { "topK": 40, "maxOutputTokens": 2048 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A systems language." }] },
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .generate_response("What is Rust?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, "A systems language.");
}

#[tokio::test]
async fn test_error_status_carries_server_message() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })),
    )
    .await;

    let err = client_for(&server)
        .generate_response("hi", &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ChatError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_status_with_plain_body() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(503).set_body_string("upstream overloaded")).await;

    let err = client_for(&server)
        .generate_response("hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Gemini API Error (503): upstream overloaded");
}

#[tokio::test]
async fn test_finish_reason_replies() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "half an ans" }] },
                "finishReason": "MAX_TOKENS"
            }]
        })),
    )
    .await;
    let reply = client_for(&server)
        .generate_response("long question", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, MAX_TOKENS_REPLY);

    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })),
    )
    .await;
    let reply = client_for(&server)
        .generate_response("bad question", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, SAFETY_REPLY);
}

#[tokio::test]
async fn test_unrecognized_shape_is_an_error() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "usageMetadata": {} })),
    )
    .await;

    let err = client_for(&server)
        .generate_response("hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidResponse));
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "text": "should never arrive" }))
            .set_delay(Duration::from_secs(10)),
    )
    .await;

    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.generate_response("slow", &cancel),
    )
    .await
    .expect("cancelled call should return before the server responds");
    assert!(matches!(result, Err(ChatError::Cancelled)));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = GeminiClient::new(format!("{}{API_PATH}", server.uri()), None);
    let err = client
        .generate_response("hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotConfigured));
}

#[tokio::test]
async fn test_controller_apologizes_on_server_error() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(500)).await;

    let store = SessionStore::new(MemoryStorage::new());
    let mut chat = ChatController::open(store, client_for(&server));
    let outcome = chat.send_message("hello?", &CancellationToken::new()).await;

    assert_eq!(outcome, Some(TurnOutcome::Apologized));
    let messages = chat.current_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].text, APOLOGY);
}
