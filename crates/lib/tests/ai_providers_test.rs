//! # AI Provider HTTP Tests
//!
//! Checks the request shape and reply extraction of the chat-completions and Gemini
//! providers against a mock server.

mod common;

use axiant::{
    providers::ai::{gemini::GeminiProvider, local::LocalAiProvider, AiProvider},
    CacheError,
};
use common::setup_tracing;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_local_provider_sends_chat_completion() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer groq-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Is the sky green?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"label\": \"Disinformation\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let provider = LocalAiProvider::new(
        format!("{}/v1/chat/completions", server.uri()),
        Some("groq-key".to_string()),
        Some("llama-3.3-70b-versatile".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    // --- 2. Act ---
    let reply = provider
        .generate("You are terse.", "Is the sky green?")
        .await
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(reply, "{\"label\": \"Disinformation\"}");
}

#[tokio::test]
async fn test_local_provider_surfaces_api_errors() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;
    let provider =
        LocalAiProvider::new(server.uri(), None, None, Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let err = provider.generate("s", "u").await.unwrap_err();

    // --- 3. Assert ---
    match err {
        CacheError::AiApi(message) => assert!(message.contains("rate limited")),
        other => panic!("expected AiApi, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gemini_provider_reads_first_candidate() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .and(query_param("key", "gemini-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Judge the claim."}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "```json\n{\"rating\": \"False\"}\n```"}]}}]
        })))
        .mount(&server)
        .await;
    let provider = GeminiProvider::new(
        format!(
            "{}/v1beta/models/gemini-2.0-flash:generateContent",
            server.uri()
        ),
        "gemini-key".to_string(),
        Duration::from_secs(5),
    )
    .unwrap();

    // --- 2. Act ---
    let reply = provider
        .generate("Judge the claim.", "Bats are blind")
        .await
        .unwrap();

    // --- 3. Assert ---
    assert!(reply.contains("\"rating\": \"False\""));
}

#[tokio::test]
async fn test_gemini_provider_without_candidates_is_empty() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;
    let provider =
        GeminiProvider::new(server.uri(), "k".to_string(), Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let reply = provider.generate("s", "u").await.unwrap();

    // --- 3. Assert ---
    assert!(reply.is_empty());
}
