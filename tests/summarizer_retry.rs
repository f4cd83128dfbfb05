//! Retry-policy tests for the summarization client against a mock API.

use std::time::{Duration, Instant};

use docloader::config::SummarizerSettings;
use docloader::summarizer::{SummarizeError, SummarizerClient};
use httpmock::{Method::POST, MockServer};
use serde_json::json;

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn client_for(server: &MockServer, max_attempts: u32, transport_backoff_secs: u64) -> SummarizerClient {
    SummarizerClient::new(SummarizerSettings {
        endpoint: server.base_url(),
        model: "gemini-2.0-flash".to_string(),
        api_key: "test-key".to_string(),
        max_attempts,
        transport_backoff_secs,
        rate_limit_wait_secs: 30,
        request_timeout_secs: 5,
        max_content_chars: 48_000,
    })
}

fn success_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}

#[tokio::test]
async fn rate_limit_hint_delays_the_next_attempt() {
    let server = MockServer::start_async().await;
    let limited = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(429).header("Retry-After", "1").body("");
        })
        .await;

    let client = client_for(&server, 2, 0);
    let started = Instant::now();
    let result = client.summarize("some document text").await;

    // Two attempts spent the budget; the second started no earlier than
    // the hinted one second after the first.
    assert!(matches!(result, Err(SummarizeError::RateLimited { .. })));
    assert_eq!(limited.hits_async().await, 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn recovers_after_transient_failures_within_budget() {
    let server = MockServer::start_async().await;
    let mut failing = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(500).body("upstream exploded");
        })
        .await;

    let client = client_for(&server, 3, 1);
    let handle = tokio::spawn(async move { client.summarize("some document text").await });

    // Let two attempts fail, then swap the endpoint to a success response
    // during the backoff window.
    while failing.hits_async().await < 2 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    failing.delete_async().await;
    let ok = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(success_body("a fine summary"));
        })
        .await;

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary, "a fine summary");
    assert_eq!(ok.hits_async().await, 1);
}

#[tokio::test]
async fn transport_budget_exhaustion_propagates_the_error() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(503).body("");
        })
        .await;

    let client = client_for(&server, 2, 0);
    let result = client.summarize("text").await;

    assert!(matches!(result, Err(SummarizeError::Transport(_))));
    assert_eq!(failing.hits_async().await, 2);
}

#[tokio::test]
async fn malformed_response_degrades_to_empty_summary_without_retry() {
    let server = MockServer::start_async().await;
    let odd = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            // Valid JSON, wrong shape: no candidates.
            then.status(200).json_body(json!({ "candidates": [] }));
        })
        .await;

    let client = client_for(&server, 3, 0);
    let summary = client.summarize("text").await.unwrap();

    assert_eq!(summary, "");
    assert_eq!(odd.hits_async().await, 1);
}

#[tokio::test]
async fn client_errors_are_terminal() {
    let server = MockServer::start_async().await;
    let denied = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(403).body("API key invalid");
        })
        .await;

    let client = client_for(&server, 3, 0);
    let result = client.summarize("text").await;

    assert!(matches!(result, Err(SummarizeError::Api { status: 403, .. })));
    assert_eq!(denied.hits_async().await, 1);
}

#[tokio::test]
async fn retry_delay_from_error_body_is_honored() {
    let server = MockServer::start_async().await;
    let limited = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(429).json_body(json!({
                "error": {
                    "code": 429,
                    "details": [
                        { "@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "1s" }
                    ]
                }
            }));
        })
        .await;

    let client = client_for(&server, 2, 0);
    let started = Instant::now();
    let result = client.summarize("text").await;

    assert!(matches!(result, Err(SummarizeError::RateLimited { .. })));
    assert_eq!(limited.hits_async().await, 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}
