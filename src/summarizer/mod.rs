//! Client for the external summarization API.
//!
//! Targets a Gemini-style `generateContent` endpoint. Failures are
//! classified into a small taxonomy that drives the retry policy of the
//! summarization stage: rate limits honor the server's wait hint,
//! transport errors back off for a fixed interval, and a malformed
//! response body degrades to an empty summary instead of retrying, which
//! keeps the pipeline alive across upstream schema drift.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SummarizerSettings;

/// Errors from a single summarization attempt.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("rate limited, server asks to wait {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// Summarization API client.
pub struct SummarizerClient {
    settings: SummarizerSettings,
    client: Client,
}

/// Request format of the generateContent API.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Response format, reduced to the path the pipeline reads.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl SummarizerClient {
    /// Create a new client with the given configuration.
    pub fn new(settings: SummarizerSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { settings, client }
    }

    /// Summarize `text`, applying the stage retry policy within the
    /// configured attempt budget. A malformed response is a valid terminal
    /// outcome and yields an empty summary.
    pub async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let transport_backoff = Duration::from_secs(self.settings.transport_backoff_secs);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.request_summary(text).await {
                Ok(summary) => return Ok(summary),
                Err(e) => e,
            };

            match err {
                SummarizeError::Malformed(ref detail) => {
                    warn!(
                        detail = %detail,
                        "summarizer response did not match the expected structure, \
                         publishing empty summary"
                    );
                    return Ok(String::new());
                }
                SummarizeError::RateLimited { wait } if attempt < self.settings.max_attempts => {
                    warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        "summarizer rate limited, honoring wait hint"
                    );
                    tokio::time::sleep(wait).await;
                }
                SummarizeError::Transport(ref detail)
                    if attempt < self.settings.max_attempts =>
                {
                    warn!(attempt, detail = %detail, "summarizer transport error, backing off");
                    tokio::time::sleep(transport_backoff).await;
                }
                _ => return Err(err),
            }
        }
    }

    /// One attempt against the API.
    async fn request_summary(&self, text: &str) -> Result<String, SummarizeError> {
        let prompt = format!(
            "Summarize the following document in a concise way:\n\n{}",
            self.truncate_content(text)
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: 512,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        );

        debug!(model = %self.settings.model, "requesting summary");
        let resp = self
            .client
            .post(&url)
            .header("X-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizeError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            let wait = rate_limit_wait(
                headers.get(reqwest::header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
                &body,
            )
            .unwrap_or(Duration::from_secs(self.settings.rate_limit_wait_secs));
            return Err(SummarizeError::RateLimited { wait });
        }
        if status.is_server_error() {
            return Err(SummarizeError::Transport(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| SummarizeError::Malformed(e.to_string()))?;

        extract_summary(parsed).ok_or_else(|| {
            SummarizeError::Malformed("missing candidates[0].content.parts[0].text".to_string())
        })
    }

    /// Truncate content to the configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.settings.max_content_chars {
            return text;
        }
        // Find a valid UTF-8 boundary at or before the limit
        let mut end = self.settings.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }
}

fn extract_summary(resp: GenerateResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

/// Determine the wait a rate-limit response asks for: the `Retry-After`
/// header in seconds, or the `RetryInfo.retryDelay` detail ("30s") in the
/// error body.
fn rate_limit_wait(retry_after: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let details = value.get("error")?.get("details")?.as_array()?;
    for detail in details {
        let is_retry_info = detail
            .get("@type")
            .and_then(|t| t.as_str())
            .map(|t| t.ends_with("RetryInfo"))
            .unwrap_or(false);
        if !is_retry_info {
            continue;
        }
        let delay = detail.get("retryDelay")?.as_str()?;
        let secs = delay.trim_end_matches('s').parse::<u64>().ok()?;
        return Some(Duration::from_secs(secs));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_header_wins() {
        let wait = rate_limit_wait(Some("12"), "");
        assert_eq!(wait, Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_retry_info_detail_parsed_from_body() {
        let body = r#"{
            "error": {
                "code": 429,
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.ErrorInfo"},
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "30s"}
                ]
            }
        }"#;
        assert_eq!(rate_limit_wait(None, body), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_no_hint_yields_none() {
        assert_eq!(rate_limit_wait(None, "not json"), None);
        assert_eq!(rate_limit_wait(Some("soon"), "{}"), None);
    }

    #[test]
    fn test_extract_summary_reads_first_candidate() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"a summary"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_summary(resp).as_deref(), Some("a summary"));
    }

    #[test]
    fn test_extract_summary_rejects_empty_shapes() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_summary(resp).is_none());

        let resp: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert!(extract_summary(resp).is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let client = SummarizerClient::new(SummarizerSettings {
            max_content_chars: 5,
            ..Default::default()
        });
        // 'ä' is two bytes; the boundary at 5 falls inside it.
        let text = "abcdäf";
        let truncated = client.truncate_content(text);
        assert_eq!(truncated, "abcd");
    }
}
