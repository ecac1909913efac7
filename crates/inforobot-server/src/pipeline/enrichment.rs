//! Client for the external text-extraction model
//!
//! The service speaks the chat-completions protocol: one POST per URL, with the
//! extracted text returned in `choices[0].message.content`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;

const SYSTEM_PROMPT: &str = "You are a web content extractor.";

const EXTRACTION_PROMPT: &str = "\
Analyze the following webpage content and extract the most important information while:
1. If the URL links to WeChat, search the URL in Sogou.com and extract the content from the first five results.
2. Focusing on key content such as titles, subtitles, and main text, while ignoring irrelevant elements.
3. Ignoring advertisements, navigation menus, or promotional fluff.
4. Maintaining the original language (e.g., Traditional Chinese, Simplified Chinese, English).
5. Preserving the original text verbatim (do not paraphrase or modify wording).

Only return the extracted content in its original language and format, without your own reply.";

/// Error bodies are cut to this many characters before being stored
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("Rate limited by enrichment service (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Enrichment request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed enrichment response: {0}")]
    MalformedResponse(String),
}

impl EnrichmentError {
    /// Only rate limiting is worth retrying inside the same job
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnrichmentError::RateLimited { .. })
    }
}

/// Seam over the extraction service so workers can be tested without HTTP
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Return the extracted text for `url`
    async fn extract(&self, url: &str) -> Result<String, EnrichmentError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    stream: bool,
    temperature: f32,
}

impl<'a> ChatRequest<'a> {
    fn extraction(model: &'a str, temperature: f32, url: &str) -> Self {
        Self {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Here is the url and follow the prompt to deal with it: {}",
                        url
                    ),
                },
                ChatMessage {
                    role: "assistant",
                    content: EXTRACTION_PROMPT.to_string(),
                },
            ],
            model,
            stream: false,
            temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String, EnrichmentError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EnrichmentError::MalformedResponse("no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(EnrichmentError::MalformedResponse("empty content".to_string()));
        }
        Ok(content)
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Chat-completions client for the Grok extraction model
#[derive(Clone)]
pub struct GrokClient {
    client: Client,
    config: EnrichmentConfig,
}

impl GrokClient {
    pub fn new(config: EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("inforobot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EnrichmentError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn classify(&self, err: reqwest::Error) -> EnrichmentError {
        if err.is_timeout() {
            EnrichmentError::Timeout(self.config.timeout())
        } else {
            EnrichmentError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl EnrichmentService for GrokClient {
    #[tracing::instrument(skip(self), fields(model = %self.config.model))]
    async fn extract(&self, url: &str) -> Result<String, EnrichmentError> {
        let payload =
            ChatRequest::extraction(&self.config.model, self.config.temperature, url);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            warn!(?retry_after, "Enrichment service rate limited the request");
            return Err(EnrichmentError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("Unknown");
            let message = if body.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{}: {}", reason, truncate(&body))
            };
            return Err(EnrichmentError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| EnrichmentError::MalformedResponse(e.to_string()))?;
        let content = parsed.into_content()?;

        debug!(content_len = content.len(), "Enrichment succeeded");
        Ok(content)
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date
///
/// A date already in the past means "retry now".
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
