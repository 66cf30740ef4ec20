//! Assistant LLM client used for intent classification, image tool-intent
//! parsing, and conversational replies.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const ASSISTANT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Error)]
pub enum AssistantApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,
}

impl AssistantApiError {
    /// Transient failures worth retrying.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AssistantRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AssistantResponse {
    content: Vec<ContentBlock>,
}

impl AssistantResponse {
    fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
        })
    }
}

/// The seam the orchestration services talk through, so tests can stand in
/// a scripted assistant.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Send a single prompt (plus optional prior turns) and return the
    /// text reply.
    async fn ask(
        &self,
        prompt: &str,
        history: Vec<Message>,
        system: Option<String>,
    ) -> Result<String, AssistantApiError>;

    /// Like [`ask`](Self::ask), but the reply is expected to carry a JSON
    /// document (possibly wrapped in markdown fences).
    async fn ask_json_value(
        &self,
        prompt: &str,
        system: Option<String>,
        max_tokens: u32,
    ) -> Result<serde_json::Value, AssistantApiError>;
}

#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: Client,
    api_key: String,
    model: String,
}

impl AssistantClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn from_env() -> Result<Self, AssistantApiError> {
        let api_key =
            std::env::var("ANTHROPIC_API_KEY").map_err(|_| AssistantApiError::MissingApiKey)?;
        let model = std::env::var("FABRICA_ASSISTANT_MODEL").ok();
        Self::new(api_key, model)
    }

    pub fn new(api_key: String, model: Option<String>) -> Result<Self, AssistantApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("fabrica/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AssistantApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        max_tokens: u32,
    ) -> Result<String, AssistantApiError> {
        let request = AssistantRequest {
            model: self.model.clone(),
            max_tokens,
            messages,
            system,
        };

        let response = (|| async { self.send_request(&request).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &AssistantApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "assistant call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        response
            .text()
            .map(|s| s.to_string())
            .ok_or_else(|| AssistantApiError::Serde("no text content in response".to_string()))
    }

    async fn send_request(
        &self,
        request: &AssistantRequest,
    ) -> Result<AssistantResponse, AssistantApiError> {
        let res = self
            .http
            .post(ASSISTANT_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantApiError::Timeout
                } else {
                    AssistantApiError::Transport(e.to_string())
                }
            })?;

        match res.status() {
            s if s.is_success() => res
                .json::<AssistantResponse>()
                .await
                .map_err(|e| AssistantApiError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(AssistantApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(AssistantApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(AssistantApiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl AssistantApi for AssistantClient {
    async fn ask(
        &self,
        prompt: &str,
        history: Vec<Message>,
        system: Option<String>,
    ) -> Result<String, AssistantApiError> {
        let mut messages = history;
        messages.push(Message::user(prompt));
        self.complete(messages, system, 2048).await
    }

    async fn ask_json_value(
        &self,
        prompt: &str,
        system: Option<String>,
        max_tokens: u32,
    ) -> Result<serde_json::Value, AssistantApiError> {
        let reply = self
            .complete(vec![Message::user(prompt)], system, max_tokens)
            .await?;

        if reply.trim().is_empty() {
            return Err(AssistantApiError::Serde("empty assistant reply".to_string()));
        }

        let json_str = extract_json(&reply);
        serde_json::from_str(json_str).map_err(|e| {
            warn!(
                json_error = %e,
                preview = %json_str.chars().take(200).collect::<String>(),
                "assistant reply was not valid JSON"
            );
            AssistantApiError::Serde(e.to_string())
        })
    }
}

/// Pull a JSON document out of a reply that may wrap it in markdown fences.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let body = start + 7;
        if let Some(end) = text[body..].find("```") {
            return text[body..body + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let body = start + 3;
        // skip a language tag on the fence line
        let body = text[body..]
            .find('\n')
            .map(|i| body + i + 1)
            .unwrap_or(body);
        if let Some(end) = text[body..].find("```") {
            return text[body..body + end].trim();
        }
    }

    text
}
