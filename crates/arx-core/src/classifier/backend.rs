//! Model backends for the semantic classifier

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Instruction sent as the system message
const SYSTEM_PROMPT: &str =
    "You are a security expert reviewing Arch Linux PKGBUILD files for malicious intent.";

/// Longest error body kept in a [`BackendError::Status`]
const MAX_ERROR_BODY: usize = 200;

/// Failure talking to a model backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("no API key configured")]
    MissingCredential,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether a second attempt might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout | BackendError::Unreachable(_) => true,
            BackendError::Status(code, _) => *code == 429 || (500..600).contains(code),
            BackendError::Auth(_) | BackendError::MissingCredential | BackendError::Malformed(_) => {
                false
            }
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => BackendError::Auth(status),
            _ => {
                let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
                BackendError::Status(status, body)
            }
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Unreachable(e.to_string())
        }
    }
}

/// Trait for anything that can complete a classification prompt
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send the prompt and return the raw text reply
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend speaking the OpenAI-compatible chat completions API
pub struct OpenAiBackend {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiBackend {
    pub fn new(config: &ClassifierConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("arx/{}", crate::VERSION))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let api_key = self.api_key.as_deref().ok_or(BackendError::MissingCredential)?;

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let url = self.completions_url();
        debug!("Requesting classification from {} ({})", url, self.model);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), &body));
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("response carried no message content".into()))
    }
}
