//! [`ModelBackend`] – the seam between the core and the model service.
//!
//! [`OllamaClient`] talks to an [Ollama](https://ollama.com) server
//! (`http://localhost:11434`):
//!
//! | Call | Endpoint |
//! |---|---|
//! | [`ModelBackend::list_models`] | `GET /api/tags` |
//! | [`ModelBackend::generate`] | `POST /api/generate` |
//! | [`ModelBackend::pull`] | `POST /api/pull` |
//!
//! Every call carries an explicit timeout and none is retried here; retrying
//! is the [`ServiceBootstrapper`][crate::bootstrap::ServiceBootstrapper]'s
//! job.

use std::time::Duration;

use async_trait::async_trait;
use belt_types::{InterpretError, ModelEndpoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Timeout for `GET /api/tags`.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for `POST /api/generate`.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `POST /api/pull`.  Pulls download whole models.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-level failures talking to a model service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The call did not complete before its deadline.
    #[error("request timed out")]
    Timeout,
    /// The service could not be reached at all.
    #[error("could not connect: {0}")]
    Unreachable(String),
    /// The service answered with a non-success status.
    #[error("{status} - {body}")]
    Rejected { status: u16, body: String },
    /// The service answered, but not in the expected shape.
    #[error("unexpected response format: {0}")]
    Malformed(String),
    /// Any other HTTP client failure.
    #[error("HTTP error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        // Connect timeouts report both; the timeout wins.
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() {
            BackendError::Unreachable(e.to_string())
        } else if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<BackendError> for InterpretError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Timeout => InterpretError::TransportTimeout,
            BackendError::Unreachable(_) => InterpretError::TransportUnreachable,
            BackendError::Rejected { status, body } => {
                InterpretError::BackendRejected { status, body }
            }
            other => InterpretError::Unexpected(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A model entry as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

/// Operations the core needs from a model service.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// The endpoint this backend talks to.
    fn endpoint(&self) -> &ModelEndpoint;

    /// List the models currently installed on the service.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;

    /// Run a single non-streaming completion of `prompt` against the
    /// endpoint's model and return the raw response text.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// Ask the service to install `model`.
    async fn pull(&self, model: &str) -> Result<(), BackendError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama wire shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

// ─────────────────────────────────────────────────────────────────────────────
// OllamaClient
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling settings sent with every generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    /// Near-deterministic sampling with a short answer cap.
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 50,
        }
    }
}

/// [`ModelBackend`] over Ollama's HTTP API.
///
/// Construct once and share behind an `Arc`.
pub struct OllamaClient {
    endpoint: ModelEndpoint,
    client: reqwest::Client,
    options: GenerationOptions,
    generate_timeout: Duration,
}

impl OllamaClient {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            options: GenerationOptions::default(),
            generate_timeout: GENERATE_TIMEOUT,
        }
    }

    /// Override the generation deadline (builder-style).
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Override the sampling settings (builder-style).
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    // Turn a non-success status into `Rejected`, carrying the body text.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    fn endpoint(&self) -> &ModelEndpoint {
        &self.endpoint
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = self.endpoint.url("/api/tags");
        let response = self.client.get(&url).timeout(LIST_TIMEOUT).send().await?;
        let tags: TagsResponse = Self::check_status(response).await?.json().await?;
        debug!(count = tags.models.len(), "listed models");
        Ok(tags.models)
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.endpoint.url("/api/generate");
        let model = self.endpoint.tagged_model();
        let body = GenerateRequest {
            model: &model,
            prompt,
            stream: false,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.generate_timeout)
            .send()
            .await?;
        let reply: GenerateResponse = Self::check_status(response).await?.json().await?;
        Ok(reply.response)
    }

    async fn pull(&self, model: &str) -> Result<(), BackendError> {
        let url = self.endpoint.url("/api/pull");
        let response = self
            .client
            .post(&url)
            .json(&PullRequest { name: model })
            .timeout(PULL_TIMEOUT)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
