//! LLM access for the travel personas.
//!
//! - [`LlmBackend`]: async trait over text generation providers
//! - [`OllamaClient`]: local Ollama server (`POST /api/generate`, `GET /api/tags`)
//! - [`FallbackResponder`]: bounded wait on a backend with canned persona text
//!   substituted when the model is unavailable, slow, silent or failing

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::agents::AgentId;
use crate::config::OllamaConfig;
use crate::templates;

// ============================================================================
// LlmBackend trait
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Prior conversation lines, oldest first.
    pub context: Vec<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Prompt text with any context lines folded in.
    pub fn full_prompt(&self) -> String {
        if self.context.is_empty() {
            self.prompt.clone()
        } else {
            format!(
                "Context:\n{}\n\nQuery: {}",
                self.context.join("\n"),
                self.prompt
            )
        }
    }
}

/// Abstraction over text generation providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    /// Cheap readiness probe. Backends without one report available.
    async fn is_available(&self) -> bool {
        true
    }

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("All {attempts} attempts failed")]
    RetryExhausted { attempts: usize },
}

impl LlmError {
    /// Worth another attempt: network failures and 408/500/502/503/504.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LlmError::Api { code, .. } => matches!(code, 408 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

// ============================================================================
// Ollama API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    top_k: u32,
    top_p: f32,
    repeat_penalty: f32,
    num_ctx: u32,
    stop: [&'static str; 3],
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: Option<String>,
}

/// Result of the cached `/api/tags` probe.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaStatus {
    pub available: bool,
    pub base_url: String,
    pub model: String,
    pub models: Vec<String>,
    pub status: &'static str,
    pub error: Option<String>,
}

// ============================================================================
// OllamaClient
// ============================================================================

pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    base_url: String,
    model: Mutex<String>,
    status_cache: Mutex<Option<(Instant, OllamaStatus)>>,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.clone();
        Self::with_base_url(config, base_url)
    }

    /// Create a client against a custom base URL (for testing / integration)
    pub fn with_base_url(config: OllamaConfig, base_url: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model: Mutex::new(config.model.clone()),
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            status_cache: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model currently used for generation.
    pub fn model(&self) -> String {
        self.model
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_model(&self, model: String) {
        match self.model.lock() {
            Ok(mut m) => *m = model,
            Err(e) => *e.into_inner() = model,
        }
    }

    /// Generate with retries on transient failures.
    pub async fn generate_text(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let attempts = self.config.max_retries + 1;
        let result = RetryIf::spawn(
            retry_strategy,
            || self.generate_once(request),
            |e: &LlmError| e.is_transient(),
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) if e.is_transient() => {
                tracing::error!(
                    attempts = attempts,
                    error = %e,
                    "All Ollama generate attempts failed"
                );
                Err(LlmError::RetryExhausted { attempts })
            }
            Err(e) => Err(e),
        }
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let model = self.model();

        let body = OllamaGenerateRequest {
            model: &model,
            prompt: request.full_prompt(),
            system: request.system.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_predict: request.max_tokens.unwrap_or(self.config.max_tokens),
                top_k: 40,
                top_p: 0.9,
                repeat_penalty: 1.1,
                num_ctx: 4096,
                stop: ["Human:", "Assistant:", "User:"],
            },
        };

        tracing::debug!(model = %model, "Sending Ollama generate request");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let parsed: OllamaGenerateResponse = response.json().await?;
        if parsed.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(parsed.response)
    }

    /// Installed models, from `GET /api/tags`.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let tags: OllamaTagsResponse = response.json().await?;
        Ok(tags.models)
    }

    /// Server status, cached for `health_cache_secs`. Adopts the first
    /// installed model when the configured one is missing.
    pub async fn status(&self) -> OllamaStatus {
        if let Some(cached) = self.cached_status() {
            return cached;
        }

        let status = match self.list_models().await {
            Ok(models) => {
                let names: Vec<String> = models.into_iter().map(|m| m.name).collect();
                let current = self.model();
                if let Some(first) = names.first() {
                    if !names.contains(&current) {
                        tracing::warn!(
                            configured = %current,
                            using = %first,
                            "Configured Ollama model not installed, switching"
                        );
                        self.set_model(first.clone());
                    }
                }
                OllamaStatus {
                    available: true,
                    base_url: self.base_url.clone(),
                    model: self.model(),
                    models: names,
                    status: "connected",
                    error: None,
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ollama status probe failed");
                OllamaStatus {
                    available: false,
                    base_url: self.base_url.clone(),
                    model: self.model(),
                    models: Vec::new(),
                    status: "disconnected",
                    error: Some(e.to_string()),
                }
            }
        };

        if let Ok(mut cache) = self.status_cache.lock() {
            *cache = Some((Instant::now(), status.clone()));
        }
        status
    }

    fn cached_status(&self) -> Option<OllamaStatus> {
        let ttl = Duration::from_secs(self.config.health_cache_secs);
        let cache = self.status_cache.lock().ok()?;
        match cache.as_ref() {
            Some((at, status)) if at.elapsed() < ttl => Some(status.clone()),
            _ => None,
        }
    }
}

fn api_error(status: StatusCode, body: String) -> LlmError {
    let message = serde_json::from_str::<OllamaErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or(body);
    tracing::warn!(code = status.as_u16(), message = %message, "Ollama API error");
    LlmError::Api {
        code: status.as_u16(),
        message,
    }
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        self.generate_text(request).await
    }

    async fn is_available(&self) -> bool {
        self.status().await.available
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// FallbackResponder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Unavailable,
    Timeout,
    Empty,
    TooShort,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Llm,
    Fallback { reason: FallbackReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub text: String,
    pub source: ResponseSource,
    pub elapsed_ms: u64,
}

impl Generation {
    pub fn used_llm(&self) -> bool {
        self.source == ResponseSource::Llm
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    pub max_wait: Duration,
    /// Model output must be strictly longer than this (trimmed, in chars).
    pub min_chars: usize,
    pub check_availability: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(8),
            min_chars: 30,
            check_availability: true,
        }
    }
}

/// Wraps a backend. Never fails: every miss becomes the persona's canned text.
#[derive(Clone)]
pub struct FallbackResponder {
    inner: Arc<dyn LlmBackend>,
    policy: FallbackPolicy,
}

impl FallbackResponder {
    pub fn new(inner: Arc<dyn LlmBackend>, policy: FallbackPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.inner
    }

    /// Ask the backend on behalf of `agent`, waiting at most `max_wait`
    /// (capped by the policy).
    pub async fn respond(
        &self,
        agent: AgentId,
        query: &str,
        request: &GenerateRequest,
        max_wait: Duration,
    ) -> Generation {
        let start = Instant::now();
        let wait = max_wait.min(self.policy.max_wait);

        let attempt = async {
            if self.policy.check_availability && !self.inner.is_available().await {
                return Err(FallbackReason::Unavailable);
            }
            self.inner.generate(request).await.map_err(|e| {
                tracing::warn!(agent = %agent, backend = self.inner.name(), error = %e, "LLM generation failed");
                match e {
                    LlmError::EmptyResponse => FallbackReason::Empty,
                    _ => FallbackReason::Error,
                }
            })
        };

        let outcome = match tokio::time::timeout(wait, attempt).await {
            Ok(Ok(text)) => classify(&text, self.policy.min_chars).map(|_| text),
            Ok(Err(reason)) => Err(reason),
            Err(_) => {
                tracing::warn!(
                    agent = %agent,
                    wait_ms = wait.as_millis() as u64,
                    "LLM did not answer in time, using fallback"
                );
                Err(FallbackReason::Timeout)
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => Generation {
                text,
                source: ResponseSource::Llm,
                elapsed_ms,
            },
            Err(reason) => {
                tracing::info!(agent = %agent, reason = ?reason, elapsed_ms, "Using canned response");
                Generation {
                    text: templates::fallback_response(agent, query),
                    source: ResponseSource::Fallback { reason },
                    elapsed_ms,
                }
            }
        }
    }
}

fn classify(text: &str, min_chars: usize) -> Result<(), FallbackReason> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(FallbackReason::Empty)
    } else if trimmed.chars().count() <= min_chars {
        Err(FallbackReason::TooShort)
    } else {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
