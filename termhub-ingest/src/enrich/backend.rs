//! Completion service backends
//!
//! The pipeline talks to a trait object so tests run without a network
//! and a missing API key degrades the service instead of disabling it.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// One field-level completion request
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    /// The term this cell belongs to
    pub term: String,
    /// Column header, e.g. "Did You Know? – Fun Facts"
    pub section: String,
    /// Raw cell text to interpret
    pub text: String,
    /// Caller context identifier, e.g. "glossary-v1"
    pub context: String,
}

/// Backend failure with a retryability hint
#[derive(Debug, Clone)]
pub struct BackendError {
    pub retryable: bool,
    pub message: String,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// A completion service
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    async fn complete(&self, request: &EnrichmentRequest) -> Result<String, BackendError>;
}

/// OpenAI-compatible chat-completions backend
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    fallback_model: Option<String>,
}

impl OpenAiBackend {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        fallback_model: Option<String>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            fallback_model,
        }
    }

    fn build_prompt(request: &EnrichmentRequest) -> String {
        format!(
            "You are filling in a glossary of AI and machine learning terms.\n\
             Term: {}\n\
             Column: {}\n\
             Interpret the source text below for this column. Respond with\n\
             concise, factual content only; no preamble.\n\n\
             Source text:\n{}",
            request.term, request.section, request.text
        )
    }

    async fn call_model(
        &self,
        model: &str,
        request: &EnrichmentRequest,
    ) -> Result<String, BackendError> {
        let body = json!({
            "model": model,
            "messages": [
                {
                    "role": "system",
                    "content": "You write precise glossary content. Output only the requested text."
                },
                {
                    "role": "user",
                    "content": Self::build_prompt(request)
                }
            ],
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError {
                // Connection and timeout failures are worth retrying
                retryable: true,
                message: format!("request failed: {}", err),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError {
                retryable,
                message: format!("service returned {}: {}", status, truncate(&detail, 300)),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|err| BackendError {
            retryable: true,
            message: format!("unreadable response body: {}", err),
        })?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| BackendError {
                retryable: false,
                message: "response carried no completion text".to_string(),
            })
    }
}

#[async_trait]
impl EnrichmentBackend for OpenAiBackend {
    async fn complete(&self, request: &EnrichmentRequest) -> Result<String, BackendError> {
        match self.call_model(&self.model, request).await {
            Ok(content) => Ok(content),
            Err(err) if !err.retryable => {
                // Model-level rejections get one shot at the fallback model
                if let Some(fallback) = &self.fallback_model {
                    tracing::warn!(
                        model = %self.model,
                        fallback = %fallback,
                        error = %err,
                        "Primary model rejected request, trying fallback"
                    );
                    self.call_model(fallback, request).await
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Backend used when no API key is configured; every call degrades
pub struct DisabledBackend;

#[async_trait]
impl EnrichmentBackend for DisabledBackend {
    async fn complete(&self, _request: &EnrichmentRequest) -> Result<String, BackendError> {
        Err(BackendError {
            retryable: false,
            message: "enrichment disabled: no API key configured".to_string(),
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Scripted backend for tests: pops queued responses, then echoes
#[derive(Default)]
pub struct ScriptedBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, BackendError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    pub fn push_err(&self, retryable: bool, message: &str) {
        self.responses.lock().unwrap().push_back(Err(BackendError {
            retryable,
            message: message.to_string(),
        }));
    }

    /// Number of completed service calls
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentBackend for ScriptedBackend {
    async fn complete(&self, request: &EnrichmentRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(format!("enriched: {}", request.text)),
        }
    }
}
