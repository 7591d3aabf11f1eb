//! Model invoker: one logical model call with per-attempt deadline and
//! sequential retries on transient failure.

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod types;

pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use types::{GenerateRequest, LlmClient, LlmError};

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::PipelineError;
use crate::config::{ConfigError, ModelSettings, Provider};

/// System prompt sent with every request.
pub const JSON_SYSTEM_PROMPT: &str =
    "You are a clinical assistant. Respond with a single valid JSON object and nothing else.";

/// Retry and deadline policy for model calls.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerConfig {
    pub model: String,
    pub max_tokens: u32,
    /// 0.0-1.0
    pub temperature: f32,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first, on transient failure only.
    pub retries: u32,
    /// Attempt `n` waits `n * retry_backoff` before the next one.
    pub retry_backoff: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".into(),
            max_tokens: 1500,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Opaque model text plus call metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    pub text: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct ModelInvoker {
    client: Arc<dyn LlmClient>,
    config: InvokerConfig,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn LlmClient>, config: InvokerConfig) -> Self {
        Self {
            client,
            config,
        }
    }

    /// Client and policy from validated settings.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(build_client(settings)?, settings.invoker_config()))
    }

    /// Send `prompt` to the model.
    ///
    /// Transient failures are retried up to `retries` times with linear
    /// backoff, then reported as `ModelUnavailable`. Other failures are
    /// reported immediately. An attempt exceeding `timeout` ends the call
    /// with `ModelTimeout`; it is not retried.
    pub async fn invoke(&self, prompt: &str) -> Result<RawModelOutput, PipelineError> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            system: Some(JSON_SYSTEM_PROMPT.to_string()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let max_attempts = self.config.retries.saturating_add(1);
        let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                client = self.client.name(),
                model = %self.config.model,
                attempt,
                max_attempts,
                prompt_bytes = request.prompt.len(),
                "Invoking model"
            );

            let outcome =
                tokio::time::timeout(self.config.timeout, self.client.generate(&request)).await;

            let error = match outcome {
                Ok(Ok(text)) => {
                    tracing::info!(
                        client = self.client.name(),
                        attempt,
                        response_bytes = text.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Model call succeeded"
                    );
                    return Ok(RawModelOutput {
                        text,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(Err(LlmError::Timeout)) | Err(_) => {
                    tracing::warn!(
                        client = self.client.name(),
                        attempt,
                        timeout_ms,
                        "Model call timed out"
                    );
                    return Err(PipelineError::ModelTimeout { timeout_ms });
                }
                Ok(Err(e)) => e,
            };

            if !error.is_transient() || attempt >= max_attempts {
                tracing::warn!(
                    client = self.client.name(),
                    attempt,
                    error_kind = error.kind(),
                    transient = error.is_transient(),
                    "Model unavailable"
                );
                return Err(PipelineError::ModelUnavailable {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }

            let backoff = self.config.retry_backoff.saturating_mul(attempt);
            tracing::warn!(
                client = self.client.name(),
                attempt,
                error_kind = error.kind(),
                backoff_ms = backoff.as_millis() as u64,
                "Transient model failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Select a client implementation for the configured provider.
pub fn build_client(settings: &ModelSettings) -> Result<Arc<dyn LlmClient>, ConfigError> {
    let client: Arc<dyn LlmClient> = match settings.provider {
        Provider::Ollama => Arc::new(
            OllamaClient::new(&settings.base_url)
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
        ),
        Provider::OpenAi => {
            let key = settings
                .api_key
                .as_deref()
                .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
            Arc::new(
                OpenAiClient::new(&settings.base_url, key)
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
            )
        }
    };
    Ok(client)
}
