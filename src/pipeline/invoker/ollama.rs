use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{GenerateRequest, LlmClient, LlmError};

/// Ollama HTTP client (`/api/generate`, non-streaming).
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, &self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::status(status, body));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
