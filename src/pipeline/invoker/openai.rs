use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{GenerateRequest, LlmClient, LlmError};

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, &self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseParsing("No message content in response".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4".into(),
            prompt: "analyze".into(),
            system: Some("respond with JSON".into()),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn sends_bearer_key_and_chat_messages() {
        let captured: Arc<Mutex<Option<(String, Value)>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *sink.lock().unwrap() = Some((auth, body));
                    Json(json!({
                        "id": "chatcmpl-1",
                        "choices": [{"index": 0, "message": {"role": "assistant", "content": "{}"}}]
                    }))
                }
            }),
        );
        let base = serve(app).await;

        let client = OpenAiClient::new(&base, "sk-test").unwrap();
        assert_eq!(client.generate(&request()).await.unwrap(), "{}");

        let (auth, body) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "analyze");
    }

    #[tokio::test]
    async fn rate_limit_is_transient_and_auth_failure_is_not() {
        let app = Router::new()
            .route(
                "/limited/v1/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
            )
            .route(
                "/denied/v1/chat/completions",
                post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
            );
        let base = serve(app).await;

        let limited = OpenAiClient::new(&format!("{base}/limited"), "k")
            .unwrap()
            .generate(&request())
            .await
            .unwrap_err();
        assert!(limited.is_transient());

        let denied = OpenAiClient::new(&format!("{base}/denied"), "k")
            .unwrap()
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(denied, LlmError::Status { status: 401, .. }));
        assert!(!denied.is_transient());
    }

    #[tokio::test]
    async fn empty_choices_is_parsing_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = serve(app).await;

        let err = OpenAiClient::new(&base, "k")
            .unwrap()
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseParsing(_)));
    }
}
