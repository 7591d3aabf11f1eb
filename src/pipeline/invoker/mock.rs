use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{GenerateRequest, LlmClient, LlmError};

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Scripted client for tests and offline runs.
///
/// Replies are served in order; once the script is drained, the responder
/// (if any) answers from the prompt, else the default reply repeats. Every
/// prompt is recorded.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    default_reply: Option<Result<String, LlmError>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl MockLlmClient {
    /// Always answers with `response`.
    pub fn new(response: &str) -> Self {
        Self::with_default(Ok(response.to_string()))
    }

    /// Always fails with `error`.
    pub fn failing(error: LlmError) -> Self {
        Self::with_default(Err(error))
    }

    /// Serves `replies` in order, then fails.
    pub fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            responder: None,
            default_reply: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    fn with_default(reply: Result<String, LlmError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            default_reply: Some(reply),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Answers each prompt with `respond(prompt)`.
    pub fn responding<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(respond)),
            ..Self::scripted(Vec::<Result<String, LlmError>>::new())
        }
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_reply(&self, prompt: &str) -> Result<String, LlmError> {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        scripted
            .or_else(|| self.responder.as_ref().map(|respond| respond(prompt)))
            .or_else(|| self.default_reply.clone())
            .unwrap_or_else(|| Err(LlmError::Http("mock script exhausted".into())))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(&request.prompt)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system: None,
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_reply_repeats() {
        let client = MockLlmClient::new("{}");
        assert_eq!(client.generate(&request("a")).await.unwrap(), "{}");
        assert_eq!(client.generate(&request("b")).await.unwrap(), "{}");
        assert_eq!(client.calls(), 2);
        assert_eq!(client.prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn script_runs_in_order_then_exhausts() {
        let client = MockLlmClient::scripted([
            Err(LlmError::Connection("x".into())),
            Ok("second".into()),
        ]);
        assert!(client.generate(&request("1")).await.is_err());
        assert_eq!(client.generate(&request("2")).await.unwrap(), "second");
        assert!(client.generate(&request("3")).await.is_err());
    }

    #[tokio::test]
    async fn responder_answers_from_prompt() {
        let client = MockLlmClient::responding(|prompt| {
            if prompt.contains("knee") {
                Ok("knee".into())
            } else {
                Err(LlmError::Timeout)
            }
        });
        assert_eq!(client.generate(&request("my knee")).await.unwrap(), "knee");
        assert_eq!(
            client.generate(&request("my back")).await.unwrap_err(),
            LlmError::Timeout
        );
    }
}
