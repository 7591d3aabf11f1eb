use async_trait::async_trait;
use thiserror::Error;

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// One generation request, re-sent unchanged on retry.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Transport-level failure of a single model call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Cannot connect to model endpoint at {0}")]
    Connection(String),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Model request timed out")]
    Timeout,

    #[error("Failed to parse provider response: {0}")]
    ResponseParsing(String),
}

impl LlmError {
    /// Worth retrying: connection failures, transport errors, 5xx and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Timeout | Self::ResponseParsing(_) => false,
        }
    }

    /// Short label safe to put in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Status { .. } => "status",
            Self::Http(_) => "http",
            Self::Timeout => "timeout",
            Self::ResponseParsing(_) => "response_parsing",
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, base_url: &str) -> Self {
        if e.is_connect() {
            Self::Connection(base_url.to_string())
        } else if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::ResponseParsing(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }

    pub(crate) fn status(status: reqwest::StatusCode, body: String) -> Self {
        Self::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }
}

/// Text-in/text-out model backend. One call is one attempt; retries and
/// deadlines are the invoker's job.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    /// Backend label for logs.
    fn name(&self) -> &'static str;
}
