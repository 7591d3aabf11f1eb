//! Structured-extraction pipeline.
//!
//! One stage runs: prompt → invoker → normalize → validate. The clinical flow
//! chains three stages (intake → refinement → treatment) through a session id.
//! Patient story and conversation analysis are standalone stages that attach
//! to an existing session.

pub mod flow;
pub mod invoker;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod schema;
pub mod templates;
pub mod validate;

pub use flow::{ClinicalFlow, ClinicalFlowInput, ClinicalFlowResult};
pub use invoker::{InvokerConfig, ModelInvoker, RawModelOutput};
pub use normalize::{normalize, NormalizedJson, RepairPass};
pub use orchestrator::{FallbackRecord, StageOutcome, StageRunner, StageState};
pub use prompt::PromptTemplate;
pub use schema::{StageOutput, StageResult};
pub use validate::validate;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ModelError, StageName};
use crate::session::StoreError;

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Concrete field path, e.g. `differentiation_probabilities[1].probability`.
    pub field: String,
    pub rule: String,
    /// Offending value rendered as JSON (`<missing>` when absent).
    pub value: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} (got {})", self.field, self.rule, self.value)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ModelError),

    #[error("Template '{template}' is missing placeholder value(s): {}", .missing.join(", "))]
    TemplateBinding {
        template: String,
        missing: Vec<String>,
    },

    #[error("Model unavailable after {attempts} attempt(s): {reason}")]
    ModelUnavailable { attempts: u32, reason: String },

    #[error("Model call timed out after {timeout_ms}ms")]
    ModelTimeout { timeout_ms: u64 },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String, cleaned: String },

    #[error("Schema violation: {}", join_violations(.violations))]
    SchemaViolation { violations: Vec<Violation> },

    #[error("Session storage error: {0}")]
    Session(#[from] StoreError),
}

/// Failure class reported to callers alongside the stage name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    TemplateBinding,
    ModelUnavailable,
    ModelTimeout,
    MalformedResponse,
    SchemaViolation,
    Storage,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::TemplateBinding => "template_binding",
            Self::ModelUnavailable => "model_unavailable",
            Self::ModelTimeout => "model_timeout",
            Self::MalformedResponse => "malformed_response",
            Self::SchemaViolation => "schema_violation",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
            Self::TemplateBinding { .. } => ErrorCategory::TemplateBinding,
            Self::ModelUnavailable { .. } => ErrorCategory::ModelUnavailable,
            Self::ModelTimeout { .. } => ErrorCategory::ModelTimeout,
            Self::MalformedResponse { .. } => ErrorCategory::MalformedResponse,
            Self::SchemaViolation { .. } => ErrorCategory::SchemaViolation,
            Self::Session(_) => ErrorCategory::Storage,
        }
    }

    /// Malformed caller input (4xx-equivalent) rather than an upstream failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::TemplateBinding { .. })
    }
}

/// What a caller of a stage receives: which stage failed, and why.
#[derive(Error, Debug)]
#[error("{stage} stage failed ({}): {source}", .source.category())]
pub struct StageError {
    pub stage: StageName,
    #[source]
    pub source: PipelineError,
}

impl StageError {
    pub fn new(stage: StageName, source: PipelineError) -> Self {
        Self { stage, source }
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }
}
