//! Single-stage orchestration: render → invoke → normalize → validate.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::invoker::ModelInvoker;
use super::normalize::{normalize, RepairPass};
use super::prompt::PromptTemplate;
use super::schema::StageOutput;
use super::templates::template_for;
use super::validate::validate;
use super::{ErrorCategory, PipelineError, StageError};
use crate::models::StageInput;

/// Per-invocation state. `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "category", rename_all = "snake_case")]
pub enum StageState {
    Rendering,
    Invoking,
    Normalizing,
    Validating,
    Done,
    Failed(ErrorCategory),
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    pub fn can_advance_to(&self, next: StageState) -> bool {
        match (self, next) {
            (s, Self::Failed(_)) => !s.is_terminal(),
            (Self::Rendering, Self::Invoking)
            | (Self::Invoking, Self::Normalizing)
            | (Self::Normalizing, Self::Validating)
            | (Self::Validating, Self::Done) => true,
            _ => false,
        }
    }
}

/// Ordered state history of one invocation, starting at `Rendering`.
#[derive(Debug)]
struct StateTrace(Vec<StageState>);

impl StateTrace {
    fn start() -> Self {
        Self(vec![StageState::Rendering])
    }

    fn advance(&mut self, next: StageState) {
        let current = self.0.last().copied().unwrap_or(StageState::Rendering);
        debug_assert!(
            current.can_advance_to(next),
            "illegal transition {current:?} -> {next:?}"
        );
        self.0.push(next);
    }
}

/// Failure that was absorbed by substituting the stage's fallback result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub category: ErrorCategory,
    pub reason: String,
}

/// A stage result with its audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome<T> {
    pub result: T,
    /// Set when `result` is the fixed fallback.
    pub fallback: Option<FallbackRecord>,
    pub transitions: Vec<StageState>,
    pub repairs: Vec<RepairPass>,
    pub attempts: u32,
}

impl<T> StageOutcome<T> {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Failures a stage with a fallback may absorb. Binding and schema errors
/// are always surfaced.
fn qualifies_for_fallback(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::ModelUnavailable { .. }
            | PipelineError::ModelTimeout { .. }
            | PipelineError::MalformedResponse { .. }
    )
}

struct Completed<T> {
    result: T,
    repairs: Vec<RepairPass>,
    attempts: u32,
}

/// Runs one stage against a model.
pub struct StageRunner {
    invoker: ModelInvoker,
}

impl StageRunner {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self { invoker }
    }

    /// Run stage `T` with its built-in template.
    pub async fn run<T: StageOutput>(&self, input: &StageInput) -> Result<StageOutcome<T>, StageError> {
        self.analyze::<T>(template_for(T::STAGE), input).await
    }

    /// Run stage `T` with an explicit template.
    pub async fn analyze<T: StageOutput>(
        &self,
        template: &PromptTemplate,
        input: &StageInput,
    ) -> Result<StageOutcome<T>, StageError> {
        let span = tracing::info_span!(
            "stage",
            stage = %T::STAGE,
            template = template.name(),
            version = template.version()
        );

        async move {
            let mut trace = StateTrace::start();
            match self.steps::<T>(template, input, &mut trace).await {
                Ok(done) => {
                    trace.advance(StageState::Done);
                    tracing::info!(
                        attempts = done.attempts,
                        repairs = done.repairs.len(),
                        "Stage completed"
                    );
                    Ok(StageOutcome {
                        result: done.result,
                        fallback: None,
                        transitions: trace.0,
                        repairs: done.repairs,
                        attempts: done.attempts,
                    })
                }
                Err(error) => {
                    let category = error.category();
                    trace.advance(StageState::Failed(category));

                    if qualifies_for_fallback(&error) {
                        if let Some(result) = T::fallback_result() {
                            tracing::warn!(category = %category, "Stage failed, using fallback result");
                            return Ok(StageOutcome {
                                result,
                                fallback: Some(FallbackRecord {
                                    category,
                                    reason: error.to_string(),
                                }),
                                transitions: trace.0,
                                repairs: Vec::new(),
                                attempts: 0,
                            });
                        }
                    }

                    tracing::error!(category = %category, "Stage failed");
                    Err(StageError::new(T::STAGE, error))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn steps<T: StageOutput>(
        &self,
        template: &PromptTemplate,
        input: &StageInput,
        trace: &mut StateTrace,
    ) -> Result<Completed<T>, PipelineError> {
        let prompt = template.render(input)?;

        trace.advance(StageState::Invoking);
        let raw = self.invoker.invoke(&prompt).await?;

        trace.advance(StageState::Normalizing);
        let json = normalize(&raw.text)?;

        trace.advance(StageState::Validating);
        let result = validate::<T>(&json)?;

        Ok(Completed {
            result,
            repairs: json.repairs().to_vec(),
            attempts: raw.attempts,
        })
    }
}
