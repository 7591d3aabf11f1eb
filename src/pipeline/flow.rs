//! Three-stage clinical flow threaded by a session id:
//! intake analysis → final analysis → treatment plan.
//!
//! Each stage reads its predecessor from the session store by id; nothing is
//! held between calls. Patient story and conversation analysis attach to an
//! existing session without reading from it.
//!
//! Store calls run on the blocking pool so file-backed stores never stall the
//! runtime.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::orchestrator::{StageOutcome, StageRunner};
use super::schema::{
    ConversationAnalysis, FinalAnalysis, IntakeAnalysis, PatientStory, StageOutput, TreatmentPlan,
};
use super::{PipelineError, StageError};
use crate::models::{ConversationTranscript, IntakeForm, RefinementForm, StageInput, StageName};
use crate::session::{SessionContext, SessionStore, StageRecord, StoreError};

/// Everything the intake layer collects for one patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalFlowInput {
    pub intake: IntakeForm,
    pub refinement: RefinementForm,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicalFlowResult {
    pub session: SessionContext,
    pub intake: StageOutcome<IntakeAnalysis>,
    pub final_analysis: StageOutcome<FinalAnalysis>,
    pub treatment: StageOutcome<TreatmentPlan>,
}

/// Fields the refinement stage receives from the intake result.
pub fn intake_carry_forward(intake: &IntakeAnalysis) -> Result<StageInput, serde_json::Error> {
    let differentiation: Vec<String> = intake
        .differentiation_probabilities
        .iter()
        .map(|d| format!("{}: {}", d.diagnosis, d.probability))
        .collect();

    Ok(StageInput::new()
        .with("intake_analysis", serde_json::to_string(intake)?)
        .with(
            "intake_serious_vs_treatable",
            intake.serious_vs_treatable.diagnosis.as_str(),
        )
        .with("intake_main_diagnosis", intake.main_diagnosis.diagnosis.as_str())
        .with("intake_main_icd10_code", intake.main_diagnosis.icd10_code.as_str())
        .with("intake_differentiation", differentiation))
}

/// Fields the treatment stage receives from the final analysis.
pub fn treatment_carry_forward(
    session_id: &Uuid,
    analysis: &FinalAnalysis,
) -> Result<StageInput, serde_json::Error> {
    Ok(StageInput::new()
        .with("session_id", session_id.to_string())
        .with("final_analysis", serde_json::to_string(analysis)?)
        .with("main_diagnosis", analysis.main_diagnosis.diagnosis.as_str())
        .with("main_icd10_code", analysis.main_diagnosis.icd10_code.as_str())
        .with("muscle_group", analysis.big_muscle_group.name.as_str())
        .with(
            "muscle_group_description",
            analysis.big_muscle_group.description.as_str(),
        )
        .with(
            "serious_vs_treatable",
            analysis.serious_vs_treatable.diagnosis.as_str(),
        ))
}

fn storage_error(stage: StageName, e: impl Into<StoreError>) -> StageError {
    StageError::new(stage, PipelineError::Session(e.into()))
}

pub struct ClinicalFlow {
    runner: StageRunner,
    store: Arc<dyn SessionStore>,
}

impl ClinicalFlow {
    pub fn new(runner: StageRunner, store: Arc<dyn SessionStore>) -> Self {
        Self { runner, store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Mint a session and run the intake analysis.
    pub async fn start_intake(
        &self,
        form: &IntakeForm,
    ) -> Result<(SessionContext, StageOutcome<IntakeAnalysis>), StageError> {
        let session = SessionContext::new();
        let outcome = self.intake(&session.id, form).await?;
        Ok((session, outcome))
    }

    /// Run the final analysis for a session whose intake has completed.
    pub async fn refine(
        &self,
        session_id: &Uuid,
        form: &RefinementForm,
    ) -> Result<StageOutcome<FinalAnalysis>, StageError> {
        let intake: IntakeAnalysis = self.prior(session_id, FinalAnalysis::STAGE).await?;
        let carried = intake_carry_forward(&intake)
            .map_err(|e| storage_error(FinalAnalysis::STAGE, e))?;
        let input = form.to_stage_input().merged_with(&carried);
        self.run_and_record::<FinalAnalysis>(session_id, input).await
    }

    /// Plan treatment for a session whose final analysis has completed.
    /// Carried fields override same-named keys in `extra`.
    pub async fn plan_treatment(
        &self,
        session_id: &Uuid,
        extra: &StageInput,
    ) -> Result<StageOutcome<TreatmentPlan>, StageError> {
        let analysis: FinalAnalysis = self.prior(session_id, TreatmentPlan::STAGE).await?;
        let carried = treatment_carry_forward(session_id, &analysis)
            .map_err(|e| storage_error(TreatmentPlan::STAGE, e))?;
        let input = extra.merged_with(&carried);
        self.run_and_record::<TreatmentPlan>(session_id, input).await
    }

    /// Write the patient's first-person story from their intake answers.
    pub async fn patient_story(
        &self,
        session_id: &Uuid,
        form: &IntakeForm,
    ) -> Result<StageOutcome<PatientStory>, StageError> {
        form.validate()
            .map_err(|e| StageError::new(PatientStory::STAGE, e.into()))?;
        self.run_and_record::<PatientStory>(session_id, form.to_stage_input())
            .await
    }

    /// Summarize a finished assistant/patient conversation.
    pub async fn analyze_conversation(
        &self,
        session_id: &Uuid,
        conversation: &ConversationTranscript,
    ) -> Result<StageOutcome<ConversationAnalysis>, StageError> {
        tracing::debug!(
            session_id = %session_id,
            turns = conversation.transcript.len(),
            "Analyzing conversation"
        );
        self.run_and_record::<ConversationAnalysis>(session_id, conversation.to_stage_input())
            .await
    }

    /// Run all three stages under one fresh session.
    pub async fn run_clinical_flow(
        &self,
        input: &ClinicalFlowInput,
    ) -> Result<ClinicalFlowResult, StageError> {
        let session = SessionContext::new();
        let span = tracing::info_span!("clinical_flow", session_id = %session.id);

        async move {
            let intake = self.intake(&session.id, &input.intake).await?;
            let final_analysis = self.refine(&session.id, &input.refinement).await?;
            let treatment = self.plan_treatment(&session.id, &StageInput::new()).await?;
            tracing::info!(
                treatment_fallback = treatment.used_fallback(),
                "Clinical flow completed"
            );
            Ok(ClinicalFlowResult {
                session,
                intake,
                final_analysis,
                treatment,
            })
        }
        .instrument(span)
        .await
    }

    /// Drop every stored record of a session.
    pub async fn delete_session(&self, session_id: &Uuid) -> Result<usize, StoreError> {
        let id = *session_id;
        let removed = self.blocking(move |store| store.remove(&id)).await?;
        tracing::info!(session_id = %id, removed, "Session deleted");
        Ok(removed)
    }

    async fn intake(
        &self,
        session_id: &Uuid,
        form: &IntakeForm,
    ) -> Result<StageOutcome<IntakeAnalysis>, StageError> {
        form.validate()
            .map_err(|e| StageError::new(IntakeAnalysis::STAGE, e.into()))?;
        self.run_and_record::<IntakeAnalysis>(session_id, form.to_stage_input())
            .await
    }

    /// Run a store operation on the blocking pool.
    async fn blocking<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&dyn SessionStore) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    /// Result of the stage preceding `stage`, read back by session id.
    async fn prior<T: StageOutput>(
        &self,
        session_id: &Uuid,
        stage: StageName,
    ) -> Result<T, StageError> {
        let id = *session_id;
        let missing = || StoreError::MissingStage {
            session_id: id,
            stage: T::STAGE,
        };
        let record = self
            .blocking(move |store| store.latest(&id, T::STAGE))
            .await
            .map_err(|e| storage_error(stage, e))?
            .ok_or_else(|| storage_error(stage, missing()))?;
        T::from_result(record.output).ok_or_else(|| storage_error(stage, missing()))
    }

    async fn run_and_record<T: StageOutput + Clone>(
        &self,
        session_id: &Uuid,
        input: StageInput,
    ) -> Result<StageOutcome<T>, StageError> {
        let span = tracing::info_span!("session", session_id = %session_id);
        let outcome = self.runner.run::<T>(&input).instrument(span).await?;

        let record = StageRecord::new(
            *session_id,
            input,
            outcome.result.clone().into(),
            outcome.fallback.clone(),
        );
        self.blocking(move |store| store.append(record))
            .await
            .map_err(|e| storage_error(T::STAGE, e))?;
        Ok(outcome)
    }
}
