use serde::{Deserialize, Serialize};

use crate::models::StageName;

/// A labelled probability (`serious_vs_treatable`, differentiation entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseDiagnosis {
    pub diagnosis: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticDiagnosis {
    pub diagnosis: String,
    pub icd10_code: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainDiagnosis {
    pub diagnosis: String,
    pub icd10_code: String,
    pub reasoning: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigMuscleGroup {
    pub name: String,
    pub description: String,
    pub probability: f64,
}

/// Result of the first stage, computed from the intake questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeAnalysis {
    pub serious_vs_treatable: BaseDiagnosis,
    pub differentiation_probabilities: Vec<BaseDiagnosis>,
    pub main_diagnosis: MainDiagnosis,
    pub other_probabilistic_diagnosis: Vec<ProbabilisticDiagnosis>,
}

/// Result of the refinement stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnalysis {
    pub serious_vs_treatable: BaseDiagnosis,
    pub differentiation_probabilities: Vec<BaseDiagnosis>,
    pub big_muscle_group: BigMuscleGroup,
    pub main_diagnosis: MainDiagnosis,
    pub other_probabilistic_diagnosis: Vec<ProbabilisticDiagnosis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRecommendation {
    pub name: String,
    pub description: String,
    pub sets: String,
    pub reps: String,
    pub frequency: String,
    pub duration: String,
    pub precautions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub treatment_focus: String,
    pub treatment_recommendations: Vec<TreatmentRecommendation>,
    pub reasoning: String,
    pub next_phase_focus: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryParagraph {
    pub paragraph: String,
}

/// First-person narrative of the intake answers, for the therapist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientStory {
    pub story: Vec<StoryParagraph>,
}

/// Clinical reading of a patient/assistant conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub summary: String,
    pub key_points: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
    pub treatment_suggestions: Vec<String>,
}

fn recommendation(
    name: &str,
    description: &str,
    sets: &str,
    reps: &str,
    frequency: &str,
    duration: &str,
    precautions: &str,
) -> TreatmentRecommendation {
    TreatmentRecommendation {
        name: name.into(),
        description: description.into(),
        sets: sets.into(),
        reps: reps.into(),
        frequency: frequency.into(),
        duration: duration.into(),
        precautions: precautions.into(),
    }
}

impl TreatmentPlan {
    /// Conservative plan returned when the model cannot produce one.
    /// Satisfies the treatment schema (three recommendations).
    pub fn fallback() -> Self {
        Self {
            treatment_focus: "pain management and core stability".into(),
            treatment_recommendations: vec![
                recommendation(
                    "Pelvic Tilts",
                    "Gentle core exercise to improve pelvic stability and reduce lower back strain",
                    "3",
                    "10-12",
                    "Daily",
                    "2 weeks",
                    "Stop if pain increases beyond 3/10. Maintain neutral spine position.",
                ),
                recommendation(
                    "Cat-Cow Stretch",
                    "Dynamic spinal mobility exercise to improve flexibility and reduce stiffness",
                    "2",
                    "Hold each position for 5-10 seconds",
                    "Twice daily",
                    "2 weeks",
                    "Move slowly and breathe deeply. Avoid if sharp pain occurs.",
                ),
                recommendation(
                    "Bridging Exercise",
                    "Progressive core and glute strengthening exercise",
                    "3",
                    "Hold for 10 seconds",
                    "Daily",
                    "Ongoing",
                    "Maintain neutral spine. Stop if pain increases in lower back.",
                ),
            ],
            reasoning: "Initial treatment plan focusing on core stability and proper posture \
                        to address the muscle strain."
                .into(),
            next_phase_focus: "progressive strengthening".into(),
        }
    }
}

/// A validated result of any stage, tagged by stage name when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "result")]
pub enum StageResult {
    #[serde(rename = "intake_analysis")]
    Intake(IntakeAnalysis),
    #[serde(rename = "final_analysis")]
    Final(FinalAnalysis),
    #[serde(rename = "treatment_plan")]
    Treatment(TreatmentPlan),
    #[serde(rename = "patient_story")]
    Story(PatientStory),
    #[serde(rename = "conversation_analysis")]
    Conversation(ConversationAnalysis),
}

impl StageResult {
    pub fn stage(&self) -> StageName {
        match self {
            Self::Intake(_) => StageName::Intake,
            Self::Final(_) => StageName::Refinement,
            Self::Treatment(_) => StageName::Treatment,
            Self::Story(_) => StageName::Story,
            Self::Conversation(_) => StageName::Conversation,
        }
    }
}

impl From<IntakeAnalysis> for StageResult {
    fn from(v: IntakeAnalysis) -> Self {
        Self::Intake(v)
    }
}

impl From<FinalAnalysis> for StageResult {
    fn from(v: FinalAnalysis) -> Self {
        Self::Final(v)
    }
}

impl From<TreatmentPlan> for StageResult {
    fn from(v: TreatmentPlan) -> Self {
        Self::Treatment(v)
    }
}

impl From<PatientStory> for StageResult {
    fn from(v: PatientStory) -> Self {
        Self::Story(v)
    }
}

impl From<ConversationAnalysis> for StageResult {
    fn from(v: ConversationAnalysis) -> Self {
        Self::Conversation(v)
    }
}
