//! One canonical schema per stage.

use std::sync::LazyLock;

use super::constraints::{Constraint, FieldKind, Schema};
use super::types::{
    ConversationAnalysis, FinalAnalysis, IntakeAnalysis, PatientStory, TreatmentPlan,
};
use super::{StageOutput, StageResult};
use crate::models::StageName;

const SEVERITY_LABELS: &[&str] = &["serious", "treatable"];
const INTAKE_CATEGORIES: &[&str] = &["muscle-related", "psychological", "other"];
const FINAL_CATEGORIES: &[&str] = &[
    "muscle-related",
    "psychological",
    "neurological",
    "inflammatory",
    "other",
];

/// Exact number of treatment recommendations per plan.
pub const RECOMMENDATION_COUNT: usize = 3;
/// Exact number of differentiation categories in the final analysis.
pub const FINAL_CATEGORY_COUNT: usize = 3;
/// Paragraph bounds for a patient story.
pub const STORY_PARAGRAPHS: (usize, usize) = (1, 8);

const CONVERSATION_LISTS: [&str; 4] = [
    "key_points",
    "recommendations",
    "risk_factors",
    "treatment_suggestions",
];

fn serious_vs_treatable() -> Vec<Constraint> {
    vec![
        Constraint::required("serious_vs_treatable", FieldKind::Object),
        Constraint::required("serious_vs_treatable.diagnosis", FieldKind::String),
        Constraint::one_of("serious_vs_treatable.diagnosis", SEVERITY_LABELS),
        Constraint::probability("serious_vs_treatable.probability"),
    ]
}

fn differentiation(categories: &'static [&'static str], min: usize, max: usize) -> Vec<Constraint> {
    vec![
        Constraint::required("differentiation_probabilities", FieldKind::Array),
        Constraint::count("differentiation_probabilities", min, max),
        Constraint::required("differentiation_probabilities[]", FieldKind::Object),
        Constraint::required("differentiation_probabilities[].diagnosis", FieldKind::String),
        Constraint::one_of("differentiation_probabilities[].diagnosis", categories),
        Constraint::distinct("differentiation_probabilities", "diagnosis"),
        Constraint::probability("differentiation_probabilities[].probability"),
        Constraint::sums_to_one("differentiation_probabilities", "probability"),
    ]
}

fn main_diagnosis(explanation_required: bool) -> Vec<Constraint> {
    vec![
        Constraint::required("main_diagnosis", FieldKind::Object),
        Constraint::required("main_diagnosis.diagnosis", FieldKind::String),
        Constraint::required("main_diagnosis.icd10_code", FieldKind::String),
        Constraint::required("main_diagnosis.reasoning", FieldKind::String),
        Constraint::probability("main_diagnosis.probability"),
        Constraint::Field {
            path: "main_diagnosis.simple_explanation",
            kind: FieldKind::String,
            required: explanation_required,
        },
    ]
}

fn other_diagnoses(explanation_required: bool) -> Vec<Constraint> {
    vec![
        Constraint::required("other_probabilistic_diagnosis", FieldKind::Array),
        Constraint::required("other_probabilistic_diagnosis[]", FieldKind::Object),
        Constraint::required("other_probabilistic_diagnosis[].diagnosis", FieldKind::String),
        Constraint::required("other_probabilistic_diagnosis[].icd10_code", FieldKind::String),
        Constraint::probability("other_probabilistic_diagnosis[].probability"),
        Constraint::Field {
            path: "other_probabilistic_diagnosis[].simple_explanation",
            kind: FieldKind::String,
            required: explanation_required,
        },
    ]
}

static INTAKE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let constraints = [
        serious_vs_treatable(),
        differentiation(INTAKE_CATEGORIES, 1, INTAKE_CATEGORIES.len()),
        main_diagnosis(false),
        other_diagnoses(false),
    ]
    .concat();
    Schema::new("intake_analysis", constraints)
});

static FINAL_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let constraints = [
        serious_vs_treatable(),
        differentiation(FINAL_CATEGORIES, FINAL_CATEGORY_COUNT, FINAL_CATEGORY_COUNT),
        vec![Constraint::RequiresMember {
            when_path: "serious_vs_treatable.diagnosis",
            when_equals: "treatable",
            list: "differentiation_probabilities",
            field: "diagnosis",
            member: "muscle-related",
        }],
        vec![
            Constraint::required("big_muscle_group", FieldKind::Object),
            Constraint::required("big_muscle_group.name", FieldKind::String),
            Constraint::required("big_muscle_group.description", FieldKind::String),
            Constraint::probability("big_muscle_group.probability"),
        ],
        main_diagnosis(true),
        other_diagnoses(true),
    ]
    .concat();
    Schema::new("final_analysis", constraints)
});

static TREATMENT_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let mut constraints = vec![
        Constraint::required("treatment_focus", FieldKind::String),
        Constraint::required("reasoning", FieldKind::String),
        Constraint::required("next_phase_focus", FieldKind::String),
        Constraint::required("treatment_recommendations", FieldKind::Array),
        Constraint::count(
            "treatment_recommendations",
            RECOMMENDATION_COUNT,
            RECOMMENDATION_COUNT,
        ),
        Constraint::required("treatment_recommendations[]", FieldKind::Object),
    ];
    constraints.extend(
        [
            "treatment_recommendations[].name",
            "treatment_recommendations[].description",
            "treatment_recommendations[].sets",
            "treatment_recommendations[].reps",
            "treatment_recommendations[].frequency",
            "treatment_recommendations[].duration",
            "treatment_recommendations[].precautions",
        ]
        .into_iter()
        .map(|path| Constraint::required(path, FieldKind::String)),
    );
    Schema::new("treatment_plan", constraints)
});

static STORY_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "patient_story",
        vec![
            Constraint::required("story", FieldKind::Array),
            Constraint::count("story", STORY_PARAGRAPHS.0, STORY_PARAGRAPHS.1),
            Constraint::required("story[]", FieldKind::Object),
            Constraint::required("story[].paragraph", FieldKind::String),
        ],
    )
});

static CONVERSATION_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let mut constraints = vec![Constraint::required("summary", FieldKind::String)];
    for list in CONVERSATION_LISTS {
        constraints.push(Constraint::required(list, FieldKind::Array));
    }
    constraints.extend(
        [
            "key_points[]",
            "recommendations[]",
            "risk_factors[]",
            "treatment_suggestions[]",
        ]
        .into_iter()
        .map(|path| Constraint::required(path, FieldKind::String)),
    );
    Schema::new("conversation_analysis", constraints)
});

/// Canonical schema for a stage.
pub fn schema_for(stage: StageName) -> &'static Schema {
    match stage {
        StageName::Intake => &INTAKE_SCHEMA,
        StageName::Refinement => &FINAL_SCHEMA,
        StageName::Treatment => &TREATMENT_SCHEMA,
        StageName::Story => &STORY_SCHEMA,
        StageName::Conversation => &CONVERSATION_SCHEMA,
    }
}

impl StageOutput for IntakeAnalysis {
    const STAGE: StageName = StageName::Intake;

    fn from_result(result: StageResult) -> Option<Self> {
        match result {
            StageResult::Intake(v) => Some(v),
            _ => None,
        }
    }
}

impl StageOutput for FinalAnalysis {
    const STAGE: StageName = StageName::Refinement;

    fn from_result(result: StageResult) -> Option<Self> {
        match result {
            StageResult::Final(v) => Some(v),
            _ => None,
        }
    }
}

impl StageOutput for TreatmentPlan {
    const STAGE: StageName = StageName::Treatment;

    fn from_result(result: StageResult) -> Option<Self> {
        match result {
            StageResult::Treatment(v) => Some(v),
            _ => None,
        }
    }

    fn fallback_result() -> Option<Self> {
        Some(TreatmentPlan::fallback())
    }
}

impl StageOutput for PatientStory {
    const STAGE: StageName = StageName::Story;

    fn from_result(result: StageResult) -> Option<Self> {
        match result {
            StageResult::Story(v) => Some(v),
            _ => None,
        }
    }
}

impl StageOutput for ConversationAnalysis {
    const STAGE: StageName = StageName::Conversation;

    fn from_result(result: StageResult) -> Option<Self> {
        match result {
            StageResult::Conversation(v) => Some(v),
            _ => None,
        }
    }
}
