use serde::{Deserialize, Serialize};

use super::enums::{ActivityLevel, PainTime, PositionChangePain};
use super::input::StageInput;
use super::ModelError;

pub const MAX_SEVERITY: u8 = 10;

/// Patient intake questionnaire, as submitted by the intake layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeForm {
    pub primary_complaint: String,
    pub location_of_pain: String,
    pub describe_pain: String,
    /// 0-10 self-reported scale.
    pub severity: u8,
    pub frequency: String,
    pub timing: String,
    pub duration_of_symptoms: String,
    pub onset_of_pain: String,
    pub symptom_progression: String,
    #[serde(default)]
    pub red_flag_symptoms: Vec<String>,
    #[serde(default)]
    pub red_flag_details: String,
    pub movement_difficulties: String,
    #[serde(default)]
    pub activities_affected: Vec<String>,
    pub symptom_triggers: String,
    pub symptom_relievers: String,
}

impl IntakeForm {
    /// Reject answers outside the questionnaire's ranges.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.severity > MAX_SEVERITY {
            return Err(ModelError::OutOfRange {
                field: "severity".into(),
                value: i64::from(self.severity),
                max: i64::from(MAX_SEVERITY),
            });
        }
        Ok(())
    }

    pub fn to_stage_input(&self) -> StageInput {
        StageInput::new()
            .with("primary_complaint", self.primary_complaint.as_str())
            .with("location_of_pain", self.location_of_pain.as_str())
            .with("describe_pain", self.describe_pain.as_str())
            .with("severity", self.severity)
            .with("frequency", self.frequency.as_str())
            .with("timing", self.timing.as_str())
            .with("duration_of_symptoms", self.duration_of_symptoms.as_str())
            .with("onset_of_pain", self.onset_of_pain.as_str())
            .with("symptom_progression", self.symptom_progression.as_str())
            .with("red_flag_symptoms", self.red_flag_symptoms.clone())
            .with("red_flag_details", self.red_flag_details.as_str())
            .with("movement_difficulties", self.movement_difficulties.as_str())
            .with("activities_affected", self.activities_affected.clone())
            .with("symptom_triggers", self.symptom_triggers.as_str())
            .with("symptom_relievers", self.symptom_relievers.as_str())
    }
}

/// Follow-up answers collected after the intake analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementForm {
    pub position_change_pain: PositionChangePain,
    pub activity_level: ActivityLevel,
    pub leg_pain: String,
    pub pain_time: PainTime,
    pub accidents: String,
    pub bowel_bladder: String,
    pub fever: String,
}

impl RefinementForm {
    /// Pain on flexion / extension, derived from the position-change answer.
    pub fn pain_directions(&self) -> (bool, bool) {
        match self.position_change_pain {
            PositionChangePain::Flexion => (true, false),
            PositionChangePain::Extension => (false, true),
            PositionChangePain::NoPain => (false, false),
        }
    }

    pub fn to_stage_input(&self) -> StageInput {
        let (in_flexion, in_extension) = self.pain_directions();
        StageInput::new()
            .with("position_change_pain", self.position_change_pain.as_str())
            .with("pain_in_flexion", in_flexion)
            .with("pain_in_extension", in_extension)
            .with("activity_level", self.activity_level.as_str())
            .with("leg_pain", self.leg_pain.as_str())
            .with("pain_time", self.pain_time.as_str())
            .with("accidents", self.accidents.as_str())
            .with("bowel_bladder", self.bowel_bladder.as_str())
            .with("fever", self.fever.as_str())
    }
}

/// One turn of a recorded assistant/patient conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    #[serde(default)]
    pub time_in_call_secs: u32,
    pub message: String,
}

/// A finished conversation handed over for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTranscript {
    pub conversation_id: String,
    pub transcript: Vec<TranscriptMessage>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConversationTranscript {
    pub fn to_stage_input(&self) -> StageInput {
        let transcript = self
            .transcript
            .iter()
            .map(|m| format!("{}: {}", m.role, m.message))
            .collect::<Vec<_>>()
            .join("\n");
        StageInput::new()
            .with("transcript", transcript)
            .with("metadata", serde_json::Value::Object(self.metadata.clone()).to_string())
    }
}
