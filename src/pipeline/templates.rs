//! Built-in prompt templates, one per stage.
//!
//! JSON examples double their braces; see [`PromptTemplate`].

use super::prompt::PromptTemplate;
use crate::models::StageName;

pub static INTAKE_ANALYSIS: PromptTemplate = PromptTemplate::from_static(
    "intake_analysis",
    1,
    r#"You are a medical assistant helping a physical therapist analyze patient data. Based on the information provided below, return a JSON object with the following fields:

1. "serious_vs_treatable": An object with "diagnosis" (a string: "serious" or "treatable") and "probability" (a float between 0 and 1).
2. "differentiation_probabilities": A list of objects, each with "diagnosis" (a string: "muscle-related", "psychological", or "other") and "probability" (a float between 0 and 1). The probabilities must add up to 1.
3. "main_diagnosis": An object with "diagnosis" (a string), "icd10_code" (a string), "reasoning" (a string explaining the diagnosis), and "probability" (a float between 0 and 1).
4. "other_probabilistic_diagnosis": A list of objects, each with "diagnosis" (a string), "icd10_code" (a string), and "probability" (a float between 0 and 1).

Patient Data:
Primary Complaint: {primary_complaint}
Location of Pain: {location_of_pain}
Describe the Pain: {describe_pain}
Severity (0-10): {severity}
Frequency: {frequency}
Timing: {timing}
Duration of Symptoms: {duration_of_symptoms}
Onset of Pain: {onset_of_pain}
Symptom Progression: {symptom_progression}
Red Flag Symptoms: {red_flag_symptoms}
Red Flag Details: {red_flag_details}
Movement Difficulties: {movement_difficulties}
Activities Affected: {activities_affected}
Symptom Triggers: {symptom_triggers}
Symptom Relievers: {symptom_relievers}

Respond with only a valid JSON object matching the schema exactly."#,
);

pub static FINAL_ANALYSIS: PromptTemplate = PromptTemplate::from_static(
    "final_analysis",
    1,
    r#"You are a medical assistant helping a physical therapist refine an initial assessment. Based on the information provided below, return a JSON object with the following fields:

1. "serious_vs_treatable": An object with "diagnosis" ("serious" or "treatable") and "probability" (a float between 0 and 1).
2. "differentiation_probabilities": A list of exactly 3 objects, each with "diagnosis" (one of "muscle-related", "psychological", "neurological", "inflammatory", "other") and "probability" (a float between 0 and 1). If "serious_vs_treatable" is "treatable", "muscle-related" must be included. The probabilities must add up to 1. Order the list by probability, descending.
3. "big_muscle_group": An object with "name" (a specific muscle group such as "Erector Spinae" or "Quadriceps", not a general term), "description" (a brief anatomical and functional description) and "probability" (a float between 0 and 1).
4. "main_diagnosis": An object with "diagnosis", "icd10_code", "reasoning", "probability" (a float between 0 and 1) and "simple_explanation" (a plain-language explanation for the patient).
5. "other_probabilistic_diagnosis": A list of objects, each with "diagnosis", "icd10_code", "probability" and "simple_explanation", sorted by probability, descending.

Initial Assessment:
Serious vs Treatable: {intake_serious_vs_treatable}
Main Diagnosis: {intake_main_diagnosis} ({intake_main_icd10_code})
Differentiation: {intake_differentiation}
Full Intake Analysis: {intake_analysis}

Follow-up Answers:
Position Change Pain: {position_change_pain}
Pain in Flexion: {pain_in_flexion}
Pain in Extension: {pain_in_extension}
Activity Level: {activity_level}
Leg Pain: {leg_pain}
Pain Time: {pain_time}
Recent Accidents: {accidents}
Bowel/Bladder Changes: {bowel_bladder}
Fever/Infection: {fever}

Respond with only a valid JSON object adhering strictly to this schema."#,
);

pub static TREATMENT_PLAN: PromptTemplate = PromptTemplate::from_static(
    "treatment_plan",
    1,
    r#"You are a physical therapist creating a treatment plan for a patient. Based on the analysis below, create a personalized treatment plan.

Diagnosis: {main_diagnosis} ({main_icd10_code})
Serious vs Treatable: {serious_vs_treatable}
Primary Muscle Group: {muscle_group}: {muscle_group_description}
Full Analysis: {final_analysis}

The treatment plan must include:
1. "treatment_focus" (e.g. pain management, strength building, flexibility)
2. "treatment_recommendations": exactly 3 objects, each with "name", "description", "sets", "reps", "frequency", "duration" and "precautions" (all strings)
3. "reasoning" for the treatment approach
4. "next_phase_focus" for the next phase of treatment

Your response must be a single line of valid JSON. Example:
{{"treatment_focus":"pain management and mobility","treatment_recommendations":[{{"name":"Neck Retraction Exercise","description":"Gentle exercise to improve neck posture","sets":"3","reps":"10","frequency":"Twice daily","duration":"2 weeks","precautions":"Stop if pain increases."}}],"reasoning":"Reduce pain and improve mobility.","next_phase_focus":"strength building"}}

Session ID: {session_id}"#,
);

pub static PATIENT_STORY: PromptTemplate = PromptTemplate::from_static(
    "patient_story",
    1,
    r#"You are a medical assistant helping a physical therapist organize patient health data. Write the patient's story in the first person, as a few focused paragraphs that include all of the data below naturally. Bold key medical terms using Markdown.

Patient Data:
Primary Complaint: {primary_complaint}
Location of Pain: {location_of_pain}
Describe the Pain: {describe_pain}
Severity (0-10): {severity}
Frequency: {frequency}
Timing: {timing}
Duration of Symptoms: {duration_of_symptoms}
Onset of Pain: {onset_of_pain}
Symptom Progression: {symptom_progression}
Red Flag Symptoms: {red_flag_symptoms}
Red Flag Details: {red_flag_details}
Movement Difficulties: {movement_difficulties}
Activities Affected: {activities_affected}
Symptom Triggers: {symptom_triggers}
Symptom Relievers: {symptom_relievers}

Return a JSON object with a single field "story": a list of 3 to 5 objects, each with one field "paragraph" (a string). Example:
{{"story":[{{"paragraph":"I've experienced **sharp pain** in my **right shoulder** for two weeks."}}]}}

Respond with only a valid JSON object."#,
);

pub static CONVERSATION_ANALYSIS: PromptTemplate = PromptTemplate::from_static(
    "conversation_analysis",
    1,
    r#"You are an expert medical professional analyzing a conversation between an AI assistant and a patient.

Conversation Transcript:
{transcript}

Additional Metadata:
{metadata}

Return a JSON object with these fields:
1. "summary": a concise summary of the patient's condition and concerns (a string)
2. "key_points": important points discussed, including symptoms and relevant history (a list of strings)
3. "recommendations": specific actionable recommendations and follow-up steps (a list of strings)
4. "risk_factors": identified risk factors, potential complications and areas of concern (a list of strings)
5. "treatment_suggestions": suggested treatments and therapy recommendations (a list of strings)

Respond with only a valid JSON object."#,
);

/// Built-in template for a stage.
pub fn template_for(stage: StageName) -> &'static PromptTemplate {
    match stage {
        StageName::Intake => &INTAKE_ANALYSIS,
        StageName::Refinement => &FINAL_ANALYSIS,
        StageName::Treatment => &TREATMENT_PLAN,
        StageName::Story => &PATIENT_STORY,
        StageName::Conversation => &CONVERSATION_ANALYSIS,
    }
}
