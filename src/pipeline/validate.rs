//! Schema validation of normalized model output.
//!
//! All constraints are evaluated first and every violation is reported
//! together. Only a conforming tree is mapped onto the typed record.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::normalize::NormalizedJson;
use super::schema::{Schema, StageOutput};
use super::{PipelineError, Violation};

/// Validate against the stage's canonical schema and map onto `T`.
pub fn validate<T: StageOutput>(json: &NormalizedJson) -> Result<T, PipelineError> {
    validate_with(T::schema(), json)
}

/// Validate against an explicit schema and map onto any deserializable type.
pub fn validate_with<T: DeserializeOwned>(
    schema: &Schema,
    json: &NormalizedJson,
) -> Result<T, PipelineError> {
    let tree = json
        .to_value()
        .map_err(|e| PipelineError::MalformedResponse {
            reason: e.to_string(),
            cleaned: json.as_str().to_string(),
        })?;

    let violations = schema.check(&tree);
    if !violations.is_empty() {
        tracing::debug!(
            schema = schema.name(),
            violation_count = violations.len(),
            "Schema validation failed"
        );
        return Err(PipelineError::SchemaViolation { violations });
    }

    map_onto(tree)
}

/// Serde mapping of an already-conforming tree. A failure here means the
/// schema is looser than the target type.
fn map_onto<T: DeserializeOwned>(tree: Value) -> Result<T, PipelineError> {
    serde_json::from_value(tree).map_err(|e| PipelineError::SchemaViolation {
        violations: vec![Violation {
            field: "$".into(),
            rule: format!("must match the target record: {e}"),
            value: "<object>".into(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize;
    use crate::pipeline::schema::types::fixtures::*;
    use crate::pipeline::schema::{
        Constraint, FieldKind, FinalAnalysis, IntakeAnalysis, TreatmentPlan,
    };
    use serde::Deserialize;
    use serde_json::json;

    fn normalized(value: &Value) -> NormalizedJson {
        normalize(&value.to_string()).unwrap()
    }

    fn violations_of<T: StageOutput + std::fmt::Debug>(value: &Value) -> Vec<Violation> {
        match validate::<T>(&normalized(value)) {
            Err(PipelineError::SchemaViolation { violations }) => violations,
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    fn treatment_with(count: usize) -> Value {
        let mut root: Value = serde_json::from_str(TREATMENT_JSON).unwrap();
        let first = root["treatment_recommendations"][0].clone();
        root["treatment_recommendations"] = Value::Array(vec![first; count]);
        root
    }

    fn intake_with_probabilities(probabilities: &[f64]) -> Value {
        let mut root: Value = serde_json::from_str(INTAKE_JSON).unwrap();
        let labels = ["muscle-related", "psychological", "other"];
        root["differentiation_probabilities"] = probabilities
            .iter()
            .zip(labels)
            .map(|(p, label)| json!({"diagnosis": label, "probability": p}))
            .collect();
        root
    }

    #[test]
    fn end_to_end_generic_schema() {
        #[derive(Deserialize)]
        struct Example {
            a: f64,
            b: String,
        }
        let schema = Schema::new(
            "example",
            vec![
                Constraint::required("a", FieldKind::Number),
                Constraint::required("b", FieldKind::String),
            ],
        );
        let raw = "Here is the result:\n```json\n{\n  \"a\": 1,\n  \"b\": \"x\"\n}\n```\nThanks.";
        let json = normalize(raw).unwrap();
        assert_eq!(json.as_str(), r#"{"a": 1, "b": "x"}"#);

        let example: Example = validate_with(&schema, &json).unwrap();
        assert_eq!(example.a, 1.0);
        assert_eq!(example.b, "x");
    }

    #[test]
    fn probability_sum_boundaries() {
        let ok = intake_with_probabilities(&[0.5, 0.3, 0.2]);
        assert!(validate::<IntakeAnalysis>(&normalized(&ok)).is_ok());

        for probs in [[0.5, 0.3, 0.18], [0.5, 0.3, 0.22]] {
            let violations = violations_of::<IntakeAnalysis>(&intake_with_probabilities(&probs));
            assert_eq!(violations.len(), 1, "{probs:?}");
            assert_eq!(violations[0].field, "differentiation_probabilities");
        }
    }

    #[test]
    fn exactly_three_recommendations() {
        assert!(validate::<TreatmentPlan>(&normalized(&treatment_with(3))).is_ok());
        for count in [2, 4] {
            let violations = violations_of::<TreatmentPlan>(&treatment_with(count));
            assert_eq!(violations[0].field, "treatment_recommendations");
            assert_eq!(violations[0].value, format!("{count} items"));
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let mut root: Value = serde_json::from_str(FINAL_JSON).unwrap();
        root["main_diagnosis"]["probability"] = json!(1.4);
        root["big_muscle_group"]
            .as_object_mut()
            .unwrap()
            .remove("name");
        root["differentiation_probabilities"][2]["diagnosis"] = json!("vascular");

        let fields: Vec<String> = violations_of::<FinalAnalysis>(&root)
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "differentiation_probabilities[2].diagnosis",
                "big_muscle_group.name",
                "main_diagnosis.probability",
            ]
        );
    }

    #[test]
    fn repeated_differentiation_labels_are_rejected() {
        let mut root: Value = serde_json::from_str(FINAL_JSON).unwrap();
        for i in 0..3 {
            root["differentiation_probabilities"][i]["diagnosis"] = json!("muscle-related");
        }
        let violations = violations_of::<FinalAnalysis>(&root);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.rule.starts_with("must be distinct")));
    }

    #[test]
    fn valid_payload_maps_to_typed_record() {
        let root: Value = serde_json::from_str(INTAKE_JSON).unwrap();
        let intake = validate::<IntakeAnalysis>(&normalized(&root)).unwrap();
        assert_eq!(intake.main_diagnosis.icd10_code, "S39.012A");
        assert_eq!(intake.other_probabilistic_diagnosis.len(), 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut root: Value = serde_json::from_str(TREATMENT_JSON).unwrap();
        root["confidence"] = json!("high");
        assert!(validate::<TreatmentPlan>(&normalized(&root)).is_ok());
    }
}
