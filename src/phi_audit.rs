// Patient-data audit: scans every Rust source file for tracing calls whose
// fields name or interpolate questionnaire answers, prompts or model output.
// Log fields may carry ids, stage names, sizes and error categories only.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::LazyLock;

    use regex::Regex;

    /// Field names that hold patient-reported or model-generated content.
    const PHI_FIELDS: &[&str] = &[
        // Questionnaire answers
        "primary_complaint",
        "location_of_pain",
        "describe_pain",
        "red_flag_symptoms",
        "red_flag_details",
        "movement_difficulties",
        "activities_affected",
        "symptom_triggers",
        "symptom_relievers",
        "leg_pain",
        "accidents",
        "bowel_bladder",
        "fever",
        // Prompt and model payloads
        "prompt",
        "system",
        "text",
        "body",
        "response",
        "cleaned",
        "input",
        "output",
        // Analysis content
        "diagnosis",
        "reasoning",
        "simple_explanation",
        "description",
        "intake_analysis",
        "final_analysis",
        "story",
        "paragraph",
        "summary",
        "key_points",
        "risk_factors",
        // Conversation payloads
        "transcript",
        "message",
        "metadata",
    ];

    const ALLOWLIST: &[&str] = &["phi_audit.rs"];

    /// `name = ...` field keys.
    static FIELD_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(r"\b(?:{})\s*=[^=]", PHI_FIELDS.join("|"))).expect("valid regex")
    });

    /// `%value` / `?value` interpolations of the whole field (not `.len()`).
    static FIELD_VALUE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(
            r"[%?]\s*(?:[A-Za-z_][A-Za-z0-9_]*\.)*(?:{})\s*[,)]",
            PHI_FIELDS.join("|")
        ))
        .expect("valid regex")
    });

    static STRING_LITERAL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).expect("valid regex"));

    static TRACING_CALL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^tracing::(?:trace|debug|info|warn|error)(?:_span)?!").expect("valid regex")
    });

    fn leaks(call: &str) -> Option<String> {
        let code = STRING_LITERAL.replace_all(call, "\"\"");
        FIELD_KEY
            .find(&code)
            .or_else(|| FIELD_VALUE.find(&code))
            .map(|m| m.as_str().trim().to_string())
    }

    #[test]
    fn no_patient_data_in_tracing_calls() {
        let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert!(src_dir.exists(), "Source directory not found: {}", src_dir.display());

        let mut violations = Vec::new();
        scan_directory(&src_dir, &src_dir, &mut violations);

        if !violations.is_empty() {
            let report = violations
                .iter()
                .map(|(file, line_num, call, found)| {
                    format!("  {file}:{line_num}: found '{found}' in: {call}")
                })
                .collect::<Vec<_>>()
                .join("\n");
            panic!(
                "Audit failed, {} tracing call(s) log patient data:\n{report}\n\n\
                 Fix: log ids, sizes or categories instead.",
                violations.len()
            );
        }
    }

    #[test]
    fn detects_field_keys_and_interpolations() {
        assert!(leaks(r#"tracing::info!(prompt = %prompt, "calling model");"#).is_some());
        assert!(leaks(r#"tracing::debug!(value = ?form.primary_complaint, "intake");"#).is_some());
        assert!(leaks(r#"tracing::warn!(diagnosis = plan.main_diagnosis.diagnosis.as_str(), "x")"#).is_some());
    }

    #[test]
    fn passes_sizes_ids_and_message_text() {
        assert!(leaks(r#"tracing::debug!(prompt_bytes = request.prompt.len(), "Calling model");"#).is_none());
        assert!(leaks(r#"tracing::info!(session_id = %id, stage = %stage, "Stage completed");"#).is_none());
        assert!(leaks(r#"tracing::warn!(error_kind = e.kind(), "Model response text was empty");"#).is_none());
    }

    fn scan_directory(
        root: &Path,
        dir: &Path,
        violations: &mut Vec<(String, usize, String, String)>,
    ) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                scan_directory(root, &path, violations);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                scan_file(root, &path, violations);
            }
        }
    }

    fn scan_file(root: &Path, path: &Path, violations: &mut Vec<(String, usize, String, String)>) {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        if ALLOWLIST.iter().any(|a| filename.contains(a)) {
            return;
        }
        let Ok(content) = fs::read_to_string(path) else {
            return;
        };
        let relative = path.strip_prefix(root).unwrap_or(path).display().to_string();

        let lines: Vec<&str> = content.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();
            let start = trimmed.find("tracing::").map(|at| &trimmed[at..]);
            let Some(start) = start.filter(|s| TRACING_CALL.is_match(s)) else {
                i += 1;
                continue;
            };

            // Collect the full macro call, which may span lines.
            let mut call = String::from(start);
            let mut depth = paren_delta(start);
            let mut j = i + 1;
            while depth > 0 && j < lines.len() {
                let next = lines[j].trim();
                call.push(' ');
                call.push_str(next);
                depth += paren_delta(next);
                j += 1;
            }

            if let Some(found) = leaks(&call) {
                violations.push((relative.clone(), i + 1, call, found));
            }
            i = j;
        }
    }

    fn paren_delta(line: &str) -> i32 {
        line.chars().fold(0, |d, ch| match ch {
            '(' => d + 1,
            ')' => d - 1,
            _ => d,
        })
    }
}
