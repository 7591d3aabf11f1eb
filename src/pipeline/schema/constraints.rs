//! Declarative schema constraints evaluated over a generic JSON tree.
//!
//! Paths are dotted field names; a `[]` suffix fans out over every element
//! of an array, e.g. `differentiation_probabilities[].probability`. Reported
//! violations carry the concrete path (`differentiation_probabilities[1].probability`).

use serde_json::Value;

use crate::pipeline::Violation;

/// Default slack allowed on probability sums.
pub const SUM_TOLERANCE: f64 = 0.01;

/// Absorbs float noise so that a sum of exactly `1 ± tolerance` is accepted.
const FLOAT_EPSILON: f64 = 1e-9;

const MISSING: &str = "<missing>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Object,
    Array,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn article(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Object => "an object",
            Self::Array => "an array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Presence and JSON type. `null` counts as absent.
    Field {
        path: &'static str,
        kind: FieldKind,
        required: bool,
    },
    /// Required number within `[0, 1]`.
    Probability { path: &'static str },
    /// `sum(list[].field)` within `1 ± tolerance`.
    ProbabilitySum {
        list: &'static str,
        field: &'static str,
        tolerance: f64,
    },
    /// Array length bounds (inclusive).
    Cardinality {
        path: &'static str,
        min: usize,
        max: usize,
    },
    /// String value drawn from a fixed set.
    OneOf {
        path: &'static str,
        allowed: &'static [&'static str],
    },
    /// No two `list[].field` strings are equal.
    Distinct {
        list: &'static str,
        field: &'static str,
    },
    /// When `when_path == when_equals`, some `list[].field` must equal `member`.
    RequiresMember {
        when_path: &'static str,
        when_equals: &'static str,
        list: &'static str,
        field: &'static str,
        member: &'static str,
    },
}

impl Constraint {
    pub const fn required(path: &'static str, kind: FieldKind) -> Self {
        Self::Field {
            path,
            kind,
            required: true,
        }
    }

    pub const fn optional(path: &'static str, kind: FieldKind) -> Self {
        Self::Field {
            path,
            kind,
            required: false,
        }
    }

    pub const fn probability(path: &'static str) -> Self {
        Self::Probability { path }
    }

    pub const fn sums_to_one(list: &'static str, field: &'static str) -> Self {
        Self::ProbabilitySum {
            list,
            field,
            tolerance: SUM_TOLERANCE,
        }
    }

    pub const fn count(path: &'static str, min: usize, max: usize) -> Self {
        Self::Cardinality { path, min, max }
    }

    pub const fn one_of(path: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::OneOf { path, allowed }
    }

    pub const fn distinct(list: &'static str, field: &'static str) -> Self {
        Self::Distinct { list, field }
    }

    /// Append every violation of this constraint against `root` to `out`.
    pub fn check(&self, root: &Value, out: &mut Vec<Violation>) {
        match self {
            Self::Field {
                path,
                kind,
                required,
            } => {
                for (field, value) in resolve(root, path) {
                    match value.filter(|v| !v.is_null()) {
                        None if *required => out.push(violation(field, "is required", None)),
                        None => {}
                        Some(v) if !kind.matches(v) => out.push(violation(
                            field,
                            format!("must be {}", kind.article()),
                            Some(v),
                        )),
                        Some(_) => {}
                    }
                }
            }

            Self::Probability { path } => {
                for (field, value) in resolve(root, path) {
                    match value.filter(|v| !v.is_null()) {
                        None => out.push(violation(field, "is required", None)),
                        Some(v) => match v.as_f64() {
                            Some(p) if (0.0..=1.0).contains(&p) => {}
                            Some(_) => out.push(violation(field, "must be within [0, 1]", Some(v))),
                            None => out.push(violation(field, "must be a number", Some(v))),
                        },
                    }
                }
            }

            Self::ProbabilitySum {
                list,
                field,
                tolerance,
            } => {
                for (list_path, items) in resolve(root, list) {
                    let Some(items) = items.and_then(Value::as_array) else {
                        continue;
                    };
                    // Non-numeric entries are reported by their own constraints.
                    let probabilities: Option<Vec<f64>> = items
                        .iter()
                        .map(|item| item.get(*field).and_then(Value::as_f64))
                        .collect();
                    let Some(probabilities) = probabilities else {
                        continue;
                    };
                    let sum: f64 = probabilities.iter().sum();
                    if (sum - 1.0).abs() > tolerance + FLOAT_EPSILON {
                        out.push(Violation {
                            field: list_path,
                            rule: format!("{field} values must sum to 1 (±{tolerance})"),
                            value: format_sum(sum),
                        });
                    }
                }
            }

            Self::Cardinality { path, min, max } => {
                for (field, value) in resolve(root, path) {
                    let Some(items) = value.and_then(Value::as_array) else {
                        continue;
                    };
                    let len = items.len();
                    if len < *min || len > *max {
                        let rule = if min == max {
                            format!("must contain exactly {min} items")
                        } else {
                            format!("must contain between {min} and {max} items")
                        };
                        out.push(Violation {
                            field,
                            rule,
                            value: format!("{len} items"),
                        });
                    }
                }
            }

            Self::OneOf { path, allowed } => {
                for (field, value) in resolve(root, path) {
                    let Some(v) = value else { continue };
                    let Some(s) = v.as_str() else { continue };
                    if !allowed.iter().any(|a| *a == s) {
                        out.push(violation(
                            field,
                            format!("must be one of: {}", allowed.join(", ")),
                            Some(v),
                        ));
                    }
                }
            }

            Self::Distinct { list, field } => {
                for (list_path, items) in resolve(root, list) {
                    let Some(items) = items.and_then(Value::as_array) else {
                        continue;
                    };
                    let mut seen: Vec<&str> = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let Some(label) = item.get(*field).and_then(Value::as_str) else {
                            continue;
                        };
                        if seen.contains(&label) {
                            out.push(violation(
                                format!("{list_path}[{i}].{field}"),
                                format!("must be distinct within {list_path}"),
                                item.get(*field),
                            ));
                        } else {
                            seen.push(label);
                        }
                    }
                }
            }

            Self::RequiresMember {
                when_path,
                when_equals,
                list,
                field,
                member,
            } => {
                let triggered = resolve(root, when_path)
                    .into_iter()
                    .any(|(_, v)| v.and_then(Value::as_str) == Some(*when_equals));
                if !triggered {
                    return;
                }
                for (list_path, items) in resolve(root, list) {
                    let Some(items) = items.and_then(Value::as_array) else {
                        continue;
                    };
                    let present = items
                        .iter()
                        .any(|item| item.get(*field).and_then(Value::as_str) == Some(*member));
                    if !present {
                        let labels: Vec<&str> = items
                            .iter()
                            .filter_map(|item| item.get(*field).and_then(Value::as_str))
                            .collect();
                        out.push(Violation {
                            field: list_path,
                            rule: format!(
                                "must include {field} \"{member}\" when {when_path} is \"{when_equals}\""
                            ),
                            value: format!("{labels:?}"),
                        });
                    }
                }
            }
        }
    }
}

/// A named list of constraints, evaluated in declaration order.
#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    constraints: Vec<Constraint>,
}

impl Schema {
    pub fn new(name: &'static str, constraints: Vec<Constraint>) -> Self {
        Self { name, constraints }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Every violation in `root`; empty when the tree conforms.
    pub fn check(&self, root: &Value) -> Vec<Violation> {
        if !root.is_object() {
            return vec![violation("$".into(), "must be a JSON object", Some(root))];
        }
        let mut out = Vec::new();
        for constraint in &self.constraints {
            constraint.check(root, &mut out);
        }
        out
    }
}

/// Expand `path` against `root` into `(concrete path, value)` pairs.
///
/// A missing leaf yields `None`. A missing or mistyped intermediate node
/// yields nothing, since the constraint on that node reports it.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Vec<(String, Option<&'a Value>)> {
    let mut current: Vec<(String, Option<&'a Value>)> = vec![(String::new(), Some(root))];

    for segment in path.split('.') {
        let (key, fan_out) = match segment.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (segment, false),
        };
        let mut next = Vec::new();

        for (prefix, node) in current {
            let Some(object) = node.and_then(Value::as_object) else {
                continue;
            };
            let concrete = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{prefix}.{key}")
            };
            let child = object.get(key);

            if fan_out {
                if let Some(items) = child.and_then(Value::as_array) {
                    for (i, item) in items.iter().enumerate() {
                        next.push((format!("{concrete}[{i}]"), Some(item)));
                    }
                }
            } else {
                next.push((concrete, child));
            }
        }
        current = next;
    }
    current
}

fn violation(field: String, rule: impl Into<String>, value: Option<&Value>) -> Violation {
    Violation {
        field,
        rule: rule.into(),
        value: value.map_or_else(|| MISSING.to_string(), Value::to_string),
    }
}

fn format_sum(sum: f64) -> String {
    let rounded = (sum * 1e6).round() / 1e6;
    format!("sum {rounded}")
}
