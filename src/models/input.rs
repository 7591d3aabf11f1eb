//! Stage input records: the named values a prompt template is rendered from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar or list value bound to one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<InputValue>),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("yes"),
            Self::Bool(false) => f.write_str("no"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) if items.is_empty() => f.write_str("none"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u8> for InputValue {
    fn from(v: u8) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for InputValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<String>> for InputValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v.into_iter().map(InputValue::Text).collect())
    }
}

impl From<Vec<&str>> for InputValue {
    fn from(v: Vec<&str>) -> Self {
        Self::List(v.into_iter().map(InputValue::from).collect())
    }
}

/// Immutable mapping from field names to values.
///
/// Built once with [`StageInput::with`]; combining two records yields a new
/// record via [`StageInput::merged_with`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageInput {
    fields: BTreeMap<String, InputValue>,
}

impl StageInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Consumes and returns the record.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// New record with every field of `self`, then every field of `overrides`.
    /// On a key collision the value from `overrides` wins.
    pub fn merged_with(&self, overrides: &StageInput) -> StageInput {
        let mut fields = self.fields.clone();
        fields.extend(
            overrides
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        StageInput { fields }
    }
}

impl FromIterator<(String, InputValue)> for StageInput {
    fn from_iter<I: IntoIterator<Item = (String, InputValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
