//! Prompt rendering: binds a named template to a stage input.
//!
//! Placeholders are `{identifier}`. `{{` and `}}` render as literal braces, so
//! JSON examples inside a template must double their braces. Any other brace
//! (e.g. `{ "a"` with a space) is kept verbatim.

use std::borrow::Cow;

use super::PipelineError;
use crate::models::StageInput;

/// A named, versioned prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: Cow<'static, str>,
    version: u32,
    text: Cow<'static, str>,
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

impl PromptTemplate {
    pub const fn from_static(name: &'static str, version: u32, text: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            version,
            text: Cow::Borrowed(text),
        }
    }

    pub fn new(name: impl Into<String>, version: u32, text: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            version,
            text: Cow::Owned(text.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declared placeholder names, each once, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in segments(&self.text) {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render the template against `input`.
    ///
    /// Fails with `TemplateBinding` listing every placeholder that has no value.
    /// Keys in `input` that the template never references are ignored.
    pub fn render(&self, input: &StageInput) -> Result<String, PipelineError> {
        let segments = segments(&self.text);
        let mut missing: Vec<String> = Vec::new();
        let mut out = String::with_capacity(self.text.len());

        for segment in &segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match input.get(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => {
                        if !missing.iter().any(|m| m == name) {
                            missing.push((*name).to_string());
                        }
                    }
                },
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::TemplateBinding {
                template: self.name.to_string(),
                missing,
            });
        }
        Ok(out)
    }
}

/// Free-function form of [`PromptTemplate::render`].
pub fn render(template: &PromptTemplate, input: &StageInput) -> Result<String, PipelineError> {
    template.render(input)
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => Some("{"),
            b'}' if bytes.get(i + 1) == Some(&b'}') => Some("}"),
            _ => None,
        };

        if let Some(brace) = escaped {
            push_literal(&mut out, &text[literal_start..i]);
            out.push(Segment::Literal(brace));
            i += 2;
            literal_start = i;
            continue;
        }

        if bytes[i] == b'{' {
            if let Some(len) = placeholder_len(&bytes[i + 1..]) {
                push_literal(&mut out, &text[literal_start..i]);
                out.push(Segment::Placeholder(&text[i + 1..i + 1 + len]));
                i += len + 2;
                literal_start = i;
                continue;
            }
        }
        i += 1;
    }

    push_literal(&mut out, &text[literal_start..]);
    out
}

fn push_literal<'a>(out: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        out.push(Segment::Literal(text));
    }
}

/// Length of an identifier immediately followed by `}`, if `rest` starts with one.
fn placeholder_len(rest: &[u8]) -> Option<usize> {
    let first = *rest.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let len = rest
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    (rest.get(len) == Some(&b'}')).then_some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(text: &'static str) -> PromptTemplate {
        PromptTemplate::from_static("test", 1, text)
    }

    #[test]
    fn renders_bound_placeholders() {
        let t = template("Pain at {location} rated {severity}/10.");
        let input = StageInput::new().with("location", "lower back").with("severity", 7u8);
        assert_eq!(t.render(&input).unwrap(), "Pain at lower back rated 7/10.");
    }

    #[test]
    fn extra_keys_are_ignored() {
        let t = template("Only {a}");
        let input = StageInput::new().with("a", "x").with("unused", "y");
        assert_eq!(render(&t, &input).unwrap(), "Only x");
    }

    #[test]
    fn missing_placeholders_are_all_reported_once() {
        let t = template("{a} {b} {a} {c}");
        let input = StageInput::new().with("b", "present");
        match t.render(&input) {
            Err(PipelineError::TemplateBinding { template, missing }) => {
                assert_eq!(template, "test");
                assert_eq!(missing, vec!["a".to_string(), "c".to_string()]);
            }
            other => panic!("expected TemplateBinding, got {other:?}"),
        }
    }

    #[test]
    fn doubled_braces_are_literal() {
        let t = template(r#"Example: {{"focus": "{focus}"}}"#);
        let input = StageInput::new().with("focus", "mobility");
        assert_eq!(t.render(&input).unwrap(), r#"Example: {"focus": "mobility"}"#);
        assert_eq!(t.placeholders(), vec!["focus"]);
    }

    #[test]
    fn non_identifier_braces_pass_through() {
        let t = template(r#"{ "a": 1 } and {1x} and {"#);
        assert!(t.placeholders().is_empty());
        assert_eq!(t.render(&StageInput::new()).unwrap(), r#"{ "a": 1 } and {1x} and {"#);
    }

    #[test]
    fn placeholders_are_unique_and_ordered() {
        let t = template("{z} {a} {z} {_private}");
        assert_eq!(t.placeholders(), vec!["z", "a", "_private"]);
    }

    #[test]
    fn owned_templates_keep_metadata() {
        let t = PromptTemplate::new("custom", 3, "{x}");
        assert_eq!(t.name(), "custom");
        assert_eq!(t.version(), 3);
        assert_eq!(t.text(), "{x}");
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let t = template("Douleur — {zone} ✓");
        let input = StageInput::new().with("zone", "lombaire");
        assert_eq!(t.render(&input).unwrap(), "Douleur — lombaire ✓");
    }
}
