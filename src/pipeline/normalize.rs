//! Response normalizer: deterministic textual repair of model output into
//! strict JSON. No schema knowledge, no I/O.
//!
//! Passes run in the order of [`RepairPass::PRIMARY`]. If the result does not
//! parse, [`RepairPass::QuoteBareTokens`] runs once and the parse is retried.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::PipelineError;

// ═══════════════════════════════════════════
// Repair passes
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPass {
    Trim,
    StripFences,
    SliceBraces,
    CollapseWhitespace,
    BalanceBraces,
    QuoteBareTokens,
}

impl RepairPass {
    /// Passes applied unconditionally, in order.
    pub const PRIMARY: [RepairPass; 5] = [
        RepairPass::Trim,
        RepairPass::StripFences,
        RepairPass::SliceBraces,
        RepairPass::CollapseWhitespace,
        RepairPass::BalanceBraces,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trim => "trim",
            Self::StripFences => "strip_fences",
            Self::SliceBraces => "slice_braces",
            Self::CollapseWhitespace => "collapse_whitespace",
            Self::BalanceBraces => "balance_braces",
            Self::QuoteBareTokens => "quote_bare_tokens",
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Trim => text.trim().to_string(),
            Self::StripFences => strip_fences(text),
            Self::SliceBraces => slice_braces(text).to_string(),
            Self::CollapseWhitespace => collapse_whitespace(text),
            Self::BalanceBraces => balance_braces(text),
            Self::QuoteBareTokens => quote_bare_tokens(text),
        }
    }
}

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*").expect("valid regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\s*$").expect("valid regex"));

/// Drop a leading fence (with optional language tag) and a trailing fence.
fn strip_fences(text: &str) -> String {
    let body = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(&body, "").trim().to_string()
}

/// Keep the span from the first `{` to the last `}`.
fn slice_braces(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        // Truncated: opening brace but no closing one after it.
        (Some(s), _) => &text[s..],
        (None, Some(e)) => &text[..=e],
        (None, None) => text,
    }
}

/// Collapse whitespace runs to a single space.
///
/// Outside strings, whitespace right after `{`/`[` or right before `}`/`]` is
/// removed. Inside strings only runs containing a line break or tab are
/// collapsed; other string content is kept as-is.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => {
                    out.push(c);
                    in_string = false;
                }
                c if c.is_whitespace() => {
                    let mut run = String::from(c);
                    while let Some(&next) = chars.peek() {
                        if !next.is_whitespace() {
                            break;
                        }
                        run.push(next);
                        chars.next();
                    }
                    if run.contains(['\n', '\r', '\t']) {
                        out.push(' ');
                    } else {
                        out.push_str(&run);
                    }
                }
                _ => out.push(c),
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let after_open = matches!(out.chars().last(), None | Some('{') | Some('['));
            let before_close = matches!(c, '}' | ']');
            if !after_open && !before_close {
                out.push(' ');
            }
            pending_space = false;
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

/// Prepend `{` / append `}` when missing.
fn balance_braces(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    if !text.starts_with('{') {
        out.push('{');
    }
    out.push_str(text);
    if !text.ends_with('}') {
        out.push('}');
    }
    out
}

/// Quote bare identifier keys followed by `:` and bare word values followed by
/// `,`, `}` or `]`. `true`, `false` and `null` stay bare. String contents and
/// numbers are never touched.
fn quote_bare_tokens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
        } else if c.is_ascii_digit() || c == '-' {
            while i < chars.len() && is_number_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let token: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().copied().find(|c| !c.is_whitespace());
            let quote = match next {
                Some(':') => true,
                Some(',' | '}' | ']') => !matches!(token.as_str(), "true" | "false" | "null"),
                _ => false,
            };
            if quote {
                out.push('"');
                out.push_str(&token);
                out.push('"');
            } else {
                out.push_str(&token);
            }
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

// ═══════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════

/// Model output confirmed to parse as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedJson {
    text: String,
    repairs: Vec<RepairPass>,
}

impl NormalizedJson {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Passes that changed the text, in the order they ran.
    pub fn repairs(&self) -> &[RepairPass] {
        &self.repairs
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}

fn malformed(reason: impl Into<String>, cleaned: String) -> PipelineError {
    PipelineError::MalformedResponse {
        reason: reason.into(),
        cleaned,
    }
}

/// Repair raw model text into strict JSON.
pub fn normalize(raw: &str) -> Result<NormalizedJson, PipelineError> {
    if raw.trim().is_empty() {
        return Err(malformed("empty model output", String::new()));
    }

    let mut text = raw.to_string();
    let mut repairs = Vec::new();
    for pass in RepairPass::PRIMARY {
        let next = pass.apply(&text);
        if next != text {
            repairs.push(pass);
            text = next;
        }
    }

    let first_error = match serde_json::from_str::<Value>(&text) {
        Ok(_) => {
            tracing::debug!(repairs = repairs.len(), bytes = text.len(), "Model output normalized");
            return Ok(NormalizedJson { text, repairs });
        }
        Err(e) => e,
    };

    let repaired = RepairPass::QuoteBareTokens.apply(&text);
    if repaired == text {
        return Err(malformed(first_error.to_string(), text));
    }

    match serde_json::from_str::<Value>(&repaired) {
        Ok(_) => {
            repairs.push(RepairPass::QuoteBareTokens);
            tracing::debug!(
                repairs = repairs.len(),
                bytes = repaired.len(),
                "Model output normalized after token quoting"
            );
            Ok(NormalizedJson {
                text: repaired,
                repairs,
            })
        }
        Err(e) => Err(malformed(e.to_string(), repaired)),
    }
}
