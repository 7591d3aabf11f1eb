use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::invoker::InvokerConfig;

/// Application-level constants
pub const APP_NAME: &str = "Remap";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "remap_pt=info,warn"
}

/// Root data directory: `$REMAP_DATA_DIR` if set, else ~/Remap/.
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REMAP_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Append-only journal of stage inputs/outputs (audit + offline training).
pub fn journal_path() -> PathBuf {
    app_data_dir()
        .join("data")
        .join("raw")
        .join("stage_responses.jsonl")
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Temperature must be within 0.0-1.0, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "llama3.1:8b",
            Self::OpenAi => "gpt-4",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER",
                value: s.to_string(),
            }),
        }
    }
}

const DEFAULT_MAX_TOKENS: u32 = 1500;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Model settings, externally supplied through environment variables.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl ModelSettings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider: Provider = match get("LLM_PROVIDER") {
            Some(v) => v.parse()?,
            None => Provider::Ollama,
        };

        let settings = Self {
            provider,
            model: get("LLM_MODEL_NAME").unwrap_or_else(|| provider.default_model().to_string()),
            base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            api_key: get("OPENAI_API_KEY"),
            max_tokens: parse_or("MAX_TOKENS", get("MAX_TOKENS"), DEFAULT_MAX_TOKENS)?,
            temperature: parse_or("TEMPERATURE", get("TEMPERATURE"), DEFAULT_TEMPERATURE)?,
            timeout: Duration::from_secs(parse_or(
                "LLM_TIMEOUT_SECS",
                get("LLM_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            retries: parse_or("LLM_RETRIES", get("LLM_RETRIES"), DEFAULT_RETRIES)?,
            retry_backoff: Duration::from_millis(parse_or(
                "LLM_RETRY_BACKOFF_MS",
                get("LLM_RETRY_BACKOFF_MS"),
                DEFAULT_RETRY_BACKOFF_MS,
            )?),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_TOKENS",
                value: "0".into(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "LLM_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        if self.provider == Provider::OpenAi && self.api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }
        Ok(())
    }

    /// The retry/timeout policy handed to the model invoker.
    pub fn invoker_config(&self) -> InvokerConfig {
        InvokerConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            retries: self.retries,
            retry_backoff: self.retry_backoff,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<ModelSettings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ModelSettings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_target_local_ollama() {
        let s = settings_from(&[]).unwrap();
        assert_eq!(s.provider, Provider::Ollama);
        assert_eq!(s.base_url, "http://localhost:11434");
        assert_eq!(s.max_tokens, 1500);
        assert!((s.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(s.timeout, Duration::from_secs(60));
        assert_eq!(s.retries, 2);
        assert_eq!(s.retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn openai_requires_api_key() {
        let err = settings_from(&[("LLM_PROVIDER", "openai")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY"));
    }

    #[test]
    fn openai_with_key_uses_openai_defaults() {
        let s = settings_from(&[("LLM_PROVIDER", "OpenAI"), ("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(s.provider, Provider::OpenAi);
        assert_eq!(s.model, "gpt-4");
        assert_eq!(s.base_url, "https://api.openai.com");
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = settings_from(&[("TEMPERATURE", "1.5")]).unwrap_err();
        assert!(matches!(err, ConfigError::TemperatureOutOfRange(_)));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = settings_from(&[("LLM_RETRIES", "many")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "LLM_RETRIES",
                value: "many".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(settings_from(&[("LLM_PROVIDER", "carrier-pigeon")]).is_err());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = settings_from(&[("LLM_MODEL_NAME", "  "), ("MAX_TOKENS", "")]).unwrap();
        assert_eq!(s.model, "llama3.1:8b");
        assert_eq!(s.max_tokens, 1500);
    }

    #[test]
    fn invoker_config_mirrors_settings() {
        let s = settings_from(&[("LLM_MODEL_NAME", "medllama"), ("LLM_RETRIES", "4")]).unwrap();
        let cfg = s.invoker_config();
        assert_eq!(cfg.model, "medllama");
        assert_eq!(cfg.retries, 4);
        assert_eq!(cfg.max_tokens, 1500);
    }

    #[test]
    fn journal_path_is_jsonl() {
        let path = journal_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
