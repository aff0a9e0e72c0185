//! Oracle configuration.
//!
//! Values are layered: built-in defaults, then the `[oracle]` and
//! `[upstream]` tables of `config/default.toml`, then environment variables.
//! A missing file or table silently keeps the defaults; a file that exists
//! but does not parse is an error.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};
use crate::policy::{DEFAULT_SHORT_QUESTION_WORDS, DEFAULT_UPSTREAM_PROBABILITY};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Hosted inference endpoint used when nothing else is configured.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api-inference.huggingface.co/models/gpt2";

pub const DEFAULT_UPSTREAM_MODEL: &str = "gpt2";

/// Environment variables holding the upstream credential, in lookup order.
pub const UPSTREAM_KEY_VARS: [&str; 2] = ["HF_API_TOKEN", "UPSTREAM_API_KEY"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Wire format spoken by the upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpstreamApi {
    /// Hugging Face Inference API (`{"inputs": ...}` → `[{"generated_text"}]`).
    #[default]
    #[serde(rename = "huggingface")]
    HuggingFace,
    /// OpenAI-compatible Chat Completions.
    #[serde(rename = "openai-chat")]
    OpenAiChat,
}

impl FromStr for UpstreamApi {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai-chat" | "openai" => Ok(Self::OpenAiChat),
            other => Err(OracleError::Config {
                reason: format!("unknown upstream api `{other}`"),
            }),
        }
    }
}

/// `[oracle]` table: mediator behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorSettings {
    /// Minimum seconds between two accepted requests from one user.
    pub cooldown_secs: u64,
    /// Upper bound for one upstream call.
    pub upstream_timeout_secs: u64,
    /// Questions with at most this many words count as short.
    pub short_question_words: usize,
    /// Chance that a short question is still sent upstream.
    pub upstream_probability: f64,
}

impl Default for MediatorSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            upstream_timeout_secs: 30,
            short_question_words: DEFAULT_SHORT_QUESTION_WORDS,
            upstream_probability: DEFAULT_UPSTREAM_PROBABILITY,
        }
    }
}

/// `[upstream]` table: provider endpoint and generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub api: UpstreamApi,
    pub endpoint: String,
    pub model: String,
    /// Word limit quoted to the model in the prompt template.
    pub max_words: usize,
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Answers shorter than this (in characters) count as empty.
    pub min_answer_chars: usize,
    /// Bearer credential.  Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            api: UpstreamApi::HuggingFace,
            endpoint: DEFAULT_UPSTREAM_URL.to_owned(),
            model: DEFAULT_UPSTREAM_MODEL.to_owned(),
            max_words: 15,
            max_output_tokens: 60,
            temperature: 0.7,
            min_answer_chars: 4,
            api_key: None,
        }
    }
}

/// Complete oracle configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub oracle: MediatorSettings,
    pub upstream: UpstreamSettings,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl OracleConfig {
    /// Load from `path`, falling back to defaults if the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| OracleError::Config {
            reason: format!("{}: {e}", path.display()),
        })?;

        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from `path`, overlay the process environment, and validate.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.  Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = UPSTREAM_KEY_VARS.iter().find_map(|name| get(*name)) {
            self.upstream.api_key = Some(key);
        }
        if let Some(url) = get("UPSTREAM_URL") {
            self.upstream.endpoint = url;
        }
        if let Some(model) = get("UPSTREAM_MODEL") {
            self.upstream.model = model;
        }
        if let Some(api) = get("UPSTREAM_API") {
            match api.parse() {
                Ok(api) => self.upstream.api = api,
                Err(e) => tracing::warn!(error = %e, "ignoring UPSTREAM_API"),
            }
        }
    }

    /// Reject values that would make the mediator misbehave.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upstream.endpoint).map_err(|e| OracleError::Config {
            reason: format!("invalid upstream endpoint `{}`: {e}", self.upstream.endpoint),
        })?;

        if self.oracle.upstream_timeout_secs == 0 {
            return Err(OracleError::Config {
                reason: "upstream_timeout_secs must be positive".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.oracle.upstream_probability) {
            return Err(OracleError::Config {
                reason: format!(
                    "upstream_probability must be within [0, 1], got {}",
                    self.oracle.upstream_probability
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.upstream.temperature) {
            return Err(OracleError::Config {
                reason: format!(
                    "temperature must be within [0, 1], got {}",
                    self.upstream.temperature
                ),
            });
        }
        Ok(())
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.oracle.cooldown_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.upstream_timeout_secs)
    }

    /// Whether an upstream credential is available.
    pub fn upstream_configured(&self) -> bool {
        self.upstream.api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_observed_values() {
        let config = OracleConfig::default();
        assert_eq!(config.cooldown_window(), Duration::from_secs(10));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(config.oracle.short_question_words, 7);
        assert_eq!(config.upstream.min_answer_chars, 4);
        assert_eq!(config.upstream.api, UpstreamApi::HuggingFace);
        assert!(!config.upstream_configured());
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = OracleConfig::load(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, OracleConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[oracle]\ncooldown_secs = 20\n\n[upstream]\napi = \"openai-chat\"\nmodel = \"llama\"\n"
        )
        .unwrap();

        let config = OracleConfig::load(file.path()).unwrap();
        assert_eq!(config.oracle.cooldown_secs, 20);
        assert_eq!(config.oracle.upstream_timeout_secs, 30);
        assert_eq!(config.upstream.api, UpstreamApi::OpenAiChat);
        assert_eq!(config.upstream.model, "llama");
        assert_eq!(config.upstream.endpoint, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[oracle\ncooldown_secs = ").unwrap();
        let err = OracleConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, OracleError::Config { .. }));
    }

    #[test]
    fn env_overlays_credential_and_endpoint() {
        let mut config = OracleConfig::default();
        config.apply_env(env(&[
            ("HF_API_TOKEN", "hf_secret"),
            ("UPSTREAM_URL", "http://localhost:9000/generate"),
            ("UPSTREAM_API", "openai"),
        ]));
        assert_eq!(config.upstream.api_key.as_deref(), Some("hf_secret"));
        assert_eq!(config.upstream.endpoint, "http://localhost:9000/generate");
        assert_eq!(config.upstream.api, UpstreamApi::OpenAiChat);
        assert!(config.upstream_configured());
    }

    #[test]
    fn empty_credential_means_unconfigured() {
        let mut config = OracleConfig::default();
        config.apply_env(env(&[("HF_API_TOKEN", "  ")]));
        assert!(!config.upstream_configured());

        config.apply_env(env(&[("UPSTREAM_API_KEY", "alt")]));
        assert_eq!(config.upstream.api_key.as_deref(), Some("alt"));
    }

    #[test]
    fn unknown_api_is_ignored() {
        let mut config = OracleConfig::default();
        config.apply_env(env(&[("UPSTREAM_API", "carrier-pigeon")]));
        assert_eq!(config.upstream.api, UpstreamApi::HuggingFace);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = OracleConfig::default();
        config.upstream.endpoint = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.oracle.upstream_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.upstream.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.oracle.upstream_probability = -0.1;
        assert!(config.validate().is_err());
    }
}
