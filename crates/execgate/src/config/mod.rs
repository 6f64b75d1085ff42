use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{FileName, Language, is_valid_language_code};
use crate::types::SandboxLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../execgate.example.toml");

/// Prefix of environment variables overriding file configuration
/// (e.g. `EXECGATE__CONCURRENCY__MAX_CONCURRENT=8`).
pub const ENV_PREFIX: &str = "EXECGATE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("language '{0}' is disabled")]
    LanguageDisabled(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sizing of the admission controller
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    /// Worker count and permit count
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Bounded pending-task queue size
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum wait to enqueue before rejecting
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Maximum wait for a run permit before rejecting
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,

    /// Fairness cap on concurrent executions per identity
    #[serde(default = "default_per_identity_max_in_flight")]
    pub per_identity_max_in_flight: usize,
}

impl ConcurrencyConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn permit_timeout(&self) -> Duration {
        Duration::from_millis(self.permit_timeout_ms)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
            submit_timeout_ms: default_submit_timeout_ms(),
            permit_timeout_ms: default_permit_timeout_ms(),
            per_identity_max_in_flight: default_per_identity_max_in_flight(),
        }
    }
}

fn default_max_concurrent() -> usize {
    6
}

fn default_queue_capacity() -> usize {
    20
}

fn default_submit_timeout_ms() -> u64 {
    150
}

fn default_permit_timeout_ms() -> u64 {
    200
}

fn default_per_identity_max_in_flight() -> usize {
    2
}

/// Size bounds on accepted requests
#[derive(Debug, Clone, Deserialize)]
pub struct RequestLimits {
    /// Maximum source length in characters
    #[serde(default = "default_max_source_len")]
    pub max_source_len: usize,

    /// Maximum stdin length in characters
    #[serde(default = "default_max_stdin_len")]
    pub max_stdin_len: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_source_len: default_max_source_len(),
            max_stdin_len: default_max_stdin_len(),
        }
    }
}

fn default_max_source_len() -> usize {
    20_000
}

fn default_max_stdin_len() -> usize {
    10_000
}

/// Config for execgate
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the docker binary (uses PATH if not specified).
    #[serde(default)]
    pub docker_path: Option<PathBuf>,

    /// Resource limits applied to every sandboxed run
    #[serde(default)]
    pub sandbox: SandboxLimits,

    /// Admission controller sizing
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Request size bounds
    #[serde(default)]
    pub request: RequestLimits,

    /// Language descriptors keyed by language code
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with the embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_path: None,
            sandbox: SandboxLimits::default(),
            concurrency: ConcurrencyConfig::default(),
            request: RequestLimits::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by code, whether or not it is enabled
    pub fn get_language(&self, code: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(code)
            .ok_or_else(|| ConfigError::LanguageNotFound(code.to_string()))
    }

    /// Get a language by code, rejecting disabled languages
    pub fn enabled_language(&self, code: &str) -> Result<&Language, ConfigError> {
        let language = self.get_language(code)?;
        if !language.enabled {
            return Err(ConfigError::LanguageDisabled(code.to_string()));
        }
        Ok(language)
    }

    /// Enabled languages with their codes, ordered by display name
    pub fn enabled_languages(&self) -> Vec<(&str, &Language)> {
        let mut languages: Vec<_> = self
            .languages
            .iter()
            .filter(|(_, lang)| lang.enabled)
            .map(|(code, lang)| (code.as_str(), lang))
            .collect();
        languages.sort_by(|a, b| a.1.name.cmp(&b.1.name).then(a.0.cmp(b.0)));
        languages
    }

    /// Get the path to the docker binary
    pub fn docker_binary(&self) -> PathBuf {
        self.docker_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
