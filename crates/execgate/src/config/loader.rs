//! Configuration file loading for execgate
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, is_valid_language_code};

impl Config {
    /// Load configuration from a file, with `EXECGATE__*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the embedded example configuration with environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(super::EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let concurrency = &self.concurrency;
        if concurrency.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.max_concurrent must be at least 1".to_owned(),
            ));
        }
        // A bounded channel cannot have zero slots
        if concurrency.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.queue_capacity must be at least 1".to_owned(),
            ));
        }
        if concurrency.per_identity_max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.per_identity_max_in_flight must be at least 1".to_owned(),
            ));
        }

        let sandbox = &self.sandbox;
        if sandbox.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.timeout_seconds must be at least 1".to_owned(),
            ));
        }
        if sandbox.overall_timeout_seconds < sandbox.timeout_seconds {
            return Err(ConfigError::Invalid(format!(
                "sandbox.overall_timeout_seconds ({}) must not be below sandbox.timeout_seconds ({})",
                sandbox.overall_timeout_seconds, sandbox.timeout_seconds
            )));
        }
        if sandbox.cpus.is_nan() || sandbox.cpus <= 0.0 {
            return Err(ConfigError::Invalid(
                "sandbox.cpus must be positive".to_owned(),
            ));
        }
        if sandbox.memory.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sandbox.memory must not be empty".to_owned(),
            ));
        }
        if !is_unprivileged_user(&sandbox.user) {
            return Err(ConfigError::Invalid(format!(
                "sandbox.user '{}' must be a numeric non-root uid:gid",
                sandbox.user
            )));
        }

        for (code, lang) in &self.languages {
            if !is_valid_language_code(code) {
                return Err(ConfigError::Invalid(format!(
                    "language code '{code}' must be 2-16 lowercase letters"
                )));
            }
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{code}' has empty name"
                )));
            }
            if lang.image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{code}' has empty image"
                )));
            }
            if lang.run.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{code}' has empty run command"
                )));
            }
        }

        Ok(())
    }
}

/// Accept only numeric, non-zero `uid` or `uid:gid`
///
/// Names are rejected because the image decides what they resolve to.
fn is_unprivileged_user(user: &str) -> bool {
    let (uid, gid) = user.split_once(':').unwrap_or((user, user));
    [uid, gid].iter().all(|id| {
        !id.is_empty()
            && id.bytes().all(|b| b.is_ascii_digit())
            && id.parse::<u32>().is_ok_and(|n| n != 0)
    })
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
