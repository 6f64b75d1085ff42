use execgate::config::{Config, ConfigError};

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_valid_full_config() {
    let config = load("valid_full.toml").expect("Failed to load config");

    assert_eq!(config.docker_binary().to_str(), Some("/usr/bin/docker"));
    assert_eq!(config.sandbox.timeout_seconds, 3);
    assert_eq!(config.sandbox.overall_timeout_seconds, 8);
    assert_eq!(config.sandbox.memory, "128m");
    assert_eq!(config.sandbox.user, "20000:20000");
    assert_eq!(config.concurrency.max_concurrent, 4);
    assert_eq!(config.concurrency.queue_capacity, 10);
    assert_eq!(config.concurrency.per_identity_max_in_flight, 1);
    assert_eq!(config.request.max_source_len, 5000);

    let cpp = config.get_language("cpp").expect("cpp not found");
    assert!(cpp.is_compiled());
    assert_eq!(cpp.file_name.as_str(), "main.cpp");
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert!(config.languages.contains_key("shell"));
    assert_eq!(config.sandbox.timeout_seconds, 5);
    assert_eq!(config.concurrency.max_concurrent, 6);
    assert_eq!(config.concurrency.queue_capacity, 20);
    assert_eq!(config.concurrency.per_identity_max_in_flight, 2);
}

#[test]
fn test_load_invalid_language_code() {
    assert!(load("invalid_language_code.toml").is_err());
}

#[test]
fn test_load_invalid_empty_run_command() {
    assert!(load("invalid_empty_run_command.toml").is_err());
}

#[test]
fn test_load_invalid_file_name() {
    assert!(load("invalid_file_name.toml").is_err());
}

#[test]
fn test_load_invalid_timeouts() {
    let err = load("invalid_timeouts.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_invalid_root_user() {
    let err = load("invalid_root_user.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_invalid_root_name() {
    let err = load("invalid_root_name.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_invalid_zero_queue() {
    let err = load("invalid_zero_queue.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_load_missing_file() {
    assert!(load("does_not_exist.toml").is_err());
}
