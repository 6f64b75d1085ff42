//! Integration tests for execgate
//!
//! Run with: cargo test -p execgate --features integration-tests
//!
//! Tests that start real containers need a reachable docker daemon and the
//! images named in the default config, so they are marked `#[ignore]`. To
//! include them:
//!    cargo test -p execgate --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;

use execgate::config::Config;

mod admission;
mod config_loading;
mod execution;
mod isolation;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default config with short timeouts so failing runs finish quickly
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.sandbox.timeout_seconds = 2;
    config.sandbox.overall_timeout_seconds = 8;
    config
}
