//! A library for admitting and supervising sandboxed code execution.
//!
//! Execgate sits between callers that submit untrusted source code and a
//! docker daemon that runs it. Every submission passes an admission
//! controller before a throwaway container is started for it.
//!
//! # Features
//!
//! - **Per-identity fairness**: caps how many executions one caller may have in flight.
//! - **Bounded queue**: FIFO queue drained by a fixed worker pool, with a submit timeout.
//! - **Run permits**: a counting semaphore bounds the sandboxes alive at once.
//! - **Docker sandbox**: no network, read-only root, tmpfs workdir, dropped capabilities.
//! - **Supervision**: host-side cutoff, forced container removal, deadlock-free output draining.
//! - **TOML configuration**: per-language images and commands, environment overrides.

pub use admission::{BusyReason, Dispatcher, InFlightRegistry, SubmitError};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{DockerRunner, Sandbox, SandboxError};
pub use service::{ExecuteError, ExecutionService, ResultConsumer, TracingConsumer};
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Identity, SandboxLimits};

pub mod admission;
pub mod config;
pub mod docker;
pub mod runner;
pub mod service;
pub mod types;
