//! Sandbox runner for execgate
//!
//! Runs one submission in a throwaway container and classifies the outcome.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::{Config, Language};
use crate::docker::{
    CODE_ENV, COMPILE_FAILURE_EXIT_CODE, DockerCommand, DockerError, RUN_TIMEOUT_EXIT_CODE,
    STDIN_ENV, SandboxScript, Supervision, run_supervised,
};
use crate::types::{ExecutionResult, ExecutionStatus, SandboxLimits};

/// Prefix of every container name created by the runner
pub const CONTAINER_PREFIX: &str = "execgate-run-";

/// Errors that prevent a sandbox from being constructed or launched
///
/// Compile errors, runtime errors and timeouts are not errors; they are
/// [`ExecutionResult`] statuses.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("docker error: {0}")]
    Docker(#[from] DockerError),
}

/// Executes one submission in isolation
pub trait Sandbox: Send + Sync + 'static {
    /// Run `source` for `language`, feeding it `stdin` when present
    fn run(
        &self,
        language: &Language,
        source: &str,
        stdin: Option<&str>,
    ) -> impl Future<Output = Result<ExecutionResult, SandboxError>> + Send;
}

/// Sandbox backed by `docker run`
#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker_path: PathBuf,
    limits: SandboxLimits,
}

impl DockerRunner {
    /// Create a runner using the docker binary and limits from `config`
    pub fn new(config: &Config) -> Self {
        Self {
            docker_path: config.docker_binary(),
            limits: config.sandbox.clone(),
        }
    }

    /// Create a runner with explicit docker binary and limits
    pub fn with_limits(docker_path: impl Into<PathBuf>, limits: SandboxLimits) -> Self {
        Self {
            docker_path: docker_path.into(),
            limits,
        }
    }

    fn supervision(&self) -> Supervision {
        Supervision {
            docker_path: self.docker_path.clone(),
            overall_timeout: Duration::from_secs(self.limits.overall_timeout_seconds),
            output_grace: Duration::from_millis(self.limits.output_grace_ms),
            max_output_bytes: self.limits.max_output_bytes,
            remove_timeout: Duration::from_millis(self.limits.remove_timeout_ms),
        }
    }

    /// Build the full `docker run` argument list for one submission
    fn build_command(
        &self,
        container: &str,
        language: &Language,
        source: &str,
        stdin: Option<&str>,
    ) -> Vec<String> {
        let script = SandboxScript::new(
            language.file_name.as_str(),
            &language.run,
            self.limits.timeout_seconds,
        )
        .compile(language.compile_command())
        .build();

        let mut command = DockerCommand::new(&self.docker_path, container, &language.image)
            .limits(self.limits.clone())
            .env(CODE_ENV, STANDARD.encode(source.as_bytes()));

        // Empty stdin means no stdin stream at all
        if let Some(stdin) = stdin.filter(|s| !s.is_empty()) {
            command = command.env(STDIN_ENV, STANDARD.encode(stdin.as_bytes()));
        }

        command.command(["sh", "-c", script.as_str()]).build()
    }
}

impl Sandbox for DockerRunner {
    #[instrument(skip(self, language, source, stdin), fields(image = %language.image))]
    async fn run(
        &self,
        language: &Language,
        source: &str,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult, SandboxError> {
        let container = format!("{CONTAINER_PREFIX}{}", Uuid::new_v4().simple());
        let args = self.build_command(&container, language, source, stdin);

        debug!(%container, compiled = language.is_compiled(), "starting sandbox");

        let output = run_supervised(args, &container, &self.supervision()).await?;
        let status = classify(output.exit_code, output.timed_out);

        debug!(%container, %status, exit_code = ?output.exit_code, "sandbox finished");

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status,
            exec_time_ms: u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Map a process outcome to a status
///
/// `exit_code` is `None` when the process was killed by a signal.
pub fn classify(exit_code: Option<i32>, timed_out: bool) -> ExecutionStatus {
    if timed_out {
        return ExecutionStatus::Timeout;
    }
    match exit_code {
        Some(0) => ExecutionStatus::Success,
        Some(COMPILE_FAILURE_EXIT_CODE) => ExecutionStatus::CompileError,
        Some(RUN_TIMEOUT_EXIT_CODE) => ExecutionStatus::Timeout,
        _ => ExecutionStatus::RuntimeError,
    }
}
