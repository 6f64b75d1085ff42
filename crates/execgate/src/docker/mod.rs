//! Docker CLI wrapper
//!
//! This module drives the `docker` client to run one submission per
//! throwaway container: command building, the in-container script, and
//! supervision of the client process (timeouts, output draining, forced
//! removal).
//!
//! References for the flags used:
//! - https://docs.docker.com/reference/cli/docker/container/run/

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub use crate::docker::command::{DockerCommand, SANDBOX_DIR};
pub use crate::docker::process::{ProcessOutput, Supervision, run_supervised};
pub use crate::docker::script::{CODE_ENV, STDIN_ENV, SandboxScript};

mod command;
mod process;
mod script;

/// Exit code the in-container script uses when the compile command fails
pub const COMPILE_FAILURE_EXIT_CODE: i32 = 88;

/// Exit code of GNU `timeout` when the run command hit the in-sandbox timeout
pub const RUN_TIMEOUT_EXIT_CODE: i32 = 124;

/// Errors that occur while driving the docker client
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to spawn docker process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("failed waiting for docker process: {0}")]
    WaitFailed(#[source] std::io::Error),

    #[error("docker command failed: {0}")]
    CommandFailed(String),
}

/// Force-remove a container by name
///
/// Removing a container that no longer exists is not an error; docker's own
/// "no such container" failure is only logged. Returns whether docker
/// reported success within `timeout`.
pub async fn remove_container(docker_path: &Path, name: &str, timeout: Duration) -> bool {
    let child = Command::new(docker_path)
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            warn!(container = name, error = %e, "failed to spawn docker rm");
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => {
            debug!(container = name, "container removed");
            true
        }
        Ok(Ok(status)) => {
            debug!(container = name, code = ?status.code(), "docker rm reported failure (container already gone?)");
            false
        }
        Ok(Err(e)) => {
            warn!(container = name, error = %e, "failed waiting for docker rm");
            false
        }
        Err(_) => {
            warn!(container = name, ?timeout, "docker rm timed out");
            false
        }
    }
}
