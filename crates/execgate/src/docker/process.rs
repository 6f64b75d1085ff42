//! Process spawning and supervision for docker runs
//!
//! Spawns the docker client, drains both output streams concurrently,
//! enforces the host-side cutoff and collects output within a grace period.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::docker::{DockerError, remove_container};

const READ_CHUNK: usize = 8192;

/// Host-side bounds on one docker invocation
#[derive(Debug, Clone)]
pub struct Supervision {
    /// Docker binary, used for the forced removal
    pub docker_path: PathBuf,

    /// Overall cutoff for the whole invocation
    pub overall_timeout: Duration,

    /// How long the readers get once the wait has resolved
    pub output_grace: Duration,

    /// Per-stream capture limit in bytes
    pub max_output_bytes: usize,

    /// Bound on the forced removal and the reap after kill
    pub remove_timeout: Duration,
}

/// What happened to a supervised process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code if the process exited on its own
    pub exit_code: Option<i32>,

    /// Whether the overall cutoff fired
    pub timed_out: bool,

    /// Captured standard output
    pub stdout: Vec<u8>,

    /// Captured standard error
    pub stderr: Vec<u8>,

    /// Wall clock time from spawn to resolution
    pub elapsed: Duration,
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Run a docker command under host-side supervision
///
/// On cutoff the container named `container` is force-removed and the local
/// client process force-killed. Output gathered by either reader before the
/// grace period ends is kept even on timeout.
#[instrument(skip(args, supervision), fields(timeout = ?supervision.overall_timeout))]
pub async fn run_supervised(
    args: Vec<String>,
    container: &str,
    supervision: &Supervision,
) -> Result<ProcessOutput, DockerError> {
    let program = args
        .first()
        .ok_or_else(|| DockerError::CommandFailed("empty command arguments".to_string()))?;

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(DockerError::SpawnFailed)?;

    let limit = supervision.max_output_bytes;
    let (stdout_buf, stdout_reader) = spawn_reader(child.stdout.take(), limit);
    let (stderr_buf, stderr_reader) = spawn_reader(child.stderr.take(), limit);

    let waited = tokio::time::timeout(supervision.overall_timeout, child.wait()).await;

    let (exit_code, timed_out) = match waited {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            let _ = child.start_kill();
            remove_container(&supervision.docker_path, container, supervision.remove_timeout)
                .await;
            stdout_reader.abort();
            stderr_reader.abort();
            return Err(DockerError::WaitFailed(e));
        }
        Err(_) => {
            warn!(container, "overall cutoff elapsed, removing container");
            remove_container(&supervision.docker_path, container, supervision.remove_timeout)
                .await;
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "kill after cutoff failed (already exited?)");
            }
            if tokio::time::timeout(supervision.remove_timeout, child.wait())
                .await
                .is_err()
            {
                warn!(container, "docker client did not exit after kill");
            }
            (None, true)
        }
    };

    let elapsed = started.elapsed();

    let deadline = Instant::now() + supervision.output_grace;
    let stdout = collect(stdout_buf, stdout_reader, deadline).await;
    let stderr = collect(stderr_buf, stderr_reader, deadline).await;

    debug!(
        ?exit_code,
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "docker process resolved"
    );

    Ok(ProcessOutput {
        exit_code,
        timed_out,
        stdout,
        stderr,
        elapsed,
    })
}

/// Drain a stream into a shared buffer, keeping at most `limit` bytes
///
/// The reader keeps consuming past the limit so the child never blocks on a
/// full pipe.
fn spawn_reader<R>(stream: Option<R>, limit: usize) -> (SharedBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);

    let handle = tokio::spawn(async move {
        let Some(mut stream) = stream else {
            return;
        };
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut buf = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    let room = limit.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..n.min(room)]);
                }
                Err(e) => {
                    debug!(error = %e, "output reader stopped");
                    break;
                }
            }
        }
    });

    (buffer, handle)
}

/// Give a reader until `deadline` to finish, then take what it has
async fn collect(buffer: SharedBuffer, mut reader: JoinHandle<()>, deadline: Instant) -> Vec<u8> {
    if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
        debug!("output reader still busy after grace period, abandoning it");
        reader.abort();
    }
    let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *buf)
}
