use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-run resource limits applied to every sandboxed container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// In-sandbox timeout for the run command, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Host-side cutoff for the whole invocation (compile + run), in seconds
    #[serde(default = "default_overall_timeout_seconds")]
    pub overall_timeout_seconds: u64,

    /// Memory limit in docker notation (e.g. "256m")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CPU share (fractional number of CPUs)
    #[serde(default = "default_cpus")]
    pub cpus: f64,

    /// Maximum number of processes/threads inside the container
    #[serde(default = "default_pids_limit")]
    pub pids_limit: u32,

    /// Size of the writable scratch directory in megabytes
    #[serde(default = "default_tmpfs_size_mb")]
    pub tmpfs_size_mb: u32,

    /// Unprivileged `uid:gid` the submission runs as
    #[serde(default = "default_user")]
    pub user: String,

    /// How long to wait for the output readers once the process has exited
    #[serde(default = "default_output_grace_ms")]
    pub output_grace_ms: u64,

    /// Maximum bytes captured per stream; the rest is drained and dropped
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Upper bound on the forced `docker rm -f` after a timeout
    #[serde(default = "default_remove_timeout_ms")]
    pub remove_timeout_ms: u64,
}

impl SandboxLimits {
    /// Create limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-sandbox run timeout in seconds
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set the host-side overall cutoff in seconds
    pub fn with_overall_timeout_seconds(mut self, seconds: u64) -> Self {
        self.overall_timeout_seconds = seconds;
        self
    }

    /// Set the memory limit (docker notation)
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// Set the CPU share
    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = cpus;
        self
    }

    /// Set the process count limit
    pub fn with_pids_limit(mut self, pids: u32) -> Self {
        self.pids_limit = pids;
        self
    }

    /// Set the per-stream capture limit in bytes
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Set the output collection grace period in milliseconds
    pub fn with_output_grace_ms(mut self, ms: u64) -> Self {
        self.output_grace_ms = ms;
        self
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            overall_timeout_seconds: default_overall_timeout_seconds(),
            memory: default_memory(),
            cpus: default_cpus(),
            pids_limit: default_pids_limit(),
            tmpfs_size_mb: default_tmpfs_size_mb(),
            user: default_user(),
            output_grace_ms: default_output_grace_ms(),
            max_output_bytes: default_max_output_bytes(),
            remove_timeout_ms: default_remove_timeout_ms(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    5
}

fn default_overall_timeout_seconds() -> u64 {
    12
}

fn default_memory() -> String {
    "256m".to_owned()
}

fn default_cpus() -> f64 {
    0.5
}

fn default_pids_limit() -> u32 {
    128
}

fn default_tmpfs_size_mb() -> u32 {
    64
}

fn default_user() -> String {
    "10001:10001".to_owned()
}

fn default_output_grace_ms() -> u64 {
    200
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_remove_timeout_ms() -> u64 {
    2000
}

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Program exited with code 0
    Success,

    /// The compile command failed; the run command never started
    CompileError,

    /// Program exited with a non-zero code or was killed by a signal
    RuntimeError,

    /// The in-sandbox timeout fired or the host-side cutoff elapsed
    Timeout,

    /// The sandbox could not be constructed or launched
    InternalError,
}

impl ExecutionStatus {
    /// Name used in logs and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::CompileError => "COMPILE_ERROR",
            ExecutionStatus::RuntimeError => "RUNTIME_ERROR",
            ExecutionStatus::Timeout => "TIMEOUT",
            ExecutionStatus::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output (compiler output on compile errors)
    pub stdout: String,

    /// Captured standard error (compiler diagnostics on compile errors)
    pub stderr: String,

    /// Classified outcome
    pub status: ExecutionStatus,

    /// Wall clock time of the whole invocation in milliseconds
    pub exec_time_ms: u64,
}

impl ExecutionResult {
    /// Generic result reported when the sandbox itself failed
    ///
    /// Carries no detail about the underlying failure.
    pub fn internal_error() -> Self {
        Self {
            stdout: String::new(),
            stderr: "internal error".to_owned(),
            status: ExecutionStatus::InternalError,
            exec_time_ms: 0,
        }
    }

    /// Check if the program ran to completion with exit code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Request to execute a piece of source code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language code (a key of the language table)
    pub language: String,

    /// Source code
    pub source: String,

    /// Optional standard input
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            stdin: None,
        }
    }

    /// Attach standard input to the request
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Key used for per-caller fairness accounting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An authenticated user
    User(String),

    /// Every unauthenticated caller shares this identity
    Anonymous,
}

impl Identity {
    /// Key under which in-flight executions are counted
    pub fn key(&self) -> String {
        match self {
            Identity::User(id) => format!("u:{id}"),
            Identity::Anonymous => "u:anon".to_owned(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user {id}"),
            Identity::Anonymous => f.write_str("anonymous"),
        }
    }
}
