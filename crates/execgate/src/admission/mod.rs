//! Admission control for execgate
//!
//! Gates execution requests before they reach a sandbox: a per-identity
//! in-flight cap, a bounded FIFO queue drained by a fixed worker pool, and a
//! counting permit set held for the duration of each run.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, instrument, warn};

pub use crate::admission::inflight::{InFlightGuard, InFlightRegistry};
pub use crate::admission::pool::WorkerPool;

mod inflight;
mod pool;

use crate::admission::pool::Job;
use crate::config::{ConcurrencyConfig, Language};
use crate::runner::{Sandbox, SandboxError};
use crate::types::{ExecutionResult, Identity};

/// Which capacity gate rejected a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// The queue stayed full for the whole submit timeout
    Submit,
    /// No run permit became free within the permit timeout
    Permits,
}

impl BusyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusyReason::Submit => "submit",
            BusyReason::Permits => "permits",
        }
    }
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`Dispatcher::submit`]
///
/// `TooManyInFlight` and `SystemBusy` are rejections: the sandbox was never
/// started. The remaining variants mean the sandbox itself failed.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("too many in-flight executions for {identity} (limit {limit})")]
    TooManyInFlight { identity: Identity, limit: usize },

    #[error("system busy: {reason} (queue size {queue_size}, max concurrent {max_concurrent})")]
    SystemBusy {
        reason: BusyReason,
        queue_size: usize,
        max_concurrent: usize,
    },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

impl SubmitError {
    /// Whether the request was turned away before any sandbox started
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SubmitError::TooManyInFlight { .. } | SubmitError::SystemBusy { .. }
        )
    }

    /// Suggested back-off for rejections, in seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SubmitError::TooManyInFlight { .. } => Some(2),
            SubmitError::SystemBusy { .. } => Some(1),
            _ => None,
        }
    }
}

/// Admission controller in front of a sandbox
#[derive(Debug)]
pub struct Dispatcher {
    pool: WorkerPool,
    in_flight: Arc<InFlightRegistry>,
    config: ConcurrencyConfig,
}

impl Dispatcher {
    /// Create a dispatcher with `max_concurrent` workers and as many permits
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S: Sandbox>(
        sandbox: Arc<S>,
        config: ConcurrencyConfig,
        in_flight: Arc<InFlightRegistry>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self::with_permits(sandbox, config, in_flight, permits)
    }

    /// Create a dispatcher drawing run permits from an existing semaphore
    pub fn with_permits<S: Sandbox>(
        sandbox: Arc<S>,
        config: ConcurrencyConfig,
        in_flight: Arc<InFlightRegistry>,
        permits: Arc<Semaphore>,
    ) -> Self {
        let pool = WorkerPool::start(
            sandbox,
            config.max_concurrent,
            config.queue_capacity,
            permits,
            config.permit_timeout(),
        );
        Self {
            pool,
            in_flight,
            config,
        }
    }

    /// Run a submission through admission and wait for its result
    ///
    /// The in-flight slot for `identity` is held until the sandbox run ends.
    /// Dropping this future does not release it early; a job that never got
    /// dispatched releases it when the worker discards the job.
    #[instrument(skip(self, language, source, stdin), fields(identity = %identity.key()))]
    pub async fn submit(
        &self,
        identity: &Identity,
        language: Arc<Language>,
        source: String,
        stdin: Option<String>,
    ) -> Result<ExecutionResult, SubmitError> {
        let limit = self.config.per_identity_max_in_flight;
        let Some(slot) = self.in_flight.try_acquire(identity, limit) else {
            warn!(limit, "too many in-flight executions");
            return Err(SubmitError::TooManyInFlight {
                identity: identity.clone(),
                limit,
            });
        };

        let (reply, result) = oneshot::channel();
        let job = Job {
            language,
            source,
            stdin,
            slot,
            reply,
        };

        if let Err(e) = self.pool.enqueue(job, self.config.submit_timeout()).await {
            warn!(error = %e, "submission rejected");
            return Err(e);
        }
        debug!(queue_size = self.pool.queue_size(), "submission queued");

        result
            .await
            .map_err(|_| SubmitError::WorkerFailed("worker dropped the job".to_owned()))?
    }

    /// Jobs currently waiting in the queue
    pub fn queue_size(&self) -> usize {
        self.pool.queue_size()
    }

    /// Run permits not currently held
    pub fn available_permits(&self) -> usize {
        self.pool.available_permits()
    }

    /// In-flight executions for `identity`
    pub fn in_flight(&self, identity: &Identity) -> usize {
        self.in_flight.in_flight(identity)
    }
}
