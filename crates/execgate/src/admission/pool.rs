//! Fixed worker pool draining a bounded FIFO queue
//!
//! Workers are long-lived tokio tasks sharing one receiver. Before running a
//! job a worker must also take a permit from a counting semaphore that is
//! sized independently of the worker count.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::admission::{BusyReason, InFlightGuard, SubmitError};
use crate::config::Language;
use crate::runner::Sandbox;
use crate::types::ExecutionResult;

/// One queued execution and the channel its caller waits on
///
/// The job owns its identity's in-flight slot, so the slot is released when
/// the run ends or the job is discarded, not when the caller stops waiting.
pub(crate) struct Job {
    pub language: Arc<Language>,
    pub source: String,
    pub stdin: Option<String>,
    pub slot: InFlightGuard,
    pub reply: oneshot::Sender<Result<ExecutionResult, SubmitError>>,
}

/// Bounded queue plus a fixed set of workers
#[derive(Debug)]
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    permits: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
    max_concurrent: usize,
}

/// State shared by all workers of one pool
struct WorkerShared<S> {
    receiver: Mutex<mpsc::Receiver<Job>>,
    sandbox: Arc<S>,
    permits: Arc<Semaphore>,
    queue: mpsc::WeakSender<Job>,
    permit_timeout: Duration,
    max_concurrent: usize,
}

impl WorkerPool {
    /// Start `workers` workers over a queue of `queue_capacity` slots
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S: Sandbox>(
        sandbox: Arc<S>,
        workers: usize,
        queue_capacity: usize,
        permits: Arc<Semaphore>,
        permit_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));

        let shared = Arc::new(WorkerShared {
            receiver: Mutex::new(receiver),
            sandbox,
            permits: Arc::clone(&permits),
            queue: sender.downgrade(),
            permit_timeout,
            max_concurrent: workers,
        });

        let workers_handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&shared))))
            .collect();

        debug!(workers, queue_capacity, "worker pool started");

        Self {
            sender,
            permits,
            workers: workers_handles,
            max_concurrent: workers,
        }
    }

    /// Place a job on the queue, waiting at most `timeout` for a free slot
    pub(crate) async fn enqueue(&self, job: Job, timeout: Duration) -> Result<(), SubmitError> {
        match self.sender.send_timeout(job, timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, "enqueue failed");
                Err(SubmitError::SystemBusy {
                    reason: BusyReason::Submit,
                    queue_size: self.queue_size(),
                    max_concurrent: self.max_concurrent,
                })
            }
        }
    }

    /// Jobs waiting in the queue
    pub fn queue_size(&self) -> usize {
        queue_depth(&self.sender)
    }

    /// Run permits not currently held
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

fn queue_depth(sender: &mpsc::Sender<Job>) -> usize {
    sender.max_capacity() - sender.capacity()
}

async fn worker_loop<S: Sandbox>(id: usize, shared: Arc<WorkerShared<S>>) {
    loop {
        let job = {
            let mut receiver = shared.receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            debug!(worker = id, "queue closed, worker exiting");
            break;
        };

        if job.reply.is_closed() {
            debug!(worker = id, "caller went away before dispatch, dropping job");
            continue;
        }

        let permit = match tokio::time::timeout(
            shared.permit_timeout,
            Arc::clone(&shared.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                warn!(worker = id, "no run permit within timeout");
                let _ = job.reply.send(Err(SubmitError::SystemBusy {
                    reason: BusyReason::Permits,
                    queue_size: shared.queue.upgrade().map_or(0, |q| queue_depth(&q)),
                    max_concurrent: shared.max_concurrent,
                }));
                continue;
            }
        };

        let Job {
            language,
            source,
            stdin,
            slot,
            reply,
        } = job;
        let sandbox = Arc::clone(&shared.sandbox);

        // A panicking run must not take the worker down with it. The permit
        // and the in-flight slot move into the task and are released however
        // the task ends, even if the caller has stopped waiting.
        let run = tokio::spawn(async move {
            let _permit = permit;
            let _slot = slot;
            sandbox.run(&language, &source, stdin.as_deref()).await
        });

        let outcome = match run.await {
            Ok(result) => result.map_err(SubmitError::Sandbox),
            Err(e) => {
                error!(worker = id, error = %e, "sandbox run panicked");
                Err(SubmitError::WorkerFailed(e.to_string()))
            }
        };

        if reply.send(outcome).is_err() {
            debug!(worker = id, "caller went away before the result was delivered");
        }
    }
}
