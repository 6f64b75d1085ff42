//! Execution service
//!
//! Front door for callers: validates a request, resolves its language,
//! pushes it through admission and turns sandbox failures into the generic
//! internal-error result.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::admission::{Dispatcher, InFlightRegistry, SubmitError};
use crate::config::{Config, RequestLimits, is_valid_language_code};
use crate::runner::{DockerRunner, Sandbox};
use crate::types::{ExecutionRequest, ExecutionResult, Identity};

/// Errors returned by [`ExecutionService::execute`]
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Rejected(#[from] SubmitError),
}

impl ExecuteError {
    /// Suggested back-off for admission rejections, in seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ExecuteError::Rejected(e) => e.retry_after_secs(),
            _ => None,
        }
    }
}

impl ExecutionRequest {
    /// Check the request against size bounds and the language code format
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), ExecuteError> {
        if !is_valid_language_code(&self.language) {
            return Err(ExecuteError::InvalidRequest(format!(
                "invalid language code '{}'",
                self.language
            )));
        }
        if self.source.trim().is_empty() {
            return Err(ExecuteError::InvalidRequest("source is empty".to_owned()));
        }
        let source_len = self.source.chars().count();
        if source_len > limits.max_source_len {
            return Err(ExecuteError::InvalidRequest(format!(
                "source is {source_len} characters, limit is {}",
                limits.max_source_len
            )));
        }
        if let Some(stdin) = &self.stdin {
            let stdin_len = stdin.chars().count();
            if stdin_len > limits.max_stdin_len {
                return Err(ExecuteError::InvalidRequest(format!(
                    "stdin is {stdin_len} characters, limit is {}",
                    limits.max_stdin_len
                )));
            }
        }
        Ok(())
    }
}

/// Receives the outcome of every request handled by the service
pub trait ResultConsumer: Send + Sync {
    /// Called once a sandbox run produced a result
    fn on_result(&self, identity: &Identity, language: &str, result: &ExecutionResult);

    /// Called when admission turned a request away
    fn on_rejection(&self, identity: &Identity, language: &str, error: &SubmitError);
}

/// Consumer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsumer;

impl ResultConsumer for TracingConsumer {
    fn on_result(&self, identity: &Identity, language: &str, result: &ExecutionResult) {
        info!(
            identity = %identity.key(),
            language,
            status = %result.status,
            exec_time_ms = result.exec_time_ms,
            "execution finished"
        );
    }

    fn on_rejection(&self, identity: &Identity, language: &str, error: &SubmitError) {
        warn!(identity = %identity.key(), language, error = %error, "execution rejected");
    }
}

/// Validates, admits and runs execution requests
pub struct ExecutionService {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    consumer: Arc<dyn ResultConsumer>,
}

impl ExecutionService {
    /// Create a service backed by docker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let runner = Arc::new(DockerRunner::new(&config));
        Self::with_sandbox(config, runner)
    }

    /// Create a service backed by an arbitrary sandbox
    pub fn with_sandbox<S: Sandbox>(config: Config, sandbox: Arc<S>) -> Self {
        let dispatcher = Dispatcher::new(
            sandbox,
            config.concurrency.clone(),
            Arc::new(InFlightRegistry::new()),
        );
        Self {
            config: Arc::new(config),
            dispatcher,
            consumer: Arc::new(TracingConsumer),
        }
    }

    /// Replace the result consumer
    pub fn with_consumer(mut self, consumer: Arc<dyn ResultConsumer>) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute one request on behalf of `identity`
    ///
    /// Compile errors, runtime errors and timeouts come back as `Ok` results.
    /// A sandbox that could not be run also comes back as `Ok`, with status
    /// `INTERNAL_ERROR` and no detail. `Err` means the request was invalid or
    /// was turned away before any sandbox started.
    #[instrument(skip(self, request), fields(identity = %identity.key(), language = %request.language))]
    pub async fn execute(
        &self,
        identity: &Identity,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        request.validate(&self.config.request)?;

        let language = self
            .config
            .enabled_language(&request.language)
            .map_err(|_| ExecuteError::UnsupportedLanguage(request.language.clone()))?;

        let submitted = self
            .dispatcher
            .submit(
                identity,
                Arc::new(language.clone()),
                request.source.clone(),
                request.stdin.clone(),
            )
            .await;

        let result = match submitted {
            Ok(result) => result,
            Err(e) if e.is_rejection() => {
                self.consumer.on_rejection(identity, &request.language, &e);
                return Err(e.into());
            }
            Err(e) => {
                error!(error = %e, "sandbox failed");
                ExecutionResult::internal_error()
            }
        };

        self.consumer.on_result(identity, &request.language, &result);
        Ok(result)
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
