//! Rate-limited request execution.
//!
//! The executor is the only component that performs network I/O. It absorbs
//! rate limiting (`429`) by sleeping for the server-advised duration and
//! resubmitting the identical request; those waits never count against the
//! transient attempt budget. Timeouts, connection errors and `5xx` responses
//! are retried with exponential backoff until `max_attempts` is exhausted.
//! Every other non-2xx response is permanent and returned immediately.
//!
//! No request is in flight while the executor waits, so a shutdown signal
//! passed to [`RequestExecutor::execute_until_shutdown`] ends any pending wait
//! with [`Error::Cancelled`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::Transport;

/// Executes requests against one instance with retry and rate-limit handling.
#[derive(Clone)]
pub struct RequestExecutor {
    label: String,
    transport: Arc<dyn Transport>,
    config: ExecutorConfig,
}

impl RequestExecutor {
    /// Create an executor. `label` names the instance in log output.
    pub fn new(label: impl Into<String>, transport: Arc<dyn Transport>, config: ExecutorConfig) -> Self {
        Self {
            label: label.into(),
            transport,
            config,
        }
    }

    /// Instance label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Retry policy in use.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a request, returning its 2xx response.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        self.execute_with(request, None).await
    }

    /// Execute a request, giving up on any rate-limit or backoff wait once
    /// `shutdown_rx` fires.
    pub async fn execute_until_shutdown(
        &self,
        request: &ApiRequest,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ApiResponse, Error> {
        self.execute_with(request, Some(shutdown_rx)).await
    }

    async fn execute_with(
        &self,
        request: &ApiRequest,
        mut shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> Result<ApiResponse, Error> {
        let mut failures: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            debug!(
                instance = %self.label,
                method = %request.method,
                path = %request.path,
                "sending request"
            );

            let reason = match self.transport.send(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.is_rate_limited() => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > self.config.max_rate_limit_waits {
                        return Err(self.transient(
                            request,
                            failures + rate_limit_waits,
                            format!("rate limited {} times in a row", rate_limit_waits),
                        ));
                    }
                    let wait = self.config.rate_limit_wait(response.retry_after);
                    warn!(
                        instance = %self.label,
                        path = %request.path,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, pausing before resubmitting"
                    );
                    self.pause(request, wait, shutdown_rx.as_deref_mut()).await?;
                    continue;
                }
                Ok(response) if response.is_server_error() => {
                    rate_limit_waits = 0;
                    format!("server error {}", response.status)
                }
                Ok(response) => {
                    return Err(Error::Permanent {
                        method: request.method.to_string(),
                        path: request.path.clone(),
                        status: response.status,
                        body: response.body,
                    })
                }
                Err(err) => {
                    rate_limit_waits = 0;
                    err.to_string()
                }
            };

            failures += 1;
            if failures >= self.config.max_attempts {
                return Err(self.transient(request, failures, reason));
            }

            let backoff = self.config.backoff_for(failures);
            warn!(
                instance = %self.label,
                path = %request.path,
                attempt = failures,
                backoff_ms = backoff.as_millis() as u64,
                reason = %reason,
                "transient failure, retrying"
            );
            self.pause(request, backoff, shutdown_rx.as_deref_mut()).await?;
        }
    }

    /// Sleep for `duration`, or until shutdown is signalled.
    async fn pause(
        &self,
        request: &ApiRequest,
        duration: Duration,
        shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> Result<(), Error> {
        let Some(rx) = shutdown_rx else {
            tokio::time::sleep(duration).await;
            return Ok(());
        };

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => Ok(()),
            signal = rx.recv() => match signal {
                // Nobody is left to signal; finish the wait.
                Err(RecvError::Closed) => {
                    sleep.await;
                    Ok(())
                }
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    warn!(instance = %self.label, path = %request.path, "shutdown requested while waiting");
                    Err(Error::Cancelled {
                        method: request.method.to_string(),
                        path: request.path.clone(),
                    })
                }
            },
        }
    }

    fn transient(&self, request: &ApiRequest, attempts: u32, reason: String) -> Error {
        Error::Transient {
            method: request.method.to_string(),
            path: request.path.clone(),
            attempts,
            reason,
        }
    }
}
