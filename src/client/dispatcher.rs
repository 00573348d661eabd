// SPDX-License-Identifier: MIT OR Apache-2.0

//! The attempt loop.
//!
//! [`RequestDispatcher::dispatch`] runs one command against the candidate
//! hosts of the pool, in order, until a host answers successfully, the request
//! is rejected, or every candidate has failed. There is no sleep between
//! hosts; a flaky host is slowed down only through its widened timeout.

use crate::client::command::{build_request, Command, Credentials};
use crate::client::pool::HostPool;
use crate::client::transport::{RawResponse, Transport, TransportError};
use crate::error::{AttemptError, AttemptFailure, Result, SearchError};
use crate::runtime::{
    Clock, DefaultRetryStrategy, RequestLogger, RetryOutcome, RetryStrategy, SystemClock,
};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default base timeout for read commands.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default base timeout for write commands.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Pull a human readable message out of an error response body.
fn error_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        return parsed.message;
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Runs commands across the hosts of a [`HostPool`].
#[derive(Clone)]
pub struct RequestDispatcher {
    pool: Arc<HostPool>,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn RetryStrategy>,
    clock: Arc<dyn Clock>,
    logger: Arc<RequestLogger>,
    credentials: Credentials,
    default_headers: HeaderMap,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl RequestDispatcher {
    /// Create a dispatcher with the default strategy, clock and timeouts.
    #[must_use]
    pub fn new(pool: Arc<HostPool>, transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        Self {
            pool,
            transport,
            strategy: Arc::new(DefaultRetryStrategy),
            clock: Arc::new(SystemClock),
            logger: Arc::new(RequestLogger::new()),
            credentials,
            default_headers: HeaderMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Headers sent with every request, below credentials and per-call headers.
    #[must_use]
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Base timeouts for read and write commands.
    #[must_use]
    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<HostPool> {
        &self.pool
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<RequestLogger> {
        &self.logger
    }

    /// Run `command` until one host succeeds.
    ///
    /// `cancel` is checked before every attempt and after every attempt's
    /// health feedback has been applied; an attempt in flight is never
    /// aborted.
    ///
    /// # Errors
    ///
    /// - `NoHostsAvailable` if no host accepts the command's call type
    /// - `Api` if a host rejected the request itself
    /// - `AllHostsFailed` with one entry per attempted host otherwise
    /// - `Cancelled` if `cancel` fired
    pub async fn dispatch(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        let call_type = command.call_type;
        let candidates = self.pool.candidates(call_type, self.clock.now());
        if candidates.is_empty() {
            return Err(SearchError::NoHostsAvailable { call_type });
        }

        let base_timeout = command.base_timeout(self.read_timeout, self.write_timeout);
        let mut errors = Vec::with_capacity(candidates.len());

        for host in candidates {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            let timeout = host.retry_timeout(base_timeout);
            let request = match build_request(
                &host.endpoint,
                command,
                &self.credentials,
                &self.default_headers,
            ) {
                Ok(request) => request,
                Err(e) => {
                    warn!(
                        target: "search_api::hosts",
                        host = %host.endpoint,
                        error = %e,
                        "skipping host, request could not be built"
                    );
                    self.pool.apply_outcome(
                        host.index,
                        RetryOutcome::RetryableFailure,
                        self.clock.now(),
                    );
                    errors.push(AttemptError {
                        host: host.endpoint,
                        failure: AttemptFailure::InvalidRequest(e.to_string()),
                    });
                    continue;
                }
            };

            let span = self
                .logger
                .start(command.method.as_str(), &host.endpoint, &command.path);
            self.logger.log_request_headers(&span, request.headers());

            let result = match tokio::time::timeout(
                timeout,
                self.transport.perform(request, timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            let outcome = self.strategy.classify(&result);
            self.pool
                .apply_outcome(host.index, outcome, self.clock.now());

            if cancel.is_cancelled() {
                self.logger.finish_discarded(span);
                return Err(SearchError::Cancelled);
            }

            match (outcome, result) {
                (RetryOutcome::Success, Ok(response)) => {
                    self.logger.finish_success(span, response.status().as_u16());
                    return Ok(response);
                }
                (RetryOutcome::NonRetryableFailure, Ok(response)) => {
                    let status = response.status();
                    let message = error_message(response.body());
                    self.logger.finish_failure(
                        span,
                        &AttemptFailure::Status {
                            status,
                            message: message.clone(),
                        },
                    );
                    return Err(SearchError::Api {
                        host: host.endpoint,
                        status,
                        message,
                    });
                }
                (_, Ok(response)) => {
                    let failure = AttemptFailure::Status {
                        status: response.status(),
                        message: error_message(response.body()),
                    };
                    self.logger.finish_failure(span, &failure);
                    errors.push(AttemptError {
                        host: host.endpoint,
                        failure,
                    });
                }
                (outcome, Err(e)) => {
                    let failure = AttemptFailure::Transport(e);
                    self.logger.finish_failure(span, &failure);
                    errors.push(AttemptError {
                        host: host.endpoint,
                        failure,
                    });
                    if !outcome.is_retryable() {
                        break;
                    }
                }
            }
            debug!(
                target: "search_api::hosts",
                path = %command.path,
                attempts = errors.len(),
                "retrying on next host"
            );
        }

        Err(SearchError::AllHostsFailed(errors))
    }

    /// Run `command` and decode the JSON body of the successful response.
    ///
    /// A body that does not decode is terminal; it is not retried on
    /// another host.
    ///
    /// # Errors
    ///
    /// Everything [`dispatch`](Self::dispatch) returns, plus `Decode`.
    pub async fn dispatch_json<T: DeserializeOwned>(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.dispatch(command, cancel).await?;
        serde_json::from_slice(response.body()).map_err(|e| SearchError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("pool", &self.pool)
            .field("credentials", &self.credentials)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
