// SPDX-License-Identifier: MIT OR Apache-2.0

//! The search client and the pieces it dispatches through.
//!
//! [`SearchClient`] owns one [`HostPool`] shared by every call it makes, and
//! exposes three surfaces over the same attempt loop:
//!
//! - `execute` / `execute_blocking`: run a command and decode its response
//! - `launch`: run a command on the worker pool, returning a cancellable handle
//! - `wait_for_task` and its blocking and launched forms: poll a task until it
//!   is published

mod command;
mod dispatcher;
mod host;
mod pool;
mod transport;

#[cfg(test)]
mod tests;

pub use command::{
    base_url, build_request, Command, Credentials, RequestOptions, API_KEY_HEADER,
    APPLICATION_ID_HEADER,
};
pub use dispatcher::{RequestDispatcher, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
pub use host::{
    CallType, FailureKind, HostAffinity, HostSnapshot, RetryableHost, DEFAULT_HOST_EXPIRY,
};
pub use pool::{HostConfig, HostPool};
pub use transport::{RawRequest, RawResponse, Transport, TransportError};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::resources::{TaskRef, TaskStatus};
use crate::runtime::{
    Clock, DispatchMetrics, LoggingConfig, OperationHandle, OperationLauncher, RequestLogger,
    RetryStrategy, TaskCompletionWaiter, DEFAULT_MAX_CONCURRENT_OPERATIONS,
    DEFAULT_POLL_INTERVAL,
};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Domain of an application's primary hosts.
pub const DEFAULT_HOST_DOMAIN: &str = "search-api.net";

/// Domain of an application's fallback hosts.
pub const FALLBACK_HOST_DOMAIN: &str = "searchnet.com";

/// The default hosts of an application.
///
/// The dedicated read host and the write host come first, followed by three
/// fallback hosts in random order so that clients of one application spread
/// their load across them.
#[must_use]
pub fn default_hosts(application_id: &str) -> Vec<HostConfig> {
    let app = application_id.to_lowercase();
    let mut fallback: Vec<HostConfig> = (1..=3)
        .map(|i| HostConfig::any(format!("{app}-{i}.{FALLBACK_HOST_DOMAIN}")))
        .collect();
    fallback.sort_by_cached_key(|_| rand::random::<u64>());

    let mut hosts = vec![
        HostConfig::read(format!("{app}-dsn.{DEFAULT_HOST_DOMAIN}")),
        HostConfig::write(format!("{app}.{DEFAULT_HOST_DOMAIN}")),
    ];
    hosts.extend(fallback);
    hosts
}

#[derive(Clone)]
pub struct ClientConfig {
    pub application_id: String,
    pub api_key: String,
    /// Hosts in preference order.
    pub hosts: Vec<HostConfig>,
    /// Base attempt timeout for reads.
    pub read_timeout: Duration,
    /// Base attempt timeout for writes.
    pub write_timeout: Duration,
    /// How long a down host is skipped before it is tried again.
    pub host_expiry: Duration,
    /// Launched operations allowed to run at once.
    pub max_concurrent_operations: usize,
    /// Delay between two task status polls.
    pub task_poll_interval: Duration,
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Configuration with the application's default hosts and default timeouts.
    #[must_use]
    pub fn new(application_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        let application_id = application_id.into();
        Self {
            hosts: default_hosts(&application_id),
            application_id,
            api_key: api_key.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            host_expiry: DEFAULT_HOST_EXPIRY,
            max_concurrent_operations: DEFAULT_MAX_CONCURRENT_OPERATIONS,
            task_poll_interval: DEFAULT_POLL_INTERVAL,
            default_headers: HeaderMap::new(),
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub fn builder(
        application_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(application_id, api_key),
        }
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.application_id.trim().is_empty() {
            return Err(SearchError::Config("Application id is required".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(SearchError::Config("API key is required".to_string()));
        }
        if self.hosts.is_empty() {
            return Err(SearchError::Config("At least one host is required".to_string()));
        }
        for host in &self.hosts {
            if host.url.trim().is_empty() {
                return Err(SearchError::Config(format!("Empty host url: {host:?}")));
            }
            base_url(&host.url)?;
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(SearchError::Config("Timeouts must be non-zero".to_string()));
        }
        if self.task_poll_interval.is_zero() {
            return Err(SearchError::Config(
                "Task poll interval must be non-zero".to_string(),
            ));
        }
        if self.max_concurrent_operations == 0 {
            return Err(SearchError::Config(
                "At least one concurrent operation is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("application_id", &self.application_id)
            .field("api_key", &"[REDACTED]")
            .field("hosts", &self.hosts)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("host_expiry", &self.host_expiry)
            .field("max_concurrent_operations", &self.max_concurrent_operations)
            .field("task_poll_interval", &self.task_poll_interval)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Replace the default hosts.
    #[must_use]
    pub fn hosts(mut self, hosts: Vec<HostConfig>) -> Self {
        self.config.hosts = hosts;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn host_expiry(mut self, expiry: Duration) -> Self {
        self.config.host_expiry = expiry;
        self
    }

    #[must_use]
    pub fn max_concurrent_operations(mut self, max: usize) -> Self {
        self.config.max_concurrent_operations = max;
        self
    }

    #[must_use]
    pub fn task_poll_interval(mut self, interval: Duration) -> Self {
        self.config.task_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.default_headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::validate`].
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Client for one search application.
///
/// Clones share the host pool, the worker pool and the metrics.
#[derive(Clone, Debug)]
pub struct SearchClient {
    config: Arc<ClientConfig>,
    dispatcher: RequestDispatcher,
    launcher: OperationLauncher,
}

impl SearchClient {
    /// Create a client.
    ///
    /// Launched operations run on the current tokio runtime if there is one,
    /// otherwise on a runtime owned by the client.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if the configuration is invalid.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let max = config.max_concurrent_operations;
        let launcher = match OperationLauncher::current(max) {
            Ok(launcher) => launcher,
            Err(_) => OperationLauncher::with_owned_runtime(max)?,
        };
        Self::with_launcher(config, transport, launcher)
    }

    /// Create a client running launched operations on `launcher`.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if the configuration is invalid.
    pub fn with_launcher(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        launcher: OperationLauncher,
    ) -> Result<Self> {
        config.validate()?;
        let credentials = Credentials::new(&config.application_id, &config.api_key)?;
        let pool = Arc::new(HostPool::new(config.hosts.clone(), config.host_expiry));
        let dispatcher = RequestDispatcher::new(pool, transport, credentials)
            .with_timeouts(config.read_timeout, config.write_timeout)
            .with_default_headers(config.default_headers.clone())
            .with_logger(Arc::new(RequestLogger::with_config(config.logging.clone())));

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            launcher,
        })
    }

    /// Create a client from the profile file and environment.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if no context is active or it is invalid.
    pub fn from_env(transport: Arc<dyn Transport>) -> Result<Self> {
        let profile = SearchConfig::load_with_env()?;
        let context = profile.active_context().ok_or_else(|| {
            SearchError::Config("No active search context configured".to_string())
        })?;
        Self::new(context.to_client_config()?, transport)
    }

    /// Use `clock` for host expiry and task polling.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.dispatcher = self.dispatcher.with_clock(clock);
        self
    }

    /// Classify responses with `strategy`.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.dispatcher = self.dispatcher.with_strategy(strategy);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<HostPool> {
        self.dispatcher.pool()
    }

    #[must_use]
    pub fn launcher(&self) -> &OperationLauncher {
        &self.launcher
    }

    /// Attempt counters of this client.
    #[must_use]
    pub fn metrics(&self) -> &DispatchMetrics {
        self.dispatcher.logger().metrics()
    }

    /// Run `command` and decode its JSON response.
    ///
    /// # Errors
    ///
    /// See [`RequestDispatcher::dispatch`]; additionally `Decode` if the body
    /// does not match `T`.
    pub async fn execute<T: DeserializeOwned>(&self, command: &Command) -> Result<T> {
        self.execute_with(command, &CancellationToken::new()).await
    }

    /// [`execute`](Self::execute), observing `cancel`.
    pub async fn execute_with<T: DeserializeOwned>(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.dispatcher.dispatch_json(command, cancel).await
    }

    /// Run `command` and return the raw response.
    pub async fn execute_raw(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        self.dispatcher.dispatch(command, cancel).await
    }

    /// Run `command` on the worker pool and block until it finishes.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus `Config` if called from inside a
    /// tokio runtime.
    pub fn execute_blocking<T>(&self, command: Command) -> Result<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        self.execute_blocking_with(command, &CancellationToken::new())
    }

    /// [`execute_blocking`](Self::execute_blocking), observing `cancel`.
    ///
    /// Cancelling lets an attempt in flight finish; its result is dropped and
    /// `Cancelled` is returned.
    pub fn execute_blocking_with<T>(&self, command: Command, cancel: &CancellationToken) -> Result<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        self.launcher.run_blocking(
            move |token| async move { dispatcher.dispatch_json(&command, &token).await },
            cancel,
        )
    }

    /// Run `command` on the worker pool.
    ///
    /// `completion` fires exactly once, with the decoded response, the
    /// terminal error, or `Cancelled`.
    pub fn launch<T, C>(&self, command: Command, completion: C) -> OperationHandle<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        self.launcher.launch_with_callback(
            move |token| async move { dispatcher.dispatch_json(&command, &token).await },
            completion,
        )
    }

    fn waiter(&self, timeout: Option<Duration>) -> TaskCompletionWaiter {
        TaskCompletionWaiter::new(self.dispatcher.clone())
            .with_poll_interval(self.config.task_poll_interval)
            .with_timeout(timeout)
    }

    /// Poll `task` until it is published, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// `WaitTimeout`, or the error of the first failed poll.
    pub async fn wait_for_task(
        &self,
        task: &TaskRef,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus> {
        self.wait_for_task_with(task, timeout, &CancellationToken::new())
            .await
    }

    /// [`wait_for_task`](Self::wait_for_task), observing `cancel`.
    pub async fn wait_for_task_with(
        &self,
        task: &TaskRef,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TaskStatus> {
        self.waiter(timeout).wait(task, cancel).await
    }

    /// Blocking form of [`wait_for_task`](Self::wait_for_task).
    ///
    /// # Errors
    ///
    /// As the async form, plus `Config` if called from inside a tokio runtime.
    pub fn wait_for_task_blocking(
        &self,
        task: TaskRef,
        timeout: Option<Duration>,
    ) -> Result<TaskStatus> {
        let mut waiter = self.waiter(timeout);
        self.launcher.run_blocking(
            move |token| async move { waiter.wait(&task, &token).await },
            &CancellationToken::new(),
        )
    }

    /// Launched form of [`wait_for_task`](Self::wait_for_task).
    pub fn launch_wait_for_task<C>(
        &self,
        task: TaskRef,
        timeout: Option<Duration>,
        completion: C,
    ) -> OperationHandle<TaskStatus>
    where
        C: FnOnce(Result<TaskStatus>) + Send + 'static,
    {
        let mut waiter = self.waiter(timeout);
        self.launcher.launch_with_callback(
            move |token| async move { waiter.wait(&task, &token).await },
            completion,
        )
    }
}
