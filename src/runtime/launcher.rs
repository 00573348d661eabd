// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking and non-blocking execution of dispatches.
//!
//! [`OperationLauncher`] runs operations on a tokio runtime, bounded by a
//! semaphore, and hands back an [`OperationHandle`] that can be cancelled,
//! awaited, or observed through completion callbacks.
//!
//! # States
//!
//! - **Pending**: waiting for a worker permit
//! - **Running**: the operation is executing
//! - **Completed**: finished with a result, which is cached
//! - **Cancelled**: cancelled by the caller before completion
//!
//! # Example
//!
//! ```
//! use search_api_rs::runtime::{OperationLauncher, OperationState};
//!
//! let launcher = OperationLauncher::with_owned_runtime(4).unwrap();
//! let handle = launcher.launch(|_cancel| async { Ok(21 * 2) });
//!
//! assert_eq!(handle.wait_blocking().unwrap(), 42);
//! assert_eq!(handle.state(), OperationState::Completed);
//! ```

use crate::error::{Result, SearchError};
use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of operations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 16;

/// Lifecycle of one launched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl OperationState {
    /// Returns `true` once no further transition can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Cancelled)
    }
}

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

struct Inner<T> {
    state: OperationState,
    result: Option<Result<T>>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    finished: Condvar,
    notify: Notify,
    cancel: CancellationToken,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_running(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != OperationState::Pending {
            return false;
        }
        inner.state = OperationState::Running;
        true
    }

    /// Move to a terminal state. Only the first call wins; later results are
    /// discarded.
    fn resolve(&self, result: Result<T>) -> bool {
        let (callbacks, result) = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return false;
            }
            let result = if self.cancel.is_cancelled() {
                Err(SearchError::Cancelled)
            } else {
                result
            };
            inner.state = if matches!(result, Err(SearchError::Cancelled)) {
                OperationState::Cancelled
            } else {
                OperationState::Completed
            };
            inner.result = Some(result.clone());
            (std::mem::take(&mut inner.callbacks), result)
        };

        self.finished.notify_all();
        self.notify.notify_waiters();
        for callback in callbacks {
            callback(result.clone());
        }
        true
    }
}

/// Handle to a launched operation.
///
/// Clones observe the same operation.
pub struct OperationHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for OperationHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> OperationHandle<T> {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: OperationState::Pending,
                    result: None,
                    callbacks: Vec::new(),
                }),
                finished: Condvar::new(),
                notify: Notify::new(),
                cancel,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> OperationState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The token the operation checks at its checkpoints.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    /// Cancel the operation.
    ///
    /// Callbacks fire with `SearchError::Cancelled` right away. An attempt
    /// already in flight runs to completion but its result is discarded.
    /// Returns `false` if the operation had already finished.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.resolve(Err(SearchError::Cancelled));
        self.shared.cancel.cancel();
        if cancelled {
            debug!(target: "search_api::launcher", "operation cancelled");
        }
        cancelled
    }

    /// Register a completion callback.
    ///
    /// If the operation already finished, `callback` runs immediately on the
    /// calling thread with the cached result.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let cached = {
            let mut inner = self.shared.lock();
            match &inner.result {
                Some(result) => result.clone(),
                None => {
                    inner.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(cached);
    }

    /// The cached result, if finished.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<T>> {
        self.shared.lock().result.clone()
    }

    /// Wait for the result.
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(result) = self.try_result() {
                return result;
            }
            notified.await;
        }
    }

    /// Block the calling thread until the result is available.
    ///
    /// Must not be called from a current-thread runtime that also drives the
    /// operation.
    pub fn wait_blocking(&self) -> Result<T> {
        let mut inner = self.shared.lock();
        loop {
            if let Some(result) = &inner.result {
                return result.clone();
            }
            inner = self
                .shared
                .finished
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T> std::fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .shared
            .inner
            .lock()
            .map(|inner| inner.state)
            .unwrap_or(OperationState::Pending);
        f.debug_struct("OperationHandle")
            .field("state", &state)
            .finish()
    }
}

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // dropping a runtime from async context panics; shut down in the background
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs operations on a bounded worker pool.
#[derive(Clone)]
pub struct OperationLauncher {
    handle: Handle,
    permits: Arc<Semaphore>,
    _owned: Option<Arc<OwnedRuntime>>,
}

impl OperationLauncher {
    /// Launch onto an existing runtime.
    #[must_use]
    pub fn new(handle: Handle, max_concurrent: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            _owned: None,
        }
    }

    /// Launch onto the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` outside of a tokio runtime.
    pub fn current(max_concurrent: usize) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| SearchError::Config(format!("No tokio runtime available: {e}")))?;
        Ok(Self::new(handle, max_concurrent))
    }

    /// Launch onto a dedicated multi-threaded runtime owned by the launcher.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if the runtime cannot be built.
    pub fn with_owned_runtime(max_concurrent: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("search-api-worker")
            .enable_all()
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to build runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            _owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
            ..Self::new(handle, max_concurrent)
        })
    }

    /// Permits currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Launch an operation with a fresh cancellation token.
    pub fn launch<T, F, Fut>(&self, operation: F) -> OperationHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.launch_with_token(operation, CancellationToken::new())
    }

    /// Launch an operation observing `cancel`.
    ///
    /// Cancelling `cancel` directly resolves the operation as cancelled at its
    /// next checkpoint.
    pub fn launch_with_token<T, F, Fut>(
        &self,
        operation: F,
        cancel: CancellationToken,
    ) -> OperationHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.spawn_into(OperationHandle::new(cancel), operation)
    }

    /// Launch and register a completion callback in one step.
    pub fn launch_with_callback<T, F, Fut, C>(
        &self,
        operation: F,
        completion: C,
    ) -> OperationHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let handle = OperationHandle::new(CancellationToken::new());
        // registered before spawning so a fast operation cannot finish first
        handle.on_complete(completion);
        self.spawn_into(handle, operation)
    }

    fn spawn_into<T, F, Fut>(&self, handle: OperationHandle<T>, operation: F) -> OperationHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = Arc::clone(&handle.shared);
        let permits = Arc::clone(&self.permits);
        let worker = self.handle.clone();

        self.handle.spawn(async move {
            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit,
                _ = shared.cancel.cancelled() => {
                    shared.resolve(Err(SearchError::Cancelled));
                    return;
                }
            };
            let Ok(_permit) = permit else {
                shared.resolve(Err(SearchError::Unknown(
                    "worker pool closed".to_string(),
                )));
                return;
            };
            if !shared.mark_running() {
                return;
            }

            let token = shared.cancel.clone();
            let result = match worker.spawn(operation(token)).await {
                Ok(result) => result,
                Err(e) => Err(SearchError::Unknown(format!("operation failed: {e}"))),
            };
            if !shared.resolve(result) {
                debug!(target: "search_api::launcher", "late result discarded");
            }
        });

        handle
    }

    /// Run an operation on the worker pool and block until it finishes.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, `SearchError::Cancelled` if `cancel`
    /// fired first, or `SearchError::Config` when called from inside a tokio
    /// runtime (use the async form there).
    pub fn run_blocking<T, F, Fut>(&self, operation: F, cancel: &CancellationToken) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(SearchError::Config(
                "Blocking call made from async context; use the async API".to_string(),
            ));
        }
        self.launch_with_token(operation, cancel.clone())
            .wait_blocking()
    }
}

impl std::fmt::Debug for OperationLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLauncher")
            .field("available_permits", &self.permits.available_permits())
            .field("owned_runtime", &self._owned.is_some())
            .finish()
    }
}
