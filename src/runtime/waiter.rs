// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling a server-side task until it is published.
//!
//! Each poll is a full dispatch, so host failover already happens underneath;
//! a poll that still fails ends the wait. Between a "not published" answer and
//! the next poll the waiter always sleeps for the poll interval.
//!
//! # States
//!
//! - **NotStarted** → **Polling** → **Completed** | **TimedOut** | **Failed**

use crate::client::RequestDispatcher;
use crate::error::{Result, SearchError};
use crate::resources::{TaskRef, TaskStatus, TaskStatusBody};
use crate::runtime::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where a waiter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    NotStarted,
    Polling,
    Completed,
    TimedOut,
    /// A poll failed or the wait was cancelled.
    Failed,
}

/// Polls a task's status until it is published or the timeout elapses.
pub struct TaskCompletionWaiter {
    dispatcher: RequestDispatcher,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    timeout: Option<Duration>,
    state: WaitState,
    polls: u32,
}

impl TaskCompletionWaiter {
    /// Create a waiter using the dispatcher's clock and no timeout.
    #[must_use]
    pub fn new(dispatcher: RequestDispatcher) -> Self {
        let clock = Arc::clone(dispatcher.clock());
        Self {
            dispatcher,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            state: WaitState::NotStarted,
            polls: 0,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up once this much time has elapsed since the wait started.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Status checks issued by the last wait.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    fn fail(&mut self, error: SearchError) -> Result<TaskStatus> {
        self.state = WaitState::Failed;
        Err(error)
    }

    /// Poll `task` until it is published.
    ///
    /// # Errors
    ///
    /// - `WaitTimeout` if the timeout elapsed first
    /// - `Cancelled` if `cancel` fired before the next poll
    /// - any dispatch error of a failed poll
    pub async fn wait(&mut self, task: &TaskRef, cancel: &CancellationToken) -> Result<TaskStatus> {
        let command = task.status_command();
        let launched_at = self.clock.now();
        self.state = WaitState::Polling;
        self.polls = 0;

        loop {
            if cancel.is_cancelled() {
                return self.fail(SearchError::Cancelled);
            }

            if let Some(timeout) = self.timeout {
                let elapsed = self.clock.now().saturating_duration_since(launched_at);
                if elapsed >= timeout {
                    self.state = WaitState::TimedOut;
                    return Err(SearchError::WaitTimeout {
                        task_id: task.task_id,
                        elapsed,
                    });
                }
            }

            self.polls += 1;
            let body = match self
                .dispatcher
                .dispatch_json::<TaskStatusBody>(&command, cancel)
                .await
            {
                Ok(body) => body,
                Err(e) => return self.fail(e),
            };

            let status = TaskStatus::from_body(task.task_id, body);
            debug!(
                target: "search_api::wait",
                index = %task.index,
                task_id = task.task_id,
                poll = self.polls,
                state = ?status.state,
                "task status"
            );
            if status.is_published() {
                self.state = WaitState::Completed;
                return Ok(status);
            }

            tokio::select! {
                _ = self.clock.sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

impl std::fmt::Debug for TaskCompletionWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCompletionWaiter")
            .field("dispatcher", &self.dispatcher)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Credentials, HostConfig, HostPool, DEFAULT_HOST_EXPIRY};
    use crate::resources::TaskState;
    use crate::testkit::{ManualClock, MockReply, MockTransport};

    const PENDING: &str = r#"{"status":"notPublished","pendingTask":true}"#;
    const PUBLISHED: &str = r#"{"status":"published","pendingTask":false}"#;

    fn setup(transport: &Arc<MockTransport>) -> (TaskCompletionWaiter, Arc<ManualClock>) {
        let pool = Arc::new(HostPool::new(
            vec![HostConfig::any("search-1.example")],
            DEFAULT_HOST_EXPIRY,
        ));
        let clock = Arc::new(ManualClock::new());
        let dispatcher = RequestDispatcher::new(
            pool,
            Arc::clone(transport) as Arc<dyn crate::client::Transport>,
            Credentials::new("APP", "secret").unwrap(),
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        (TaskCompletionWaiter::new(dispatcher), clock)
    }

    #[tokio::test]
    async fn test_published_on_second_poll() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push("search-1.example", MockReply::ok(PENDING))
            .always("search-1.example", MockReply::ok(PUBLISHED));
        let (waiter, clock) = setup(&transport);
        let mut waiter = waiter.with_poll_interval(Duration::from_millis(250));

        let status = waiter
            .wait(&TaskRef::new("products", 12), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status.state, TaskState::Published);
        assert_eq!(status.task_id, 12);
        assert_eq!(waiter.polls(), 2);
        assert_eq!(waiter.state(), WaitState::Completed);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
        assert_eq!(
            transport.calls()[0].path,
            "/1/indexes/products/task/12"
        );
    }

    #[tokio::test]
    async fn test_times_out_not_before_deadline() {
        let transport = Arc::new(MockTransport::new());
        transport.always("search-1.example", MockReply::ok(PENDING));
        let (waiter, clock) = setup(&transport);
        let mut waiter = waiter
            .with_poll_interval(Duration::from_secs(1))
            .with_timeout(Some(Duration::from_secs(3)));

        let err = waiter
            .wait(&TaskRef::new("products", 3), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SearchError::WaitTimeout { task_id, elapsed } => {
                assert_eq!(task_id, 3);
                assert!(elapsed >= Duration::from_secs(3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(waiter.state(), WaitState::TimedOut);
        // polls at 0s, 1s and 2s
        assert_eq!(waiter.polls(), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failed_poll_ends_wait() {
        let transport = Arc::new(MockTransport::new());
        transport.always("search-1.example", MockReply::status(503));
        let (mut waiter, _clock) = setup(&transport);

        let err = waiter
            .wait(&TaskRef::new("products", 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::AllHostsFailed(_)));
        assert_eq!(waiter.state(), WaitState::Failed);
        assert_eq!(waiter.polls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_status_is_terminal() {
        let transport = Arc::new(MockTransport::new());
        transport.always("search-1.example", MockReply::ok(r#"{"status":"done"}"#));
        let (mut waiter, _clock) = setup(&transport);

        let err = waiter
            .wait(&TaskRef::new("products", 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Decode(_)));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let transport = Arc::new(MockTransport::new());
        transport.always("search-1.example", MockReply::ok(PUBLISHED));
        let (mut waiter, _clock) = setup(&transport);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter
            .wait(&TaskRef::new("products", 1), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Cancelled));
        assert_eq!(waiter.state(), WaitState::Failed);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_debug_omits_clock() {
        let transport = Arc::new(MockTransport::new());
        let (waiter, _clock) = setup(&transport);
        let waiter = waiter.with_timeout(Some(Duration::from_secs(5)));

        let debug = format!("{waiter:?}");
        assert!(debug.starts_with("TaskCompletionWaiter"));
        assert!(debug.contains("NotStarted"));
        assert!(!debug.contains("secret"));
    }
}
