// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time source used by host expiry and the task waiter.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// A source of "now" and a way to wait.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
