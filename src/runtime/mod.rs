// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime pieces around the attempt loop.
//!
//! Response classification, request logging, the clock abstraction, the
//! bounded operation launcher, and the task completion waiter.

mod clock;
mod launcher;
mod logging;
mod retry;
mod waiter;

pub use clock::{Clock, SystemClock};
pub use launcher::{
    OperationHandle, OperationLauncher, OperationState, DEFAULT_MAX_CONCURRENT_OPERATIONS,
};
pub use logging::{DispatchMetrics, LogLevel, LoggingConfig, RequestLogger, RequestSpan};
pub use retry::{CustomRetryStrategy, DefaultRetryStrategy, RetryOutcome, RetryStrategy};
pub use waiter::{TaskCompletionWaiter, WaitState, DEFAULT_POLL_INTERVAL};
