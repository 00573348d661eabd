// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::client::{CallType, TransportError};
use http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a single host attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The transport never produced a response.
    Transport(TransportError),
    /// The host answered with a status that is not a success.
    Status {
        /// HTTP status returned by the host.
        status: StatusCode,
        /// Message extracted from the response body, if any.
        message: String,
    },
    /// No request could be built for this host, e.g. an unparsable endpoint.
    InvalidRequest(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport(e) => write!(f, "{e}"),
            AttemptFailure::Status { status, message } if message.is_empty() => {
                write!(f, "HTTP {status}")
            }
            AttemptFailure::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            AttemptFailure::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
        }
    }
}

/// One failed attempt against one host, kept for the aggregate error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    /// The host that was contacted.
    pub host: String,
    /// The reason the attempt failed.
    pub failure: AttemptFailure,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.failure)
    }
}

fn join_attempts(attempts: &[AttemptError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No host accepts {call_type} operations")]
    NoHostsAvailable { call_type: CallType },

    #[error("API request to {host} rejected with HTTP {status}: {message}")]
    Api {
        host: String,
        status: StatusCode,
        message: String,
    },

    #[error("All {} hosts failed: {}", .0.len(), join_attempts(.0))]
    AllHostsFailed(Vec<AttemptError>),

    #[error("Task {task_id} not published after {elapsed:?}")]
    WaitTimeout { task_id: u64, elapsed: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchError {
    /// Returns `true` if retrying the whole operation later may succeed.
    ///
    /// Host-level retries have already happened by the time a caller sees
    /// the error; this only says whether the failure looked transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::AllHostsFailed(_) | SearchError::WaitTimeout { .. }
        )
    }

    /// The per-host errors of an aggregate failure, in attempt order.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptError] {
        match self {
            SearchError::AllHostsFailed(attempts) => attempts,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
