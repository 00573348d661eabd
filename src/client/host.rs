// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health tracking for a single search host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default window after which a down host becomes eligible again.
pub const DEFAULT_HOST_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Queries, browsing, task status.
    Read,
    /// Indexing, settings, deletions.
    Write,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Read => write!(f, "read"),
            CallType::Write => write!(f, "write"),
        }
    }
}

/// Which call types a host accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostAffinity {
    /// Accepts reads and writes.
    #[default]
    Any,
    /// Accepts reads only.
    Read,
    /// Accepts writes only.
    Write,
}

impl HostAffinity {
    /// Check whether a host with this affinity may serve `call_type`.
    #[must_use]
    pub fn accepts(self, call_type: CallType) -> bool {
        match self {
            HostAffinity::Any => true,
            HostAffinity::Read => call_type == CallType::Read,
            HostAffinity::Write => call_type == CallType::Write,
        }
    }
}

/// The kind of the most recent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The host answered badly or could not be reached.
    Failed,
    /// The host did not answer within the attempt timeout.
    TimedOut,
}

/// One configured endpoint and its reachability.
///
/// `is_up == false` always comes with a `last_failure`.
#[derive(Debug, Clone)]
pub struct RetryableHost {
    endpoint: String,
    affinity: HostAffinity,
    is_up: bool,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_kind: Option<FailureKind>,
}

impl RetryableHost {
    /// Create a healthy host.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, affinity: HostAffinity) -> Self {
        Self {
            endpoint: endpoint.into(),
            affinity,
            is_up: true,
            failure_count: 0,
            last_failure: None,
            last_failure_kind: None,
        }
    }

    /// The endpoint authority, optionally with a scheme.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn affinity(&self) -> HostAffinity {
        self.affinity
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.is_up
    }

    /// Number of failures since the last success.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    #[must_use]
    pub fn last_failure_kind(&self) -> Option<FailureKind> {
        self.last_failure_kind
    }

    /// Record a successful attempt.
    pub fn mark_succeeded(&mut self) {
        self.is_up = true;
        self.failure_count = 0;
        self.last_failure = None;
        self.last_failure_kind = None;
    }

    /// Record a failed attempt at `now`.
    pub fn mark_failed(&mut self, now: Instant) {
        self.record_failure(now, FailureKind::Failed);
    }

    /// Record a timed out attempt at `now`.
    pub fn mark_timed_out(&mut self, now: Instant) {
        self.record_failure(now, FailureKind::TimedOut);
    }

    fn record_failure(&mut self, now: Instant, kind: FailureKind) {
        self.is_up = false;
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        self.last_failure_kind = Some(kind);
    }

    /// Whether a down host has been down for at least `expiry`.
    ///
    /// Always `false` for a host that is up.
    #[must_use]
    pub fn is_expired(&self, now: Instant, expiry: Duration) -> bool {
        match (self.is_up, self.last_failure) {
            (false, Some(failed_at)) => now.saturating_duration_since(failed_at) >= expiry,
            _ => false,
        }
    }

    /// Put an expired host back on probation.
    ///
    /// The failure count is kept so the next attempt still gets the widened
    /// timeout; only a success clears it.
    pub fn reset_to_probation(&mut self) {
        self.is_up = true;
        self.last_failure = None;
        self.last_failure_kind = None;
    }

    /// Attempt timeout for this host: `base * (failure_count + 1)`.
    #[must_use]
    pub fn retry_timeout(&self, base: Duration) -> Duration {
        base.saturating_mul(self.failure_count.saturating_add(1))
    }

    /// Owned view used by the dispatcher for one invocation.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> HostSnapshot {
        HostSnapshot {
            index,
            endpoint: self.endpoint.clone(),
            failure_count: self.failure_count,
        }
    }
}

/// A host as seen at the start of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    /// Position of the host in the pool.
    pub index: usize,
    /// The endpoint to contact.
    pub endpoint: String,
    /// Failure count when the snapshot was taken.
    pub failure_count: u32,
}

impl HostSnapshot {
    /// Attempt timeout at the time of the snapshot.
    #[must_use]
    pub fn retry_timeout(&self, base: Duration) -> Duration {
        base.saturating_mul(self.failure_count.saturating_add(1))
    }
}
