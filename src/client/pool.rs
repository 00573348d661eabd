// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host pool shared by every dispatch of a client.
//!
//! This module provides:
//! - [`HostPool`]: the ordered set of configured hosts and their health
//! - [`HostConfig`]: one configured endpoint with its call-type affinity
//!
//! # Example
//!
//! ```
//! use search_api_rs::client::{CallType, HostConfig, HostPool};
//! use std::time::Duration;
//!
//! let pool = HostPool::new(
//!     vec![
//!         HostConfig::read("app-dsn.example.net"),
//!         HostConfig::write("app.example.net"),
//!         HostConfig::any("app-1.example.com"),
//!     ],
//!     Duration::from_secs(300),
//! );
//!
//! let now = tokio::time::Instant::now();
//! let hosts = pool.candidates(CallType::Read, now);
//! assert_eq!(hosts.len(), 2);
//! assert_eq!(hosts[0].endpoint, "app-dsn.example.net");
//! ```

use crate::client::host::{CallType, HostAffinity, HostSnapshot, RetryableHost};
use crate::runtime::RetryOutcome;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host authority, e.g. `app-dsn.example.net` or `http://127.0.0.1:8080`.
    pub url: String,
    /// Call types this host accepts.
    #[serde(default)]
    pub accept: HostAffinity,
}

impl HostConfig {
    /// Create a host configuration.
    #[must_use]
    pub fn new(url: impl Into<String>, accept: HostAffinity) -> Self {
        Self {
            url: url.into(),
            accept,
        }
    }

    /// A host accepting reads only.
    #[must_use]
    pub fn read(url: impl Into<String>) -> Self {
        Self::new(url, HostAffinity::Read)
    }

    /// A host accepting writes only.
    #[must_use]
    pub fn write(url: impl Into<String>) -> Self {
        Self::new(url, HostAffinity::Write)
    }

    /// A host accepting both.
    #[must_use]
    pub fn any(url: impl Into<String>) -> Self {
        Self::new(url, HostAffinity::Any)
    }
}

/// The ordered hosts of a client and their health.
///
/// Configured order is the preference order. The lock is only held for
/// bookkeeping, never across a network call.
#[derive(Debug)]
pub struct HostPool {
    hosts: Mutex<Vec<RetryableHost>>,
    expiry: Duration,
}

impl HostPool {
    /// Create a pool from configured hosts.
    #[must_use]
    pub fn new(hosts: Vec<HostConfig>, expiry: Duration) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|h| RetryableHost::new(h.url, h.accept))
            .collect();
        Self::from_hosts(hosts, expiry)
    }

    /// Create a pool from already constructed hosts.
    #[must_use]
    pub fn from_hosts(hosts: Vec<RetryableHost>, expiry: Duration) -> Self {
        Self {
            hosts: Mutex::new(hosts),
            expiry,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RetryableHost>> {
        // health state is a hint; a panic elsewhere must not wedge dispatch
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How long a down host stays ineligible.
    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Ordered hosts to try for `call_type`.
    ///
    /// Expired down hosts are put back on probation first: they count as up
    /// again but keep their failure count, so their next attempt still uses
    /// the widened timeout until a success resets it. Up hosts are
    /// returned in configured order; if none is up, every host accepting
    /// `call_type` is returned. An empty result means no host accepts
    /// `call_type` at all.
    #[must_use]
    pub fn candidates(&self, call_type: CallType, now: Instant) -> Vec<HostSnapshot> {
        let mut hosts = self.lock();

        let mut up = Vec::new();
        let mut all = Vec::new();
        for (index, host) in hosts.iter_mut().enumerate() {
            if !host.affinity().accepts(call_type) {
                continue;
            }
            if host.is_expired(now, self.expiry) {
                debug!(
                    target: "search_api::hosts",
                    host = host.endpoint(),
                    failures = host.failure_count(),
                    "host expired, back on probation"
                );
                host.reset_to_probation();
            }
            let snapshot = host.snapshot(index);
            if host.is_up() {
                up.push(snapshot.clone());
            }
            all.push(snapshot);
        }

        if up.is_empty() {
            if !all.is_empty() {
                warn!(
                    target: "search_api::hosts",
                    %call_type,
                    hosts = all.len(),
                    "all hosts down, retrying every host"
                );
            }
            all
        } else {
            up
        }
    }

    /// Apply the outcome of an attempt to the host at `index`.
    pub fn apply_outcome(&self, index: usize, outcome: RetryOutcome, now: Instant) {
        let mut hosts = self.lock();
        let Some(host) = hosts.get_mut(index) else {
            return;
        };
        match outcome {
            RetryOutcome::Success => host.mark_succeeded(),
            RetryOutcome::RetryableFailure => {
                host.mark_failed(now);
                debug!(
                    target: "search_api::hosts",
                    host = host.endpoint(),
                    failures = host.failure_count(),
                    "host marked down"
                );
            }
            RetryOutcome::TimedOut => {
                host.mark_timed_out(now);
                debug!(
                    target: "search_api::hosts",
                    host = host.endpoint(),
                    failures = host.failure_count(),
                    "host timed out, marked down"
                );
            }
            RetryOutcome::NonRetryableFailure => {}
        }
    }

    /// A copy of the host at `index`.
    #[must_use]
    pub fn host(&self, index: usize) -> Option<RetryableHost> {
        self.lock().get(index).cloned()
    }

    /// A copy of every host, in configured order.
    #[must_use]
    pub fn hosts(&self) -> Vec<RetryableHost> {
        self.lock().clone()
    }

    /// Number of hosts currently up.
    #[must_use]
    pub fn up_count(&self) -> usize {
        self.lock().iter().filter(|h| h.is_up()).count()
    }

    /// Mark every host healthy again.
    pub fn reset(&self) {
        for host in self.lock().iter_mut() {
            host.mark_succeeded();
        }
    }

    /// Total number of configured hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
