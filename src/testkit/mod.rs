// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the transport and the clock.
//!
//! [`MockTransport`] answers requests from per-host scripts and records every
//! attempt; [`ManualClock`] only moves when told to, or when something sleeps
//! on it.

use crate::client::{RawRequest, RawResponse, Transport, TransportError};
use crate::runtime::Clock;
use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with a status and body.
    Status(u16, String),
    /// Fail below HTTP.
    Error(TransportError),
    /// Wait before producing the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    /// `200` with a JSON body.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        MockReply::Status(200, body.into())
    }

    /// A status with an empty body.
    #[must_use]
    pub fn status(code: u16) -> Self {
        MockReply::Status(code, String::new())
    }

    #[must_use]
    pub fn timeout() -> Self {
        MockReply::Error(TransportError::Timeout)
    }

    #[must_use]
    pub fn refused() -> Self {
        MockReply::Error(TransportError::Connect("connection refused".to_string()))
    }

    /// Delay this reply by `delay`.
    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        MockReply::Delayed(delay, Box::new(self))
    }
}

/// An attempt seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub host: String,
    pub method: http::Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

/// A transport answering from per-host scripts.
///
/// Queued replies are used first, then the host's fallback reply. A host with
/// neither refuses the connection.
#[derive(Debug, Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<MockReply>>>,
    fallback: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply for `host`.
    pub fn push(&self, host: &str, reply: MockReply) -> &Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply this way once the queue for `host` is empty.
    pub fn always(&self, host: &str, reply: MockReply) -> &Self {
        self.fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), reply);
        self
    }

    /// Every attempt so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Hosts attempted so far, in order.
    #[must_use]
    pub fn attempted_hosts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.host).collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_reply(&self, host: &str) -> Option<MockReply> {
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(host)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| {
            self.fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(host)
                .cloned()
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(
        &self,
        request: RawRequest,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, TransportError> {
        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(RecordedCall {
            host: host.clone(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers: request.headers().clone(),
            timeout,
        });

        let mut reply = self.next_reply(&host).unwrap_or_else(|| {
            MockReply::Error(TransportError::Connect(format!("no route to {host}")))
        });
        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Error(e) => return Err(e),
                MockReply::Status(code, body) => {
                    return http::Response::builder()
                        .status(code)
                        .header(http::header::CONTENT_TYPE, "application/json")
                        .body(Bytes::from(body))
                        .map_err(|e| TransportError::Other(e.to_string()));
                }
            }
        }
    }
}

/// A clock that only moves when advanced or slept on.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
