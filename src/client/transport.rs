// SPDX-License-Identifier: MIT OR Apache-2.0

//! The network primitive the dispatcher drives.
//!
//! A [`Transport`] performs exactly one HTTP exchange against one host. It owns
//! TLS, DNS, connection pooling and compression; the dispatcher owns everything
//! about which host to try next.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// A complete response as returned by the transport.
pub type RawResponse = http::Response<Bytes>;

/// A request as handed to the transport.
pub type RawRequest = http::Request<Bytes>;

/// Failure to obtain any response from a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connecting or reading did not finish within the attempt timeout.
    #[error("request timed out")]
    Timeout,
    /// The host could not be reached at all (DNS, refused connection, reset).
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other failure below the HTTP layer.
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for connect/read timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Performs one request against the host named in the request URI.
///
/// Implementations should honour `timeout`; the dispatcher additionally
/// bounds every call with the same deadline.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn perform(
        &self,
        request: RawRequest,
        timeout: Duration,
    ) -> std::result::Result<RawResponse, TransportError>;
}
