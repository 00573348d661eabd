// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of host attempts.
//!
//! A [`RetryStrategy`] looks at the result of one attempt and decides whether
//! the dispatcher should return it, move on to the next host, or stop.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use search_api_rs::runtime::{DefaultRetryStrategy, RetryOutcome, RetryStrategy};
//!
//! let response = http::Response::builder()
//!     .status(503)
//!     .body(Bytes::new())
//!     .unwrap();
//!
//! let outcome = DefaultRetryStrategy.classify(&Ok(response));
//! assert_eq!(outcome, RetryOutcome::RetryableFailure);
//! ```

use crate::client::{RawResponse, TransportError};
use http::StatusCode;

/// What happened to one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The host answered with a success status.
    Success,
    /// The host is at fault; another host may succeed.
    RetryableFailure,
    /// The request is at fault; no host will accept it.
    NonRetryableFailure,
    /// The host did not answer in time.
    TimedOut,
}

impl RetryOutcome {
    /// Returns `true` if the dispatcher should try the next host.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, RetryOutcome::RetryableFailure | RetryOutcome::TimedOut)
    }
}

/// Decides how an attempt result should be treated.
pub trait RetryStrategy: Send + Sync + 'static {
    /// Classify the result of one transport call.
    fn classify(&self, result: &std::result::Result<RawResponse, TransportError>) -> RetryOutcome;
}

/// Retries transport failures, 5xx, 408 and 429; everything else is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryStrategy;

impl DefaultRetryStrategy {
    /// Classify a bare status code.
    #[must_use]
    pub fn classify_status(status: StatusCode) -> RetryOutcome {
        if status.is_success() {
            RetryOutcome::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
        {
            RetryOutcome::RetryableFailure
        } else if status.is_client_error() {
            RetryOutcome::NonRetryableFailure
        } else if status.is_server_error() {
            RetryOutcome::RetryableFailure
        } else {
            // informational and redirects are not expected from the API
            RetryOutcome::NonRetryableFailure
        }
    }
}

impl RetryStrategy for DefaultRetryStrategy {
    fn classify(&self, result: &std::result::Result<RawResponse, TransportError>) -> RetryOutcome {
        match result {
            Err(e) if e.is_timeout() => RetryOutcome::TimedOut,
            Err(_) => RetryOutcome::RetryableFailure,
            Ok(response) => Self::classify_status(response.status()),
        }
    }
}

/// Custom strategy driven by an explicit list of retryable statuses.
///
/// Transport errors keep their default treatment.
#[derive(Debug, Clone)]
pub struct CustomRetryStrategy {
    retry_statuses: Vec<StatusCode>,
}

impl CustomRetryStrategy {
    /// Create a strategy that retries on specific statuses.
    #[must_use]
    pub fn new(retry_statuses: Vec<StatusCode>) -> Self {
        Self { retry_statuses }
    }

    /// Create a strategy that only retries when a host is unreachable.
    #[must_use]
    pub fn network_errors() -> Self {
        Self::new(Vec::new())
    }
}

impl RetryStrategy for CustomRetryStrategy {
    fn classify(&self, result: &std::result::Result<RawResponse, TransportError>) -> RetryOutcome {
        match result {
            Err(e) if e.is_timeout() => RetryOutcome::TimedOut,
            Err(_) => RetryOutcome::RetryableFailure,
            Ok(response) if response.status().is_success() => RetryOutcome::Success,
            Ok(response) if self.retry_statuses.contains(&response.status()) => {
                RetryOutcome::RetryableFailure
            }
            Ok(_) => RetryOutcome::NonRetryableFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16) -> std::result::Result<RawResponse, TransportError> {
        Ok(http::Response::builder()
            .status(status)
            .body(Bytes::new())
            .unwrap())
    }

    #[test]
    fn test_transport_errors() {
        let strategy = DefaultRetryStrategy;
        assert_eq!(
            strategy.classify(&Err(TransportError::Timeout)),
            RetryOutcome::TimedOut
        );
        assert_eq!(
            strategy.classify(&Err(TransportError::Connect("refused".to_string()))),
            RetryOutcome::RetryableFailure
        );
        assert_eq!(
            strategy.classify(&Err(TransportError::Other("reset".to_string()))),
            RetryOutcome::RetryableFailure
        );
    }

    #[test]
    fn test_status_ranges() {
        let strategy = DefaultRetryStrategy;
        assert_eq!(strategy.classify(&response(200)), RetryOutcome::Success);
        assert_eq!(strategy.classify(&response(201)), RetryOutcome::Success);
        assert_eq!(strategy.classify(&response(500)), RetryOutcome::RetryableFailure);
        assert_eq!(strategy.classify(&response(503)), RetryOutcome::RetryableFailure);

        assert_eq!(strategy.classify(&response(400)), RetryOutcome::NonRetryableFailure);
        assert_eq!(strategy.classify(&response(401)), RetryOutcome::NonRetryableFailure);
        assert_eq!(strategy.classify(&response(404)), RetryOutcome::NonRetryableFailure);
    }

    #[test]
    fn test_client_error_carve_outs() {
        let strategy = DefaultRetryStrategy;
        assert_eq!(strategy.classify(&response(429)), RetryOutcome::RetryableFailure);
        assert_eq!(strategy.classify(&response(408)), RetryOutcome::RetryableFailure);
    }

    #[test]
    fn test_unexpected_shapes_fail_closed() {
        let strategy = DefaultRetryStrategy;
        assert_eq!(strategy.classify(&response(101)), RetryOutcome::NonRetryableFailure);
        assert_eq!(strategy.classify(&response(302)), RetryOutcome::NonRetryableFailure);
    }

    #[test]
    fn test_outcome_is_retryable() {
        assert!(RetryOutcome::RetryableFailure.is_retryable());
        assert!(RetryOutcome::TimedOut.is_retryable());
        assert!(!RetryOutcome::Success.is_retryable());
        assert!(!RetryOutcome::NonRetryableFailure.is_retryable());
    }

    #[test]
    fn test_custom_strategy() {
        let strategy = CustomRetryStrategy::new(vec![StatusCode::BAD_GATEWAY]);
        assert_eq!(strategy.classify(&response(502)), RetryOutcome::RetryableFailure);
        assert_eq!(strategy.classify(&response(503)), RetryOutcome::NonRetryableFailure);
        assert_eq!(strategy.classify(&response(204)), RetryOutcome::Success);

        let network = CustomRetryStrategy::network_errors();
        assert_eq!(network.classify(&response(500)), RetryOutcome::NonRetryableFailure);
        assert_eq!(
            network.classify(&Err(TransportError::Timeout)),
            RetryOutcome::TimedOut
        );
    }
}
