// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured logging of host attempts.
//!
//! Every attempt the dispatcher makes is logged with its host, path, timing
//! and outcome, and counted in [`DispatchMetrics`].
//!
//! # Example
//!
//! ```
//! use search_api_rs::runtime::{LogLevel, LoggingConfig, RequestLogger};
//!
//! let logger = RequestLogger::with_config(
//!     LoggingConfig::new()
//!         .with_success_level(LogLevel::Debug)
//!         .with_sensitive_header("x-secured-key"),
//! );
//!
//! let span = logger.start("GET", "app-dsn.example.net", "/1/indexes");
//! logger.finish_success(span, 200);
//! assert_eq!(logger.metrics().successful_attempts(), 1);
//! ```

use crate::client::TransportError;
use crate::error::AttemptFailure;
use http::HeaderMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Log level for attempt logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Disabled - no logging.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Off => "OFF",
        };
        f.write_str(name)
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => trace!(target: "search_api::http", $($arg)+),
            LogLevel::Debug => debug!(target: "search_api::http", $($arg)+),
            LogLevel::Info => info!(target: "search_api::http", $($arg)+),
            LogLevel::Warn => warn!(target: "search_api::http", $($arg)+),
            LogLevel::Error => error!(target: "search_api::http", $($arg)+),
            LogLevel::Off => {}
        }
    };
}

fn default_sensitive_headers() -> Vec<String> {
    ["x-api-key", "authorization"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Configuration for attempt logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for successful attempts.
    pub success_level: LogLevel,
    /// Log level for failed attempts.
    pub error_level: LogLevel,
    /// Whether to log request headers.
    pub log_headers: bool,
    /// Whether to redact sensitive headers.
    pub redact_sensitive: bool,
    /// Header names to redact.
    pub sensitive_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            success_level: LogLevel::Debug,
            error_level: LogLevel::Warn,
            log_headers: false,
            redact_sensitive: true,
            sensitive_headers: default_sensitive_headers(),
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_success_level(mut self, level: LogLevel) -> Self {
        self.success_level = level;
        self
    }

    #[must_use]
    pub fn with_error_level(mut self, level: LogLevel) -> Self {
        self.error_level = level;
        self
    }

    /// Enable or disable header logging.
    #[must_use]
    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    /// Enable or disable sensitive data redaction.
    #[must_use]
    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_sensitive = enabled;
        self
    }

    /// Add a sensitive header to redact.
    #[must_use]
    pub fn with_sensitive_header(mut self, header: impl Into<String>) -> Self {
        self.sensitive_headers.push(header.into());
        self
    }

    /// Verbose logging for debugging.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            success_level: LogLevel::Info,
            error_level: LogLevel::Error,
            log_headers: true,
            ..Self::default()
        }
    }

    /// Failures only.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            success_level: LogLevel::Off,
            error_level: LogLevel::Warn,
            log_headers: false,
            ..Self::default()
        }
    }

    fn is_sensitive(&self, name: &str) -> bool {
        self.redact_sensitive
            && self
                .sensitive_headers
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Render headers for a log line, redacting sensitive values.
    #[must_use]
    pub fn format_headers(&self, headers: &HeaderMap) -> String {
        let parts: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                if self.is_sensitive(name.as_str()) {
                    format!("{}=[REDACTED]", name)
                } else {
                    format!("{}={:?}", name, value)
                }
            })
            .collect();
        parts.join(", ")
    }
}

/// Attempt counters, shared by every dispatch of a client.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    discarded: AtomicU64,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, counter: &AtomicU64) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Host attempts made, whatever their outcome.
    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successful_attempts(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Failed attempts, timeouts included.
    #[must_use]
    pub fn failed_attempts(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn timed_out_attempts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Attempts whose result was dropped because the operation was cancelled.
    #[must_use]
    pub fn discarded_attempts(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Share of decided attempts that succeeded, `1.0` before any.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let successes = self.successful_attempts();
        let decided = successes + self.failed_attempts();
        if decided == 0 {
            return 1.0;
        }
        successes as f64 / decided as f64
    }

    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.successes,
            &self.failures,
            &self.timeouts,
            &self.discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Logs host attempts as structured events and counts them.
#[derive(Debug, Default)]
pub struct RequestLogger {
    config: LoggingConfig,
    metrics: DispatchMetrics,
}

impl RequestLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: LoggingConfig) -> Self {
        Self {
            config,
            metrics: DispatchMetrics::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Start timing an attempt against `host`.
    #[must_use]
    pub fn start(&self, method: &str, host: &str, path: &str) -> RequestSpan {
        RequestSpan {
            method: method.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            start: Instant::now(),
        }
    }

    /// Log the outgoing headers of an attempt, if enabled.
    pub fn log_request_headers(&self, span: &RequestSpan, headers: &HeaderMap) {
        if !self.config.log_headers {
            return;
        }
        log_at!(
            self.config.success_level,
            method = %span.method,
            host = %span.host,
            path = %span.path,
            headers = %self.config.format_headers(headers),
            "sending attempt"
        );
    }

    pub fn finish_success(&self, span: RequestSpan, status: u16) {
        self.metrics.record(&self.metrics.successes);
        log_at!(
            self.config.success_level,
            method = %span.method,
            host = %span.host,
            path = %span.path,
            status,
            elapsed_ms = span.elapsed_ms(),
            "attempt succeeded"
        );
    }

    pub fn finish_failure(&self, span: RequestSpan, failure: &AttemptFailure) {
        self.metrics.record(&self.metrics.failures);
        if matches!(failure, AttemptFailure::Transport(TransportError::Timeout)) {
            self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        log_at!(
            self.config.error_level,
            method = %span.method,
            host = %span.host,
            path = %span.path,
            elapsed_ms = span.elapsed_ms(),
            error = %failure,
            "attempt failed"
        );
    }

    /// The attempt finished after its operation was cancelled.
    pub fn finish_discarded(&self, span: RequestSpan) {
        self.metrics.record(&self.metrics.discarded);
        debug!(
            target: "search_api::http",
            host = %span.host,
            path = %span.path,
            elapsed_ms = span.elapsed_ms(),
            "attempt result discarded, operation cancelled"
        );
    }
}

/// An attempt being timed.
#[derive(Debug)]
pub struct RequestSpan {
    method: String,
    host: String,
    path: String,
    start: Instant,
}

impl RequestSpan {
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
