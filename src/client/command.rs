// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logical API commands and their per-call overrides.
//!
//! A [`Command`] is host-agnostic: the dispatcher turns it into one concrete
//! HTTP request per attempted host.
//!
//! # Example
//!
//! ```
//! use search_api_rs::client::{CallType, Command, RequestOptions};
//! use std::time::Duration;
//!
//! let command = Command::get("/1/indexes/products/query")
//!     .with_query("hitsPerPage", "20")
//!     .with_options(RequestOptions::new().with_timeout(Duration::from_secs(2)));
//!
//! assert_eq!(command.call_type, CallType::Read);
//! ```

use crate::client::host::CallType;
use crate::client::transport::RawRequest;
use crate::error::{Result, SearchError};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Header carrying the application id.
pub const APPLICATION_ID_HEADER: &str = "x-application-id";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Base attempt timeout; defaults to the client's read or write timeout.
    pub timeout: Option<Duration>,
    /// Extra headers, taking precedence over defaults and credentials.
    pub headers: HeaderMap,
    /// Extra query parameters, appended after the command's own.
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the base attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// One logical API call.
#[derive(Debug, Clone)]
pub struct Command {
    pub method: Method,
    /// Absolute path, e.g. `/1/indexes/products`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub call_type: CallType,
    pub options: RequestOptions,
}

impl Command {
    /// Create a command.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, call_type: CallType) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            call_type,
            options: RequestOptions::default(),
        }
    }

    /// A read command.
    #[must_use]
    pub fn read(method: Method, path: impl Into<String>) -> Self {
        Self::new(method, path, CallType::Read)
    }

    /// A write command.
    #[must_use]
    pub fn write(method: Method, path: impl Into<String>) -> Self {
        Self::new(method, path, CallType::Write)
    }

    /// `GET` as a read.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::read(Method::GET, path)
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if `value` cannot be serialized.
    pub fn with_json_body<T: Serialize>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| SearchError::Config(format!("Failed to encode request body: {e}")))?;
        self.body = Some(Bytes::from(body));
        self.options
            .headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Replace the per-call options.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Base attempt timeout given the client's defaults.
    #[must_use]
    pub fn base_timeout(&self, read_timeout: Duration, write_timeout: Duration) -> Duration {
        self.options.timeout.unwrap_or(match self.call_type {
            CallType::Read => read_timeout,
            CallType::Write => write_timeout,
        })
    }
}

/// Application id and API key sent with every request.
#[derive(Clone)]
pub struct Credentials {
    application_id: HeaderValue,
    api_key: HeaderValue,
}

impl Credentials {
    /// Validate and store credentials.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if either value is empty or not a valid
    /// header value.
    pub fn new(application_id: &str, api_key: &str) -> Result<Self> {
        if application_id.is_empty() || api_key.is_empty() {
            return Err(SearchError::Config(
                "Application id and API key are required".to_string(),
            ));
        }
        let application_id = HeaderValue::from_str(application_id)
            .map_err(|e| SearchError::Config(format!("Invalid application id: {e}")))?;
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|e| SearchError::Config(format!("Invalid API key: {e}")))?;
        api_key.set_sensitive(true);
        Ok(Self {
            application_id,
            api_key,
        })
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        self.application_id.to_str().unwrap_or_default()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("application_id", &self.application_id)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Turn a host endpoint into a base URL, defaulting to `https`.
///
/// # Errors
///
/// Returns `SearchError::Config` if the endpoint is not a valid authority.
pub fn base_url(endpoint: &str) -> Result<Url> {
    let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| SearchError::Config(format!("Invalid host {endpoint}: {e}")))?;
    if url.host_str().is_none() {
        return Err(SearchError::Config(format!("No host in {endpoint}")));
    }
    Ok(url)
}

/// Build the concrete request for one host.
///
/// Header precedence: `default_headers` < credentials < per-call headers.
///
/// # Errors
///
/// Returns `SearchError::Config` if the endpoint or the resulting request is
/// invalid.
pub fn build_request(
    endpoint: &str,
    command: &Command,
    credentials: &Credentials,
    default_headers: &HeaderMap,
) -> Result<RawRequest> {
    let mut url = base_url(endpoint)?;
    url.set_path(&command.path);
    if !command.query.is_empty() || !command.options.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in command.query.iter().chain(&command.options.query) {
            pairs.append_pair(key, value);
        }
    }

    let mut headers = default_headers.clone();
    headers.insert(
        HeaderName::from_static(APPLICATION_ID_HEADER),
        credentials.application_id.clone(),
    );
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        credentials.api_key.clone(),
    );
    for name in command.options.headers.keys() {
        headers.remove(name);
    }
    for (name, value) in &command.options.headers {
        headers.append(name.clone(), value.clone());
    }

    let mut request = http::Request::builder()
        .method(command.method.clone())
        .uri(url.as_str())
        .body(command.body.clone().unwrap_or_default())
        .map_err(|e| SearchError::Config(format!("Invalid request: {e}")))?;
    *request.headers_mut() = headers;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("APPID", "secret").unwrap()
    }

    #[test]
    fn test_credentials_validation() {
        assert!(Credentials::new("", "key").is_err());
        assert!(Credentials::new("app", "").is_err());
        assert!(Credentials::new("app", "bad\nkey").is_err());

        let creds = credentials();
        assert_eq!(creds.application_id(), "APPID");
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            base_url("app-dsn.example.net").unwrap().as_str(),
            "https://app-dsn.example.net/"
        );
        assert_eq!(
            base_url("http://127.0.0.1:8080").unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(base_url("https://").is_err());
    }

    #[test]
    fn test_build_request() {
        let command = Command::get("/1/indexes/my index/query")
            .with_query("page", "2")
            .with_options(
                RequestOptions::new()
                    .with_query("q", "red shoes")
                    .with_header(
                        HeaderName::from_static(API_KEY_HEADER),
                        HeaderValue::from_static("override"),
                    ),
            );
        let mut defaults = HeaderMap::new();
        defaults.insert("user-agent", HeaderValue::from_static("search-api-rs"));
        defaults.insert(APPLICATION_ID_HEADER, HeaderValue::from_static("ignored"));

        let request = build_request("app-dsn.example.net", &command, &credentials(), &defaults)
            .unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(
            request.uri().to_string(),
            "https://app-dsn.example.net/1/indexes/my%20index/query?page=2&q=red+shoes"
        );
        assert_eq!(request.headers()[APPLICATION_ID_HEADER], "APPID");
        assert_eq!(request.headers()[API_KEY_HEADER], "override");
        assert_eq!(request.headers()["user-agent"], "search-api-rs");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_per_call_header_keeps_every_value() {
        let mut options = RequestOptions::new();
        options
            .headers
            .append("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        options
            .headers
            .append("x-forwarded-for", HeaderValue::from_static("10.0.0.2"));
        let command = Command::get("/1/indexes/products/query").with_options(options);
        let mut defaults = HeaderMap::new();
        defaults.insert("x-forwarded-for", HeaderValue::from_static("default"));

        let request = build_request("app-dsn.example.net", &command, &credentials(), &defaults)
            .unwrap();

        let values: Vec<_> = request
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let command = Command::write(Method::POST, "/1/indexes/products")
            .with_json_body(&serde_json::json!({"objectID": "1"}))
            .unwrap();

        let request =
            build_request("app.example.net", &command, &credentials(), &HeaderMap::new()).unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.body().as_ref(), br#"{"objectID":"1"}"#);
    }

    #[test]
    fn test_base_timeout() {
        let read = Duration::from_secs(5);
        let write = Duration::from_secs(30);

        assert_eq!(Command::get("/").base_timeout(read, write), read);
        assert_eq!(
            Command::write(Method::PUT, "/").base_timeout(read, write),
            write
        );
        let custom = Command::get("/")
            .with_options(RequestOptions::new().with_timeout(Duration::from_millis(250)));
        assert_eq!(custom.base_timeout(read, write), Duration::from_millis(250));
    }
}
