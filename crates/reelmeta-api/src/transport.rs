//! HTTP send primitive consumed by the request executor.
#![allow(clippy::future_not_send)]

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use url::Url;

/// An outgoing request, fully composed (URL, credentials, headers).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP verb.
    pub method: Method,
    /// Absolute URL including query.
    pub url: Url,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
}

/// A received response. Any status code is a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs as received.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Returns the first header with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The transport failed before a response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct TransportError {
    /// Description including the underlying cause chain.
    pub message: String,
    /// Whether the failure was a transport-level timeout.
    pub timed_out: bool,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "timed out: {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for TransportError {}

/// HTTP transport trait.
///
/// Abstracts the wire so the executor can be driven by a scripted transport in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(HttpTransport: Send)]
pub trait LocalHttpTransport {
    /// Sends a request and returns the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if no response could be obtained.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct ReqwestTransport {
    /// HTTP client (gzip enabled).
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport with the given user agent and optional per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the `reqwest::Client` build fails.
    pub fn new(user_agent: &str, attempt_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(user_agent).gzip(true);
        if let Some(timeout) = attempt_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError {
                message: format!("invalid header name {name:?}: {e}"),
                timed_out: false,
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| TransportError {
                message: format!("invalid header value for {name}: {e}"),
                timed_out: false,
            })?;
            headers.append(name, value);
        }

        let response = self
            .client
            .request(request.method, request.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (String::from(k.as_str()), String::from(v)))
            })
            .collect();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Flattens a `reqwest::Error` and its sources into a `TransportError`.
fn transport_error(err: &reqwest::Error) -> TransportError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    TransportError {
        message,
        timed_out: err.is_timeout(),
    }
}
