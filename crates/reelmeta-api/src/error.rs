//! Closed error taxonomy and the status-code classification boundary.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::transport::HttpResponse;

/// Maximum number of body bytes kept in an error message.
const BODY_PREVIEW_LEN: usize = 500;

/// Extracts the field name from `serde_json` messages such as ``missing field `id` ``.
#[allow(clippy::expect_used)]
static DECODE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:missing|unknown|duplicate) field `([^`]+)`")
        .expect("failed to compile decode field regex")
});

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Every failure a request can end in.
///
/// The set is closed: callers may match exhaustively. Each variant carries
/// enough context to decide retry eligibility without the original response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ApiError {
    /// The transport failed before any response arrived.
    #[error("network error{}: {cause}", fmt_url(.url.as_deref()))]
    Network {
        /// Target URL (credentials redacted), if known.
        url: Option<String>,
        /// Underlying cause.
        cause: String,
    },

    /// HTTP 401 or 403.
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication {
        /// Raw status code.
        status: u16,
        /// Message reported by the API.
        message: String,
    },

    /// HTTP 404.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource kind, `"unknown"` when the caller supplied none.
        resource: String,
        /// Resource identifier, `"unknown"` when the caller supplied none.
        id: String,
    },

    /// HTTP 400/422, or a response body that does not decode.
    #[error("validation error{}: {message}", fmt_field(.field.as_deref()))]
    Validation {
        /// Description of the problem.
        message: String,
        /// Offending field, if known.
        field: Option<String>,
        /// Offending value, if known.
        value: Option<String>,
    },

    /// HTTP 429.
    #[error("rate limited{}", fmt_retry_after(.retry_after.as_ref()))]
    RateLimit {
        /// `Retry-After` in seconds.
        retry_after: Option<u64>,
        /// `X-RateLimit-Limit`.
        limit: Option<u64>,
        /// `X-RateLimit-Remaining`.
        remaining: Option<u64>,
        /// `X-RateLimit-Reset`.
        reset: Option<DateTime<Utc>>,
    },

    /// HTTP 5xx.
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// Raw status code.
        status: u16,
        /// Message reported by the API.
        message: String,
    },

    /// The logical call exceeded its deadline.
    #[error("request timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The deadline that fired.
        timeout: Duration,
    },

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// Raw status code.
        status: u16,
        /// Message reported by the API.
        message: String,
    },
}

/// Fieldless mirror of [`ApiError`], used for log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(clippy::module_name_repetitions)]
pub enum ErrorKind {
    /// [`ApiError::Network`].
    Network,
    /// [`ApiError::Authentication`].
    Authentication,
    /// [`ApiError::NotFound`].
    NotFound,
    /// [`ApiError::Validation`].
    Validation,
    /// [`ApiError::RateLimit`].
    RateLimit,
    /// [`ApiError::Server`].
    Server,
    /// [`ApiError::Timeout`].
    Timeout,
    /// [`ApiError::Api`].
    Api,
}

impl ErrorKind {
    /// Stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::Authentication => "authentication_error",
            Self::NotFound => "not_found_error",
            Self::Validation => "validation_error",
            Self::RateLimit => "rate_limit_error",
            Self::Server => "server_error",
            Self::Timeout => "timeout_error",
            Self::Api => "generic_api_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the resource a request targets, used to fill [`ApiError::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Resource kind, e.g. `"movie"`.
    pub kind: String,
    /// Resource identifier.
    pub id: String,
}

impl ResourceRef {
    /// Creates a resource reference.
    pub fn new(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

impl ApiError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Api { .. } => ErrorKind::Api,
        }
    }

    /// Whether the retry policy may attempt the request again.
    ///
    /// True exactly for network, rate-limit and server errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimit { .. } | Self::Server { .. }
        )
    }

    /// Builds a [`ApiError::Network`].
    pub fn network(url: Option<String>, cause: impl fmt::Display) -> Self {
        Self::Network {
            url,
            cause: cause.to_string(),
        }
    }

    /// Builds a [`ApiError::Validation`] without field information.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
            value: None,
        }
    }

    /// Builds a [`ApiError::Validation`] naming the offending field and value.
    pub fn invalid_field(
        message: impl Into<String>,
        field: impl Into<String>,
        value: impl fmt::Display,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            value: Some(value.to_string()),
        }
    }

    /// Builds a [`ApiError::NotFound`].
    pub fn not_found(resource: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Maps a JSON decode failure to [`ApiError::Validation`].
    #[must_use]
    pub fn from_decode(err: &serde_json::Error) -> Self {
        let message = err.to_string();
        let field = DECODE_FIELD_RE
            .captures(&message)
            .and_then(|caps| caps.get(1))
            .map(|m| String::from(m.as_str()));
        Self::Validation {
            message: format!("failed to decode response: {message}"),
            field,
            value: None,
        }
    }
}

/// Classifies a non-success response.
///
/// `resource` fills [`ApiError::NotFound`]; without it both fields read `"unknown"`.
#[must_use]
pub fn classify_response(response: &HttpResponse, resource: Option<&ResourceRef>) -> ApiError {
    let status = response.status;
    match status {
        401 | 403 => ApiError::Authentication {
            status,
            message: error_message(&response.body),
        },
        404 => resource.map_or_else(
            || ApiError::not_found("unknown", "unknown"),
            |r| ApiError::not_found(r.kind.clone(), &r.id),
        ),
        429 => ApiError::RateLimit {
            retry_after: response.header("retry-after").and_then(parse_retry_after),
            limit: parse_u64_header(response, "x-ratelimit-limit"),
            remaining: parse_u64_header(response, "x-ratelimit-remaining"),
            reset: parse_u64_header(response, "x-ratelimit-reset")
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        },
        400 | 422 => ApiError::Validation {
            message: error_message(&response.body),
            field: None,
            value: None,
        },
        s if s >= 500 => ApiError::Server {
            status,
            message: error_message(&response.body),
        },
        _ => ApiError::Api {
            status,
            message: error_message(&response.body),
        },
    }
}

/// Error envelope shapes used by TMDB (`status_message`), OMDb (`Error`) and others.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    status_message: Option<String>,
    message: Option<String>,
    error: Option<String>,
    #[serde(rename = "Error")]
    error_pascal: Option<String>,
}

/// Picks a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = envelope
            .status_message
            .or(envelope.message)
            .or(envelope.error)
            .or(envelope.error_pascal)
    {
        return message;
    }
    if body.is_empty() {
        return String::from("<empty body>");
    }
    let mut end = body.len().min(BODY_PREVIEW_LEN);
    while !body.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    body.get(..end).map_or_else(String::new, String::from)
}

/// Parses `Retry-After` as delta-seconds or an HTTP-date.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc).signed_duration_since(Utc::now());
    Some(u64::try_from(delta.num_seconds()).unwrap_or(0))
}

fn parse_u64_header(response: &HttpResponse, name: &str) -> Option<u64> {
    response.header(name)?.trim().parse().ok()
}

fn fmt_url(url: Option<&str>) -> String {
    url.map_or_else(String::new, |u| format!(" ({u})"))
}

fn fmt_field(field: Option<&str>) -> String {
    field.map_or_else(String::new, |f| format!(" in `{f}`"))
}

fn fmt_retry_after(retry_after: Option<&u64>) -> String {
    retry_after.map_or_else(String::new, |secs| format!(" (retry after {secs}s)"))
}
