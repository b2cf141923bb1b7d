//! Client core for movie/TV metadata APIs.
//!
//! Every request goes through one pipeline: a shared token-bucket
//! [`RateLimiter`], a [`RequestExecutor`] that authenticates, classifies the
//! response into the closed [`ApiError`] taxonomy, retries transient failures and
//! records metrics, and, for list endpoints, a lazy [`pagination`] stream.
//!
//! Provider clients for TMDB ([`tmdb`]) and OMDb ([`omdb`]) are built on top.

/// Error taxonomy and status-code classification.
pub mod error;

/// Request pipeline.
pub mod executor;

/// Request metrics sinks.
pub mod metrics;

/// OMDb API client.
pub mod omdb;

/// Lazy pagination engine.
pub mod pagination;

/// Token-bucket rate limiter.
pub mod rate_limiter;

/// Retry policy.
pub mod retry;

/// TMDB API client.
pub mod tmdb;

/// HTTP transport abstraction.
pub mod transport;

pub use error::{ApiError, ErrorKind, ResourceRef, Result};
pub use executor::{ApiRequest, Auth, RequestExecutor, RequestExecutorBuilder};
pub use metrics::{MetricsSink, NoopMetrics, RecordingMetrics};
pub use pagination::{
    PaginateOptions, PaginatedResponse, collect_all_pages, map_paginated,
    map_paginated_concurrent, paginate,
};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, LocalHttpTransport, TransportError};

#[cfg(feature = "otel")]
pub use metrics::OtelMetrics;
