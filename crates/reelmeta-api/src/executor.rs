//! `RequestExecutor` - authenticated, rate-limited, retried, instrumented requests.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::Instrument;
use url::Url;

use crate::error::{ApiError, ResourceRef, Result, classify_response};
use crate::metrics::{MetricsSink, NoopMetrics, RequestLabels};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Default sustained request rate (TMDB allows roughly 40 req/s).
const DEFAULT_REQUESTS_PER_SECOND: u32 = 40;

/// Default User-Agent.
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Placeholder written over credentials in URLs that leave the executor.
const REDACTED: &str = "***";

/// How credentials are attached to each request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <token>` (TMDB v4 read access token).
    Bearer(String),
    /// API key as a query parameter, e.g. `apikey=` for OMDb.
    QueryKey {
        /// Parameter name.
        param: String,
        /// Key value.
        key: String,
    },
    /// No credentials.
    None,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::QueryKey { param, .. } => write!(f, "QueryKey({param}=***)"),
            Self::None => f.write_str("None"),
        }
    }
}

impl Auth {
    /// Bearer token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// Query parameter credentials.
    pub fn query_key(param: impl Into<String>, key: impl Into<String>) -> Self {
        Self::QueryKey {
            param: param.into(),
            key: key.into(),
        }
    }
}

/// Describes one logical request relative to the executor's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the base URL; a leading `/` is ignored.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Target resource, used to fill `NotFound` errors.
    pub resource: Option<ResourceRef>,
}

impl ApiRequest {
    /// A GET request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            resource: None,
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Appends a query parameter when `value` is `Some`.
    #[must_use]
    pub fn query_opt(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(name, v),
            None => self,
        }
    }

    /// Names the resource this request targets.
    #[must_use]
    pub fn resource(mut self, kind: impl Into<String>, id: impl std::fmt::Display) -> Self {
        self.resource = Some(ResourceRef::new(kind, id));
        self
    }
}

/// Executes requests against one API target.
///
/// Every logical request passes, in order: URL composition, credential injection,
/// rate-limit admission, transport, status classification and JSON decoding, with
/// the retry policy wrapped around admission through decoding. One span, one
/// metrics set and one completion/failure log are emitted per logical request.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RequestExecutor<T = ReqwestTransport> {
    /// HTTP send primitive.
    transport: T,
    /// Base URL, always ending with `/`.
    base_url: Url,
    /// Credentials.
    auth: Auth,
    /// Admission control, possibly shared with other executors.
    rate_limiter: Arc<RateLimiter>,
    /// Retry policy.
    retry_policy: RetryPolicy,
    /// Metrics sink.
    metrics: Arc<dyn MetricsSink>,
    /// Deadline for one logical request, retries included.
    timeout: Option<Duration>,
}

/// Builder for `RequestExecutor`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RequestExecutorBuilder {
    base_url: Option<Url>,
    auth: Auth,
    requests_per_second: Option<u32>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry_policy: RetryPolicy,
    metrics: Option<Arc<dyn MetricsSink>>,
    timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl RequestExecutorBuilder {
    /// Creates a new builder.
    fn new() -> Self {
        Self {
            base_url: None,
            auth: Auth::None,
            requests_per_second: None,
            rate_limiter: None,
            retry_policy: RetryPolicy::default(),
            metrics: None,
            timeout: None,
            attempt_timeout: None,
            user_agent: None,
        }
    }

    /// Sets the base URL (required). Paths are resolved below it.
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the credentials (default: none).
    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the sustained request rate (default: 40/s). Ignored if a limiter is supplied.
    #[must_use]
    pub const fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    /// Uses an existing limiter, e.g. one shared with other executors for the same target.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets the retry policy (default: 3 retries, 100ms doubling, 10s cap).
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the metrics sink (default: discard).
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets a deadline for each logical request, retries and waits included.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a transport-level timeout for each attempt (`reqwest` only).
    #[must_use]
    pub const fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent (`reqwest` only).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds an executor over a `reqwest` transport.
    ///
    /// # Errors
    ///
    /// - `base_url` is not set or cannot be a base.
    /// - `requests_per_second` is zero.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> anyhow::Result<RequestExecutor> {
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_USER_AGENT));
        let transport = ReqwestTransport::new(&user_agent, self.attempt_timeout)?;
        self.build_with_transport(transport)
    }

    /// Builds an executor over any transport.
    ///
    /// # Errors
    ///
    /// - `base_url` is not set or cannot be a base.
    /// - `requests_per_second` is zero.
    pub fn build_with_transport<T: HttpTransport>(
        self,
        transport: T,
    ) -> anyhow::Result<RequestExecutor<T>> {
        let base_url = self.base_url.context("base_url is required")?;
        let base_url = normalize_base_url(base_url)?;

        let rate_limiter = if let Some(limiter) = self.rate_limiter {
            limiter
        } else {
            let rps = self
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
            let rps = NonZeroU32::new(rps).context("requests_per_second must be positive")?;
            Arc::new(RateLimiter::token_bucket(rps))
        };

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn MetricsSink>);

        Ok(RequestExecutor {
            transport,
            base_url,
            auth: self.auth,
            rate_limiter,
            retry_policy: self.retry_policy,
            metrics,
            timeout: self.timeout,
        })
    }
}

/// Ensures the base URL can be joined against and ends with `/`.
fn normalize_base_url(mut url: Url) -> anyhow::Result<Url> {
    if url.cannot_be_a_base() {
        bail!("base_url cannot be a base: {url}");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl RequestExecutor {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::new()
    }
}

impl<T: HttpTransport + Sync> RequestExecutor<T> {
    /// The base URL paths are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The limiter gating this executor.
    #[must_use]
    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `GET path` and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a classified `ApiError`; see [`RequestExecutor::execute`].
    pub async fn get<D: DeserializeOwned>(&self, path: &str) -> Result<D> {
        self.execute(&ApiRequest::get(path)).await
    }

    /// Executes `request` and decodes the JSON response into `D`.
    ///
    /// # Errors
    ///
    /// - `Network`, `RateLimit`, `Server` once retries are exhausted.
    /// - `Authentication`, `NotFound`, `Validation`, `Api` on first occurrence.
    /// - `Validation` when the body does not decode into `D`.
    /// - `Timeout` when the configured deadline fires.
    pub async fn execute<D: DeserializeOwned>(&self, request: &ApiRequest) -> Result<D> {
        let span = tracing::info_span!(
            "api.request",
            http.method = %request.method,
            url.path = %request.path,
        );
        self.execute_instrumented(request).instrument(span).await
    }

    async fn execute_instrumented<D: DeserializeOwned>(&self, request: &ApiRequest) -> Result<D> {
        let labels = RequestLabels {
            method: request.method.as_str(),
            path: &request.path,
        };
        let started = Instant::now();
        tracing::debug!(method = %request.method, path = %request.path, "request started");
        self.metrics.record_request(&labels);

        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.execute_with_retry(request))
                .await
                .unwrap_or(Err(ApiError::Timeout { timeout })),
            None => self.execute_with_retry(request).await,
        };

        self.report(request, &outcome, started.elapsed());
        outcome
    }

    /// Records the outcome of one logical request: duration, failure kind, log line.
    fn report<D>(&self, request: &ApiRequest, outcome: &Result<D>, elapsed: Duration) {
        let labels = RequestLabels {
            method: request.method.as_str(),
            path: &request.path,
        };
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_duration(&labels, elapsed);
        match outcome {
            Ok(_) => {
                tracing::info!(
                    method = %request.method,
                    path = %request.path,
                    elapsed_ms = elapsed_ms,
                    "request completed"
                );
            }
            Err(err) => {
                self.metrics.record_error(&labels, err.kind());
                tracing::error!(
                    method = %request.method,
                    path = %request.path,
                    error_kind = %err.kind(),
                    elapsed_ms = elapsed_ms,
                    error = %err,
                    "request failed"
                );
            }
        }
    }

    async fn execute_with_retry<D: DeserializeOwned>(&self, request: &ApiRequest) -> Result<D> {
        let url = self.request_url(request)?;
        self.retry_policy
            .run(|_attempt| self.attempt(request, url.clone()))
            .await
    }

    /// One attempt: admission, send, classification, decoding.
    async fn attempt<D: DeserializeOwned>(&self, request: &ApiRequest, url: Url) -> Result<D> {
        let mut headers = vec![(String::from("Accept"), String::from("application/json"))];
        if let Auth::Bearer(token) = &self.auth {
            headers.push((String::from("Authorization"), format!("Bearer {token}")));
        }
        let http_request = HttpRequest {
            method: request.method.clone(),
            url,
            headers,
        };
        let redacted = self.redact(&http_request.url);

        let response = self
            .rate_limiter
            .execute(|| self.transport.send(http_request))
            .await
            .map_err(|e| ApiError::network(Some(redacted), e))?;

        if !response.is_success() {
            return Err(classify_response(&response, request.resource.as_ref()));
        }

        serde_json::from_str(&response.body).map_err(|e| ApiError::from_decode(&e))
    }

    /// Resolves `request` against the base URL and attaches query credentials.
    fn request_url(&self, request: &ApiRequest) -> Result<Url> {
        let relative = request.path.trim_start_matches('/');
        // `./` keeps a leading `name:` segment from being parsed as a scheme.
        let mut url = self.base_url.join(&format!("./{relative}")).map_err(|e| {
            ApiError::invalid_field(format!("invalid request path: {e}"), "path", relative)
        })?;
        if !url.path().starts_with(self.base_url.path()) {
            return Err(ApiError::invalid_field(
                "request path resolves outside the base URL",
                "path",
                relative,
            ));
        }

        if !request.query.is_empty() || matches!(self.auth, Auth::QueryKey { .. }) {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
            if let Auth::QueryKey { param, key } = &self.auth {
                pairs.append_pair(param, key);
            }
        }
        Ok(url)
    }

    /// Returns `url` as a string with any query-key credential masked.
    fn redact(&self, url: &Url) -> String {
        let Auth::QueryKey { param, .. } = &self.auth else {
            return url.to_string();
        };
        let mut masked = url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == param.as_str() {
                    String::from(REDACTED)
                } else {
                    v.into_owned()
                };
                (k.into_owned(), v)
            })
            .collect();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
        masked.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use serde::Deserialize;
    use tracing::subscriber::with_default;
    use tracing_mock::{expect, subscriber};

    use super::*;
    use crate::error::ErrorKind;
    use crate::metrics::RecordingMetrics;
    use crate::transport::testing::ScriptedTransport;

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Movie {
        id: u64,
        title: String,
    }

    const MOVIE_JSON: &str = r#"{"id":550,"title":"Fight Club"}"#;

    fn executor(
        outcomes: Vec<std::result::Result<crate::transport::HttpResponse, crate::transport::TransportError>>,
        metrics: Arc<RecordingMetrics>,
    ) -> RequestExecutor<ScriptedTransport> {
        RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .auth(Auth::bearer("tok"))
            .rate_limiter(Arc::new(RateLimiter::immediate()))
            .metrics(metrics)
            .build_with_transport(ScriptedTransport::new(outcomes))
            .unwrap()
    }

    #[test]
    fn test_builder_requires_base_url() {
        // Arrange & Act
        let result = RequestExecutor::builder().build();

        // Assert
        assert!(result.unwrap_err().to_string().contains("base_url is required"));
    }

    #[test]
    fn test_builder_rejects_zero_rate() {
        // Arrange & Act
        let result = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .requests_per_second(0)
            .build();

        // Assert
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("requests_per_second must be positive")
        );
    }

    #[test]
    fn test_builder_appends_trailing_slash() {
        // Arrange & Act
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3").unwrap())
            .build()
            .unwrap();

        // Assert
        assert_eq!(executor.base_url().as_str(), "https://api.example.test/3/");
        assert_eq!(
            executor.rate_limiter().requests_per_second(),
            NonZeroU32::new(40)
        );
    }

    #[tokio::test]
    async fn test_request_composition_and_bearer_header() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(
            vec![ScriptedTransport::status(200, MOVIE_JSON)],
            Arc::clone(&metrics),
        );

        // Act
        let movie: Movie = executor
            .execute(&ApiRequest::get("/movie/550").query("language", "en-US"))
            .await
            .unwrap();

        // Assert
        assert_eq!(movie.title, "Fight Club");
        let requests = executor.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url.as_str(),
            "https://api.example.test/3/movie/550?language=en-US"
        );
        assert!(
            requests[0]
                .headers
                .contains(&(String::from("Authorization"), String::from("Bearer tok")))
        );
        assert!(
            requests[0]
                .headers
                .contains(&(String::from("Accept"), String::from("application/json")))
        );
    }

    #[tokio::test]
    async fn test_path_segment_with_colon_stays_under_base() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(
            vec![ScriptedTransport::status(200, MOVIE_JSON)],
            Arc::clone(&metrics),
        );

        // Act
        let movie: Movie = executor.get("v1:search").await.unwrap();

        // Assert
        assert_eq!(movie.id, 550);
        assert_eq!(
            executor.transport().requests()[0].url.as_str(),
            "https://api.example.test/3/v1:search"
        );
    }

    #[tokio::test]
    async fn test_path_climbing_above_base_is_rejected() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(
            vec![ScriptedTransport::status(200, MOVIE_JSON)],
            Arc::clone(&metrics),
        );

        // Act
        let parent: Result<Movie> = executor.get("../admin").await;
        let nested: Result<Movie> = executor.get("movie/../../../x").await;
        let sibling: Movie = executor.get("movie/../tv/1").await.unwrap();

        // Assert
        for err in [parent.unwrap_err(), nested.unwrap_err()] {
            match err {
                ApiError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("path")),
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(sibling.id, 550);
        let requests = executor.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "https://api.example.test/3/tv/1");
    }

    #[tokio::test]
    async fn test_query_key_auth_and_redaction() {
        // Arrange
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://www.omdbapi.com/").unwrap())
            .auth(Auth::query_key("apikey", "secret"))
            .rate_limiter(Arc::new(RateLimiter::immediate()))
            .retry_policy(RetryPolicy::none())
            .build_with_transport(ScriptedTransport::new(vec![ScriptedTransport::refused()]))
            .unwrap();

        // Act
        let result: Result<serde_json::Value> = executor
            .execute(&ApiRequest::get("").query("i", "tt0137523"))
            .await;

        // Assert
        let requests = executor.transport().requests();
        assert_eq!(
            requests[0].url.as_str(),
            "https://www.omdbapi.com/?i=tt0137523&apikey=secret"
        );
        assert!(!requests[0].headers.iter().any(|(k, _)| k == "Authorization"));
        let err = result.unwrap_err();
        assert_eq!(
            err,
            ApiError::network(
                Some(String::from("https://www.omdbapi.com/?i=tt0137523&apikey=***")),
                "connection refused"
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_metered_once() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(
            vec![
                ScriptedTransport::status(503, "busy"),
                ScriptedTransport::refused(),
                ScriptedTransport::status(200, MOVIE_JSON),
            ],
            Arc::clone(&metrics),
        );

        // Act
        let movie: Movie = executor.get("movie/550").await.unwrap();

        // Assert
        assert_eq!(movie.id, 550);
        assert_eq!(executor.transport().requests().len(), 3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.error_count(), 0);
        assert_eq!(snapshot.total_duration, Duration::from_millis(300));
        assert_eq!(snapshot.latency.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_exhausts_budget() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(vec![ScriptedTransport::refused()], Arc::clone(&metrics));

        // Act
        let result: Result<Movie> = executor.get("movie/550").await;

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(executor.transport().requests().len(), 4);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.errors.get(&ErrorKind::Network), Some(&1));
    }

    #[tokio::test]
    async fn test_not_found_fails_immediately_with_context() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(
            vec![ScriptedTransport::status(404, r#"{"status_code":34}"#)],
            Arc::clone(&metrics),
        );

        // Act
        let result: Result<Movie> = executor
            .execute(&ApiRequest::get("movie/1").resource("movie", 1))
            .await;

        // Assert
        assert_eq!(result.unwrap_err(), ApiError::not_found("movie", 1));
        assert_eq!(executor.transport().requests().len(), 1);
        assert_eq!(metrics.snapshot().errors.get(&ErrorKind::NotFound), Some(&1));
    }

    #[tokio::test]
    async fn test_decode_failure_is_terminal_validation() {
        // Arrange
        let executor = executor(
            vec![ScriptedTransport::status(200, r#"{"id":550}"#)],
            Arc::new(RecordingMetrics::new()),
        );

        // Act
        let result: Result<Movie> = executor.get("movie/550").await;

        // Assert
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(executor.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_mid_retry() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .rate_limiter(Arc::new(RateLimiter::immediate()))
            .metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
            .timeout(Duration::from_millis(250))
            .build_with_transport(ScriptedTransport::new(vec![ScriptedTransport::status(
                503, "busy",
            )]))
            .unwrap();

        // Act
        let result: Result<Movie> = executor.get("movie/550").await;

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ApiError::Timeout {
                timeout: Duration::from_millis(250)
            }
        );
        assert_eq!(executor.transport().requests().len(), 2);
        assert_eq!(metrics.snapshot().errors.get(&ErrorKind::Timeout), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_rate_limit_wait() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let limiter = Arc::new(RateLimiter::token_bucket(NonZeroU32::new(1).unwrap()));
        limiter.acquire().await;
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .rate_limiter(Arc::clone(&limiter))
            .metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
            .timeout(Duration::from_millis(100))
            .build_with_transport(ScriptedTransport::new(vec![ScriptedTransport::status(
                200, MOVIE_JSON,
            )]))
            .unwrap();

        // Act
        let start = Instant::now();
        let result: Result<Movie> = executor.get("movie/550").await;

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ApiError::Timeout {
                timeout: Duration::from_millis(100)
            }
        );
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert!(executor.transport().requests().is_empty());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.errors.get(&ErrorKind::Timeout), Some(&1));
        assert_eq!(snapshot.latency.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_transport() {
        // Arrange
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .rate_limiter(Arc::new(RateLimiter::immediate()))
            .metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
            .timeout(Duration::from_millis(250))
            .build_with_transport(
                ScriptedTransport::new(vec![ScriptedTransport::status(200, MOVIE_JSON)])
                    .delayed(Duration::from_secs(1)),
            )
            .unwrap();

        // Act
        let result: Result<Movie> = executor.get("movie/550").await;

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ApiError::Timeout {
                timeout: Duration::from_millis(250)
            }
        );
        assert_eq!(executor.transport().requests().len(), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.error_count(), 1);
        assert_eq!(snapshot.errors.get(&ErrorKind::Timeout), Some(&1));
        assert_eq!(snapshot.latency.total(), 1);
        assert_eq!(snapshot.total_duration, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_gates_attempts() {
        // Arrange
        let executor = RequestExecutor::builder()
            .base_url(Url::parse("https://api.example.test/3/").unwrap())
            .requests_per_second(2)
            .build_with_transport(ScriptedTransport::new(vec![ScriptedTransport::status(
                200, MOVIE_JSON,
            )]))
            .unwrap();

        // Act
        let start = Instant::now();
        for _ in 0..4 {
            let _: Movie = executor.get("movie/550").await.unwrap();
        }

        // Assert
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_report_logs_completion_at_info() {
        // Arrange
        let (subscriber, handle) = subscriber::mock()
            .event(
                expect::event()
                    .at_level(tracing::Level::INFO)
                    .with_fields(expect::msg("request completed")),
            )
            .only()
            .run_with_handle();
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(Vec::new(), Arc::clone(&metrics));
        let outcome: Result<u32> = Ok(1);

        // Act
        with_default(subscriber, || {
            executor.report(
                &ApiRequest::get("movie/550"),
                &outcome,
                Duration::from_millis(12),
            );
        });

        // Assert
        handle.assert_finished();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_duration, Duration::from_millis(12));
        assert_eq!(snapshot.error_count(), 0);
    }

    #[test]
    fn test_report_logs_failure_at_error() {
        // Arrange
        let (subscriber, handle) = subscriber::mock()
            .event(
                expect::event()
                    .at_level(tracing::Level::ERROR)
                    .with_fields(expect::msg("request failed")),
            )
            .only()
            .run_with_handle();
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = executor(Vec::new(), Arc::clone(&metrics));
        let outcome: Result<u32> = Err(ApiError::not_found("movie", 1));

        // Act
        with_default(subscriber, || {
            executor.report(
                &ApiRequest::get("movie/1"),
                &outcome,
                Duration::from_millis(3),
            );
        });

        // Assert
        handle.assert_finished();
        assert_eq!(
            metrics.snapshot().errors.get(&ErrorKind::NotFound),
            Some(&1)
        );
    }
}
