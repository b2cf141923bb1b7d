//! `OmdbClient` - OMDb API client implementation.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::Stream;
use regex::Regex;
use tracing::instrument;
use url::Url;

use super::types::{
    Envelope, OmdbSearchItem, OmdbSearchParams, OmdbTitle, OmdbTitleType, RawSearchPage,
};
use crate::error::ApiError;
use crate::executor::{ApiRequest, Auth, RequestExecutor};
use crate::metrics::MetricsSink;
use crate::pagination::{PaginateOptions, PaginatedResponse, paginate};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Default base URL for OMDb.
pub const DEFAULT_BASE_URL: &str = "https://www.omdbapi.com/";

/// Query parameter carrying the API key.
const API_KEY_PARAM: &str = "apikey";

/// Default sustained request rate. OMDb is far stricter than TMDB.
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// OMDb returns search hits in fixed pages of 10.
const PAGE_SIZE: u64 = 10;

/// IMDb title ID pattern (e.g., `tt0137523`).
#[allow(clippy::expect_used)]
static IMDB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tt\d{7,}$").expect("failed to compile IMDb ID regex"));

/// OMDb API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct OmdbClient<T = ReqwestTransport> {
    /// Request pipeline with query-key auth.
    executor: RequestExecutor<T>,
}

/// Builder for `OmdbClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct OmdbClientBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    user_agent: Option<String>,
    requests_per_second: Option<u32>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry_policy: Option<RetryPolicy>,
    metrics: Option<Arc<dyn MetricsSink>>,
    timeout: Option<Duration>,
}

impl OmdbClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            user_agent: None,
            requests_per_second: None,
            rate_limiter: None,
            retry_policy: None,
            metrics: None,
            timeout: None,
        }
    }

    /// Overrides the base URL (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the sustained request rate (default: 10/s).
    #[must_use]
    pub const fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    /// Shares an existing rate limiter.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `api_key` is not set.
    /// - `requests_per_second` is zero.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<OmdbClient> {
        let api_key = self.api_key.context("api_key is required")?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?
        };

        let mut builder = RequestExecutor::builder()
            .base_url(base_url)
            .auth(Auth::query_key(API_KEY_PARAM, api_key))
            .requests_per_second(
                self.requests_per_second
                    .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            );
        if let Some(ua) = self.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(limiter) = self.rate_limiter {
            builder = builder.rate_limiter(limiter);
        }
        if let Some(policy) = self.retry_policy {
            builder = builder.retry_policy(policy);
        }
        if let Some(metrics) = self.metrics {
            builder = builder.metrics(metrics);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(OmdbClient {
            executor: builder.build()?,
        })
    }
}

impl OmdbClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> OmdbClientBuilder {
        OmdbClientBuilder::new()
    }
}

impl<T: HttpTransport + Sync> OmdbClient<T> {
    /// Wraps a preconfigured executor (query-key auth expected).
    #[must_use]
    pub const fn from_executor(executor: RequestExecutor<T>) -> Self {
        Self { executor }
    }

    /// The underlying request pipeline.
    #[must_use]
    pub const fn executor(&self) -> &RequestExecutor<T> {
        &self.executor
    }

    /// Looks up a title by IMDb ID.
    ///
    /// # Errors
    ///
    /// - `Validation` if `imdb_id` is malformed (no request is sent).
    /// - `NotFound` if OMDb has no such title.
    /// - Any executor error.
    #[instrument(skip_all, fields(imdb_id = imdb_id))]
    pub async fn title_by_imdb_id(&self, imdb_id: &str) -> crate::Result<OmdbTitle> {
        if !IMDB_ID_RE.is_match(imdb_id) {
            return Err(ApiError::invalid_field(
                "IMDb ID must be `tt` followed by at least 7 digits",
                "imdb_id",
                imdb_id,
            ));
        }

        let request = ApiRequest::get("")
            .query("i", imdb_id)
            .query("plot", "short")
            .resource("title", imdb_id);
        let envelope: Envelope<OmdbTitle> = self.executor.execute(&request).await?;
        match envelope {
            Envelope::Found(title) => Ok(title),
            Envelope::Failed { error } if is_not_found(&error) => {
                Err(ApiError::not_found("title", imdb_id))
            }
            Envelope::Failed { error } => Err(ApiError::validation(error)),
        }
    }

    /// Fetches one page of search hits.
    ///
    /// A query without hits yields an empty terminal page rather than an error.
    ///
    /// # Errors
    ///
    /// - `Validation` for OMDb-reported failures (e.g., "Too many results.") or a
    ///   malformed `totalResults`.
    /// - Any executor error.
    #[instrument(skip_all, fields(page = page))]
    pub async fn search_page(
        &self,
        params: &OmdbSearchParams,
        page: u32,
    ) -> crate::Result<PaginatedResponse<OmdbSearchItem>> {
        let request = ApiRequest::get("")
            .query("s", &params.query)
            .query("page", page)
            .query_opt("y", params.year)
            .query_opt("type", params.title_type.map(OmdbTitleType::as_str));

        let envelope: Envelope<RawSearchPage> = self.executor.execute(&request).await?;
        let raw = match envelope {
            Envelope::Found(raw) => raw,
            Envelope::Failed { error } if is_not_found(&error) => {
                return Ok(PaginatedResponse {
                    page,
                    results: Vec::new(),
                    total_pages: 0,
                    total_results: 0,
                });
            }
            Envelope::Failed { error } => return Err(ApiError::validation(error)),
        };

        let total_results: u64 = raw.total_results.trim().parse().map_err(|_| {
            ApiError::invalid_field(
                "totalResults is not a number",
                "totalResults",
                &raw.total_results,
            )
        })?;
        let total_pages = u32::try_from(total_results.div_ceil(PAGE_SIZE)).unwrap_or(u32::MAX);

        Ok(PaginatedResponse {
            page,
            results: raw.search,
            total_pages,
            total_results,
        })
    }

    /// Streams search hits across pages, fetching lazily.
    pub fn search<'a>(
        &'a self,
        params: &'a OmdbSearchParams,
        options: PaginateOptions,
    ) -> impl Stream<Item = crate::Result<OmdbSearchItem>> + 'a {
        paginate(move |page| self.search_page(params, page), options)
    }
}

/// Whether an OMDb error message means "no such title / no hits".
fn is_not_found(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not found")
}
