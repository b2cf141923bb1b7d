//! `TmdbClient` - TMDB API client implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::instrument;
use url::Url;

use super::api::TmdbApi;
use super::types::{
    MovieDetails, MovieSearchResult, SearchMovieParams, SearchTvParams, TvDetails, TvSearchResult,
};
use crate::executor::{ApiRequest, Auth, RequestExecutor};
use crate::metrics::MetricsSink;
use crate::pagination::PaginatedResponse;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Default base URL for TMDB API v3.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/";

/// TMDB API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClient<T = ReqwestTransport> {
    /// Request pipeline with bearer auth.
    executor: RequestExecutor<T>,
}

/// Builder for `TmdbClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct TmdbClientBuilder {
    base_url: Option<Url>,
    api_token: Option<String>,
    user_agent: Option<String>,
    requests_per_second: Option<u32>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry_policy: Option<RetryPolicy>,
    metrics: Option<Arc<dyn MetricsSink>>,
    timeout: Option<Duration>,
}

impl TmdbClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            api_token: None,
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

    /// Sets the API bearer token (required).
    #[must_use]
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the sustained request rate (default: 40/s).
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
    /// - `api_token` is not set.
    /// - `requests_per_second` is zero.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<TmdbClient> {
        let api_token = self.api_token.context("api_token is required")?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?
        };

        let mut builder = RequestExecutor::builder()
            .base_url(base_url)
            .auth(Auth::bearer(api_token));
        if let Some(ua) = self.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(rps) = self.requests_per_second {
            builder = builder.requests_per_second(rps);
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

        Ok(TmdbClient {
            executor: builder.build()?,
        })
    }
}

impl TmdbClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> TmdbClientBuilder {
        TmdbClientBuilder::new()
    }
}

impl<T: HttpTransport + Sync> TmdbClient<T> {
    /// Wraps a preconfigured executor (bearer auth expected).
    #[must_use]
    pub const fn from_executor(executor: RequestExecutor<T>) -> Self {
        Self { executor }
    }

    /// The underlying request pipeline.
    #[must_use]
    pub const fn executor(&self) -> &RequestExecutor<T> {
        &self.executor
    }
}

impl<T: HttpTransport + Sync> TmdbApi for TmdbClient<T> {
    #[instrument(skip_all, fields(movie_id = movie_id))]
    async fn movie_details(&self, movie_id: u64, language: &str) -> crate::Result<MovieDetails> {
        let request = ApiRequest::get(format!("movie/{movie_id}"))
            .query("language", language)
            .resource("movie", movie_id);
        self.executor.execute(&request).await
    }

    #[instrument(skip_all, fields(series_id = series_id))]
    async fn tv_details(&self, series_id: u64, language: &str) -> crate::Result<TvDetails> {
        let request = ApiRequest::get(format!("tv/{series_id}"))
            .query("language", language)
            .resource("tv", series_id);
        self.executor.execute(&request).await
    }

    #[instrument(skip_all, fields(page = page))]
    async fn search_movie(
        &self,
        params: &SearchMovieParams,
        page: u32,
    ) -> crate::Result<PaginatedResponse<MovieSearchResult>> {
        let request = ApiRequest::get("search/movie")
            .query("query", &params.query)
            .query("language", &params.language)
            .query("page", page)
            .query("include_adult", params.include_adult)
            .query_opt("primary_release_year", params.primary_release_year)
            .query_opt("year", params.year)
            .query_opt("region", params.region.as_deref());
        self.executor.execute(&request).await
    }

    #[instrument(skip_all, fields(page = page))]
    async fn search_tv(
        &self,
        params: &SearchTvParams,
        page: u32,
    ) -> crate::Result<PaginatedResponse<TvSearchResult>> {
        let request = ApiRequest::get("search/tv")
            .query("query", &params.query)
            .query("language", &params.language)
            .query("page", page)
            .query("include_adult", params.include_adult)
            .query_opt("first_air_date_year", params.first_air_date_year)
            .query_opt("year", params.year);
        self.executor.execute(&request).await
    }
}
