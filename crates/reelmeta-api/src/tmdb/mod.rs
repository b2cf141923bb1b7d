//! TMDB API client module.
//!
//! Handles requests to the TMDB API v3 endpoints (bearer-token auth)
//! and retrieves movie and TV series data.

mod api;
mod client;
mod types;

#[allow(clippy::module_name_repetitions)]
pub use api::{LocalTmdbApi, TmdbApi, search_movies, search_tv_series};
#[allow(clippy::module_name_repetitions)]
pub use client::{DEFAULT_BASE_URL, TmdbClient, TmdbClientBuilder};
pub use types::{
    Genre, MovieDetails, MovieSearchResult, SearchMovieParams, SearchTvParams, SeasonSummary,
    TvDetails, TvSearchResult,
};
