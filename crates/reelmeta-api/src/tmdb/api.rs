//! `TmdbApi` trait definition and search streams built on it.
#![allow(clippy::future_not_send)]

use futures::Stream;

use super::types::{
    MovieDetails, MovieSearchResult, SearchMovieParams, SearchTvParams, TvDetails, TvSearchResult,
};
use crate::error::Result;
use crate::pagination::{PaginateOptions, PaginatedResponse, paginate};

/// TMDB API trait.
///
/// Abstracts API operations for mock substitution in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(TmdbApi: Send)]
pub trait LocalTmdbApi {
    /// Fetches movie details.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown ID, or any executor error.
    async fn movie_details(&self, movie_id: u64, language: &str) -> Result<MovieDetails>;

    /// Fetches TV series details including season list.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown ID, or any executor error.
    async fn tv_details(&self, series_id: u64, language: &str) -> Result<TvDetails>;

    /// Fetches one page of movie search results.
    ///
    /// # Errors
    ///
    /// Returns an executor error.
    async fn search_movie(
        &self,
        params: &SearchMovieParams,
        page: u32,
    ) -> Result<PaginatedResponse<MovieSearchResult>>;

    /// Fetches one page of TV series search results.
    ///
    /// # Errors
    ///
    /// Returns an executor error.
    async fn search_tv(
        &self,
        params: &SearchTvParams,
        page: u32,
    ) -> Result<PaginatedResponse<TvSearchResult>>;
}

/// Streams movie search results across pages, fetching lazily.
pub fn search_movies<'a, A: LocalTmdbApi>(
    api: &'a A,
    params: &'a SearchMovieParams,
    options: PaginateOptions,
) -> impl Stream<Item = Result<MovieSearchResult>> + 'a {
    paginate(move |page| api.search_movie(params, page), options)
}

/// Streams TV series search results across pages, fetching lazily.
pub fn search_tv_series<'a, A: LocalTmdbApi>(
    api: &'a A,
    params: &'a SearchTvParams,
    options: PaginateOptions,
) -> impl Stream<Item = Result<TvSearchResult>> + 'a {
    paginate(move |page| api.search_tv(params, page), options)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::arithmetic_side_effects)]

    use std::sync::Mutex;

    use futures::{StreamExt, TryStreamExt};

    use super::*;
    use crate::error::ApiError;

    /// In-memory TMDB with `total` search hits, `page_size` per page.
    struct FakeTmdb {
        total: u32,
        page_size: u32,
        pages: Mutex<Vec<u32>>,
    }

    impl FakeTmdb {
        fn new(total: u32, page_size: u32) -> Self {
            Self {
                total,
                page_size,
                pages: Mutex::new(Vec::new()),
            }
        }

        fn page_of<T>(&self, page: u32, make: impl Fn(u32) -> T) -> PaginatedResponse<T> {
            self.pages.lock().unwrap().push(page);
            let first = (page - 1) * self.page_size;
            let last = (first + self.page_size).min(self.total);
            PaginatedResponse {
                page,
                results: (first..last).map(make).collect(),
                total_pages: self.total.div_ceil(self.page_size),
                total_results: u64::from(self.total),
            }
        }
    }

    impl TmdbApi for FakeTmdb {
        async fn movie_details(&self, movie_id: u64, _language: &str) -> Result<MovieDetails> {
            Err(ApiError::not_found("movie", movie_id))
        }

        async fn tv_details(&self, series_id: u64, _language: &str) -> Result<TvDetails> {
            Err(ApiError::not_found("tv", series_id))
        }

        async fn search_movie(
            &self,
            params: &SearchMovieParams,
            page: u32,
        ) -> Result<PaginatedResponse<MovieSearchResult>> {
            Ok(self.page_of(page, |n| MovieSearchResult {
                id: u64::from(n),
                title: format!("{} {n}", params.query),
                original_title: None,
                original_language: None,
                release_date: None,
                overview: None,
                popularity: 0.0,
                vote_average: 0.0,
                genre_ids: Vec::new(),
            }))
        }

        async fn search_tv(
            &self,
            params: &SearchTvParams,
            page: u32,
        ) -> Result<PaginatedResponse<TvSearchResult>> {
            Ok(self.page_of(page, |n| TvSearchResult {
                id: u64::from(n),
                name: format!("{} {n}", params.query),
                original_name: None,
                original_language: None,
                origin_country: Vec::new(),
                first_air_date: None,
                overview: None,
                popularity: 0.0,
                vote_average: 0.0,
            }))
        }
    }

    #[tokio::test]
    async fn test_search_movies_streams_all_pages() {
        // Arrange
        let api = FakeTmdb::new(45, 20);
        let params = SearchMovieParams::new("Alien");

        // Act
        let results: Vec<MovieSearchResult> =
            search_movies(&api, &params, PaginateOptions::default())
                .try_collect()
                .await
                .unwrap();

        // Assert
        assert_eq!(results.len(), 45);
        assert_eq!(results[44].title, "Alien 44");
        assert_eq!(*api.pages.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_search_tv_series_respects_bounds() {
        // Arrange
        let api = FakeTmdb::new(100, 20);
        let params = SearchTvParams::new("Star Trek");
        let options = PaginateOptions::default().start_page(2).max_results(25);

        // Act
        let ids: Vec<u64> = search_tv_series(&api, &params, options)
            .map_ok(|tv| tv.id)
            .try_collect()
            .await
            .unwrap();

        // Assert
        assert_eq!(ids, (20..45).collect::<Vec<_>>());
        assert_eq!(*api.pages.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_search_stream_is_lazy() {
        // Arrange
        let api = FakeTmdb::new(1_000, 20);
        let params = SearchMovieParams::new("Alien");

        // Act
        let first: Vec<_> = search_movies(&api, &params, PaginateOptions::default())
            .take(3)
            .collect()
            .await;

        // Assert
        assert_eq!(first.len(), 3);
        assert_eq!(*api.pages.lock().unwrap(), vec![1]);
    }
}
