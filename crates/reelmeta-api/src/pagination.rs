//! Lazy pagination over page-numbered list endpoints.
//!
//! A page-fetch function `FnMut(u32) -> Future<Output = Result<PaginatedResponse<T>>>` is
//! turned into a stream of individual items. Pages are fetched only when the consumer
//! pulls items they contain, so bounding the consumer bounds the upstream traffic.

use std::future::Future;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// One page of a list endpoint.
///
/// Field names follow TMDB's list envelope (`page`, `results`, `total_pages`,
/// `total_results`); other providers adapt into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct PaginatedResponse<T> {
    /// Page number (1-based).
    pub page: u32,
    /// Items on this page; empty on a terminal page.
    pub results: Vec<T>,
    /// Total number of pages.
    pub total_pages: u32,
    /// Total number of items across all pages.
    pub total_results: u64,
}

/// Bounds for a pagination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginateOptions {
    /// First page to fetch.
    pub start_page: u32,
    /// Maximum pages to fetch (`None` = until the last page).
    pub max_pages: Option<u32>,
    /// Maximum items to yield (`None` = all).
    pub max_results: Option<usize>,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            start_page: 1,
            max_pages: None,
            max_results: None,
        }
    }
}

impl PaginateOptions {
    /// Sets the first page.
    #[must_use]
    pub const fn start_page(mut self, page: u32) -> Self {
        self.start_page = page;
        self
    }

    /// Sets the page budget.
    #[must_use]
    pub const fn max_pages(mut self, pages: u32) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Sets the item budget.
    #[must_use]
    pub const fn max_results(mut self, results: usize) -> Self {
        self.max_results = Some(results);
        self
    }
}

/// Private per-stream cursor.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Page to fetch next; `None` once finished.
    next: Option<u32>,
    /// Pages fetched so far.
    fetched: u32,
}

/// Streams items from consecutive pages, starting at `options.start_page`.
///
/// Stops after the page whose number reaches `total_pages`, after `max_pages` pages,
/// or once `max_results` items were yielded, whichever comes first. A page fetch
/// error is yielded once and ends the stream.
///
/// A page whose `page` field differs from the requested number fails with
/// `ApiError::Validation` on field `page`.
pub fn paginate<T, F, Fut>(fetch_page: F, options: PaginateOptions) -> impl Stream<Item = Result<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
{
    let cursor = Cursor {
        next: (options.max_pages != Some(0)).then_some(options.start_page),
        fetched: 0,
    };
    let max_pages = options.max_pages;

    let pages = stream::unfold((fetch_page, cursor), move |(mut fetch_page, cursor)| async move {
        let requested = cursor.next?;
        let finished = Cursor {
            next: None,
            fetched: cursor.fetched,
        };

        let response = match fetch_page(requested).await {
            Ok(response) => response,
            Err(err) => return Some((Err(err), (fetch_page, finished))),
        };
        if response.page != requested {
            let err = ApiError::invalid_field(
                format!("expected page {requested}, got page {}", response.page),
                "page",
                response.page,
            );
            return Some((Err(err), (fetch_page, finished)));
        }

        let fetched = cursor.fetched.saturating_add(1);
        tracing::debug!(
            page = requested,
            items = response.results.len(),
            total_pages = response.total_pages,
            "fetched page"
        );

        let has_more = requested < response.total_pages && max_pages.is_none_or(|max| fetched < max);
        let next = if has_more { requested.checked_add(1) } else { None };
        if next.is_none() {
            tracing::debug!(pages_fetched = fetched, "pagination finished");
        }

        let items = stream::iter(response.results.into_iter().map(Ok::<T, ApiError>));
        Some((Ok(items), (fetch_page, Cursor { next, fetched })))
    });

    pages
        .try_flatten()
        .take(options.max_results.unwrap_or(usize::MAX))
}

/// Drains every page into memory.
///
/// Unbounded result sets grow without limit; set `max_pages` or `max_results`.
///
/// # Errors
///
/// Returns the first page fetch error; items collected so far are discarded.
pub async fn collect_all_pages<T, F, Fut>(fetch_page: F, options: PaginateOptions) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
{
    paginate(fetch_page, options).try_collect().await
}

/// Collects every item transformed by `f`.
///
/// # Errors
///
/// Returns the first page fetch error.
pub async fn map_paginated<T, U, F, Fut, M>(
    fetch_page: F,
    options: PaginateOptions,
    f: M,
) -> Result<Vec<U>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
    M: FnMut(T) -> U,
{
    paginate(fetch_page, options).map_ok(f).try_collect().await
}

/// Applies the fallible async `f` to every item with at most `concurrency`
/// transformations in flight, keeping the output in item order.
///
/// Pages are pulled as needed to keep the window full. A `concurrency` of 0 is
/// treated as 1.
///
/// # Errors
///
/// Returns the first page fetch or transformation error.
pub async fn map_paginated_concurrent<T, U, F, Fut, M, MFut>(
    fetch_page: F,
    options: PaginateOptions,
    concurrency: usize,
    f: M,
) -> Result<Vec<U>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
    M: FnMut(T) -> MFut,
    MFut: Future<Output = Result<U>>,
{
    paginate(fetch_page, options)
        .map_ok(f)
        .try_buffered(concurrency.max(1))
        .try_collect()
        .await
}
