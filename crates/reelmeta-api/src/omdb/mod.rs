//! OMDb API client module.
//!
//! Handles requests to the OMDb endpoint (API key as query parameter)
//! and retrieves title records and search hits.

mod client;
mod types;

#[allow(clippy::module_name_repetitions)]
pub use client::{DEFAULT_BASE_URL, OmdbClient, OmdbClientBuilder};
#[allow(clippy::module_name_repetitions)]
pub use types::{OmdbSearchItem, OmdbSearchParams, OmdbTitle, OmdbTitleType};
