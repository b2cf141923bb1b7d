//! OMDb response types and search parameters.
//!
//! OMDb uses PascalCase names (with a few `imdb*` exceptions) and reports
//! missing values as `"N/A"`, which deserialize to `None` here.

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder OMDb uses for missing values.
const NOT_AVAILABLE: &str = "N/A";

/// Maps `"N/A"` (and absent values) to `None`.
fn na_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| v != NOT_AVAILABLE))
}

/// Title record from `?i=<imdb id>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "PascalCase", serialize = "camelCase"))]
#[allow(clippy::module_name_repetitions)]
pub struct OmdbTitle {
    /// Title.
    pub title: String,
    /// Year or year range (e.g., "2008–2013").
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Rating (e.g., "R").
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub rated: Option<String>,
    /// Release date (e.g., "15 Oct 1999").
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub released: Option<String>,
    /// Runtime (e.g., "139 min").
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Comma-separated genres.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Director(s).
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    /// Main cast.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub actors: Option<String>,
    /// Plot summary.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
    /// Languages.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Countries.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Poster URL.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    /// IMDb rating (e.g., "8.8").
    #[serde(
        default,
        rename(deserialize = "imdbRating"),
        deserialize_with = "na_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub imdb_rating: Option<String>,
    /// IMDb ID.
    #[serde(rename(deserialize = "imdbID"))]
    pub imdb_id: String,
    /// "movie", "series" or "episode".
    #[serde(
        default,
        rename(deserialize = "Type"),
        deserialize_with = "na_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub title_type: Option<String>,
    /// Number of seasons (series only).
    #[serde(
        default,
        rename(deserialize = "totalSeasons"),
        deserialize_with = "na_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_seasons: Option<String>,
}

/// A single search hit from `?s=<query>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "PascalCase", serialize = "camelCase"))]
#[allow(clippy::module_name_repetitions)]
pub struct OmdbSearchItem {
    /// Title.
    pub title: String,
    /// Year or year range.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// IMDb ID.
    #[serde(rename(deserialize = "imdbID"))]
    pub imdb_id: String,
    /// "movie", "series" or "episode".
    #[serde(
        default,
        rename(deserialize = "Type"),
        deserialize_with = "na_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub title_type: Option<String>,
    /// Poster URL.
    #[serde(default, deserialize_with = "na_as_none", skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
}

/// Raw search page; converted into `PaginatedResponse` by the client.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSearchPage {
    /// Hits on this page.
    #[serde(rename = "Search", default)]
    pub search: Vec<OmdbSearchItem>,
    /// Total hits, as a decimal string.
    #[serde(rename = "totalResults")]
    pub total_results: String,
}

/// OMDb wraps every 200 response in a `Response: "True" | "False"` discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Response")]
pub(crate) enum Envelope<T> {
    /// Payload present.
    #[serde(rename = "True")]
    Found(T),
    /// Request failed; OMDb still answers 200.
    #[serde(rename = "False")]
    Failed {
        /// Error message (e.g., "Movie not found!").
        #[serde(rename = "Error")]
        error: String,
    },
}

/// Title kind filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub enum OmdbTitleType {
    /// Feature films.
    Movie,
    /// TV series.
    Series,
    /// Single episodes.
    Episode,
}

impl OmdbTitleType {
    /// Query parameter value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Episode => "episode",
        }
    }
}

/// Parameters for `?s=` searches. The page is supplied per call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct OmdbSearchParams {
    /// Search query (required).
    pub query: String,
    /// Release year filter.
    pub year: Option<u32>,
    /// Title kind filter.
    pub title_type: Option<OmdbTitleType>,
}

impl OmdbSearchParams {
    /// Creates new search params with the given query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            year: None,
            title_type: None,
        }
    }

    /// Sets the year filter.
    #[must_use]
    pub const fn year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    /// Sets the title kind filter.
    #[must_use]
    pub const fn title_type(mut self, title_type: OmdbTitleType) -> Self {
        self.title_type = Some(title_type);
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_title_maps_na_and_renames() {
        // Arrange
        let json = r#"{
            "Title": "Fight Club",
            "Year": "1999",
            "Rated": "R",
            "Runtime": "139 min",
            "Awards": "N/A",
            "Poster": "N/A",
            "imdbRating": "8.8",
            "imdbID": "tt0137523",
            "Type": "movie",
            "Response": "True"
        }"#;

        // Act
        let title: OmdbTitle = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&title).unwrap();

        // Assert
        assert_eq!(title.imdb_id, "tt0137523");
        assert_eq!(title.poster, None);
        assert_eq!(title.title_type.as_deref(), Some("movie"));
        assert_eq!(value["imdbRating"], "8.8");
        assert_eq!(value["imdbId"], "tt0137523");
        assert_eq!(value["titleType"], "movie");
        assert!(value.get("poster").is_none());
    }

    #[test]
    fn test_envelope_found() {
        // Arrange
        let json = r#"{"Search":[{"Title":"Alien","Year":"1979","imdbID":"tt0078748","Type":"movie","Poster":"N/A"}],"totalResults":"1","Response":"True"}"#;

        // Act
        let envelope: Envelope<RawSearchPage> = serde_json::from_str(json).unwrap();

        // Assert
        match envelope {
            Envelope::Found(page) => {
                assert_eq!(page.total_results, "1");
                assert_eq!(page.search.len(), 1);
                assert_eq!(page.search.first().unwrap().imdb_id, "tt0078748");
            }
            Envelope::Failed { error } => panic!("unexpected failure: {error}"),
        }
    }

    #[test]
    fn test_envelope_failed() {
        // Arrange
        let json = r#"{"Response":"False","Error":"Movie not found!"}"#;

        // Act
        let envelope: Envelope<OmdbTitle> = serde_json::from_str(json).unwrap();

        // Assert
        assert!(
            matches!(envelope, Envelope::Failed { ref error } if error == "Movie not found!")
        );
    }

    #[test]
    fn test_search_params_builders() {
        // Arrange & Act
        let params = OmdbSearchParams::new("Alien")
            .year(1979)
            .title_type(OmdbTitleType::Movie);

        // Assert
        assert_eq!(params.year, Some(1979));
        assert_eq!(params.title_type.map(OmdbTitleType::as_str), Some("movie"));
    }
}
