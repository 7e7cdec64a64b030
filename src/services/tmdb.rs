// TMDB metadata client
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";

/// Typed failure surface of the metadata API.
///
/// The client is a stateless adapter: no retries, no caching. Callers own
/// all resilience decisions.
#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("TMDB API error: {0}")]
    Status(StatusCode),
    #[error("TMDB request failed: {0}")]
    Transport(reqwest::Error),
    #[error("TMDB response could not be decoded: {0}")]
    Decode(reqwest::Error),
}

impl From<reqwest::Error> for TmdbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TmdbError::Decode(err)
        } else {
            TmdbError::Transport(err)
        }
    }
}

/// TMDB API client, authenticated via a query-string API key.
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCast {
    pub id: i64,
    pub name: String,
    pub character: Option<String>,
    pub profile_path: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCrew {
    pub id: i64,
    pub name: String,
    pub job: Option<String>,
    pub department: Option<String>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCast>,
    #[serde(default)]
    pub crew: Vec<TmdbCrew>,
}

/// Collection stub as inlined on a movie's details.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollectionRef {
    pub id: i64,
    pub name: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

/// Detailed movie info (`append_to_response=credits`).
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub runtime: Option<i64>,
    pub tagline: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub credits: TmdbCredits,
    pub belongs_to_collection: Option<TmdbCollectionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSearchResults {
    #[serde(default)]
    pub results: Vec<MovieSearchResult>,
    #[serde(default)]
    pub total_results: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSearchResult {
    pub id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvSearchResults {
    #[serde(default)]
    pub results: Vec<TvSearchResult>,
    #[serde(default)]
    pub total_results: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvSearchResult {
    pub id: i64,
    pub name: String,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

/// Detailed person info (`append_to_response=movie_credits`).
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPerson {
    pub id: i64,
    pub name: String,
    pub biography: Option<String>,
    pub birthday: Option<String>,
    pub deathday: Option<String>,
    pub profile_path: Option<String>,
    #[serde(default)]
    pub movie_credits: TmdbPersonCredits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbPersonCredits {
    #[serde(default)]
    pub cast: Vec<TmdbPersonMovieCredit>,
    #[serde(default)]
    pub crew: Vec<TmdbPersonMovieCredit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPersonMovieCredit {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub character: Option<String>,
    pub job: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollection {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub parts: Vec<TmdbCollectionPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollectionPart {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
}

/// Detailed TV show info, including season stubs.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbShow {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeasonStub>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSeasonStub {
    pub id: i64,
    pub season_number: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episode_count: Option<i64>,
}

/// Season details including the episode list (`append_to_response=credits`).
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSeasonDetails {
    pub id: i64,
    pub season_number: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    #[serde(default)]
    pub episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbEpisode {
    pub id: i64,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub runtime: Option<i64>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub guest_stars: Vec<TmdbCast>,
    #[serde(default)]
    pub crew: Vec<TmdbCrew>,
}

/// Release dates grouped by territory, used by the alternate-year fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReleaseDates {
    pub id: i64,
    #[serde(default)]
    pub results: Vec<TmdbTerritoryReleases>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbTerritoryReleases {
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<TmdbReleaseDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReleaseDate {
    pub release_date: String,
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    /// Search for movies by title, optionally filtered by release year.
    pub async fn search_movies(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<MovieSearchResults, TmdbError> {
        let mut url = format!(
            "{}/search/movie?api_key={}&query={}&include_adult=true",
            TMDB_API_BASE,
            self.api_key,
            urlencoding::encode(query)
        );
        if let Some(y) = year {
            url.push_str(&format!("&year={}", y));
        }

        self.get_json(&url).await
    }

    /// Search for TV shows by name, optionally filtered by first-air year.
    pub async fn search_tv_shows(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<TvSearchResults, TmdbError> {
        let mut url = format!(
            "{}/search/tv?api_key={}&query={}&include_adult=true",
            TMDB_API_BASE,
            self.api_key,
            urlencoding::encode(query)
        );
        if let Some(y) = year {
            url.push_str(&format!("&first_air_date_year={}", y));
        }

        self.get_json(&url).await
    }

    pub async fn get_movie_details(&self, movie_id: i64) -> Result<TmdbMovie, TmdbError> {
        let url = format!(
            "{}/movie/{}?api_key={}&append_to_response=credits",
            TMDB_API_BASE, movie_id, self.api_key
        );
        self.get_json(&url).await
    }

    /// Every territory's release dates for a movie.
    pub async fn get_movie_release_dates(
        &self,
        movie_id: i64,
    ) -> Result<TmdbReleaseDates, TmdbError> {
        let url = format!(
            "{}/movie/{}/release_dates?api_key={}",
            TMDB_API_BASE, movie_id, self.api_key
        );
        self.get_json(&url).await
    }

    pub async fn get_person_details(&self, person_id: i64) -> Result<TmdbPerson, TmdbError> {
        let url = format!(
            "{}/person/{}?api_key={}&append_to_response=movie_credits",
            TMDB_API_BASE, person_id, self.api_key
        );
        self.get_json(&url).await
    }

    pub async fn get_collection_details(
        &self,
        collection_id: i64,
    ) -> Result<TmdbCollection, TmdbError> {
        let url = format!(
            "{}/collection/{}?api_key={}",
            TMDB_API_BASE, collection_id, self.api_key
        );
        self.get_json(&url).await
    }

    pub async fn get_show_details(&self, show_id: i64) -> Result<TmdbShow, TmdbError> {
        let url = format!("{}/tv/{}?api_key={}", TMDB_API_BASE, show_id, self.api_key);
        self.get_json(&url).await
    }

    pub async fn get_season_details(
        &self,
        show_id: i64,
        season_number: i64,
    ) -> Result<TmdbSeasonDetails, TmdbError> {
        let url = format!(
            "{}/tv/{}/season/{}?api_key={}&append_to_response=credits",
            TMDB_API_BASE, show_id, season_number, self.api_key
        );
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TmdbError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TmdbError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("TMDB returned {} for {}", status, url);
            return Err(TmdbError::Status(status));
        }

        Ok(response.json::<T>().await?)
    }
}

/// Extract the year from a provider date string ("1999-03-30" -> 1999).
pub fn release_year(date: &str) -> Option<i32> {
    date.split('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_year() {
        assert_eq!(release_year("1999-03-30"), Some(1999));
        assert_eq!(release_year("2003"), Some(2003));
        assert_eq!(release_year(""), None);
        assert_eq!(release_year("not-a-date"), None);
    }

    #[test]
    fn test_search_results_decode_with_missing_fields() {
        let body = r#"{"page":1,"results":[{"id":603,"title":"The Matrix","release_date":"1999-03-30","poster_path":null,"overview":"..."}],"total_results":1}"#;
        let parsed: MovieSearchResults = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].id, 603);

        // Empty payloads decode to empty result sets
        let parsed: MovieSearchResults = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn test_release_dates_decode() {
        let body = r#"{"id":603,"results":[{"iso_3166_1":"US","release_dates":[{"certification":"R","release_date":"1999-03-30T00:00:00.000Z"}]}]}"#;
        let parsed: TmdbReleaseDates = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].iso_3166_1, "US");
        assert_eq!(
            release_year(&parsed.results[0].release_dates[0].release_date),
            Some(1999)
        );
    }
}
