// Provider seam over the metadata API
// The resolution and caching layers consume this trait instead of the
// concrete client so they can be exercised against scripted providers.

use async_trait::async_trait;

use crate::services::tmdb::{
    release_year, MovieSearchResults, TmdbClient, TmdbCollection, TmdbError, TmdbMovie,
    TmdbPerson, TmdbSeasonDetails, TmdbShow, TvSearchResults,
};

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search_movies(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<MovieSearchResults, TmdbError>;

    async fn search_tv_shows(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<TvSearchResults, TmdbError>;

    /// Release years across all territories for a movie.
    async fn movie_release_years(&self, movie_id: i64) -> Result<Vec<i32>, TmdbError>;

    async fn get_movie_details(&self, movie_id: i64) -> Result<TmdbMovie, TmdbError>;

    async fn get_person_details(&self, person_id: i64) -> Result<TmdbPerson, TmdbError>;

    async fn get_collection_details(&self, collection_id: i64)
        -> Result<TmdbCollection, TmdbError>;

    async fn get_show_details(&self, show_id: i64) -> Result<TmdbShow, TmdbError>;

    async fn get_season_details(
        &self,
        show_id: i64,
        season_number: i64,
    ) -> Result<TmdbSeasonDetails, TmdbError>;
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_movies(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<MovieSearchResults, TmdbError> {
        TmdbClient::search_movies(self, query, year).await
    }

    async fn search_tv_shows(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<TvSearchResults, TmdbError> {
        TmdbClient::search_tv_shows(self, query, year).await
    }

    async fn movie_release_years(&self, movie_id: i64) -> Result<Vec<i32>, TmdbError> {
        let dates = self.get_movie_release_dates(movie_id).await?;
        Ok(dates
            .results
            .iter()
            .flat_map(|territory| territory.release_dates.iter())
            .filter_map(|entry| release_year(&entry.release_date))
            .collect())
    }

    async fn get_movie_details(&self, movie_id: i64) -> Result<TmdbMovie, TmdbError> {
        TmdbClient::get_movie_details(self, movie_id).await
    }

    async fn get_person_details(&self, person_id: i64) -> Result<TmdbPerson, TmdbError> {
        TmdbClient::get_person_details(self, person_id).await
    }

    async fn get_collection_details(
        &self,
        collection_id: i64,
    ) -> Result<TmdbCollection, TmdbError> {
        TmdbClient::get_collection_details(self, collection_id).await
    }

    async fn get_show_details(&self, show_id: i64) -> Result<TmdbShow, TmdbError> {
        TmdbClient::get_show_details(self, show_id).await
    }

    async fn get_season_details(
        &self,
        show_id: i64,
        season_number: i64,
    ) -> Result<TmdbSeasonDetails, TmdbError> {
        TmdbClient::get_season_details(self, show_id, season_number).await
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted provider for exercising resolution and caching without a
    //! network. Every call is recorded so tests can assert on call counts.

    use super::*;
    use crate::services::tmdb::{
        MovieSearchResult, TmdbCredits, TvSearchResult,
    };
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubProvider {
        pub movie_searches: HashMap<(String, Option<i32>), Vec<MovieSearchResult>>,
        pub tv_searches: HashMap<(String, Option<i32>), Vec<TvSearchResult>>,
        pub release_years: HashMap<i64, Vec<i32>>,
        pub movies: HashMap<i64, TmdbMovie>,
        pub people: HashMap<i64, TmdbPerson>,
        pub collections: HashMap<i64, TmdbCollection>,
        pub shows: HashMap<i64, TmdbShow>,
        pub seasons: HashMap<(i64, i64), TmdbSeasonDetails>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubProvider {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    /// Minimal search hit.
    pub fn search_movie(id: i64, title: &str, release_date: &str) -> MovieSearchResult {
        MovieSearchResult {
            id,
            title: title.to_string(),
            release_date: (!release_date.is_empty()).then(|| release_date.to_string()),
            poster_path: None,
            overview: None,
        }
    }

    pub fn search_show(id: i64, name: &str) -> TvSearchResult {
        TvSearchResult {
            id,
            name: name.to_string(),
            first_air_date: None,
            poster_path: None,
            overview: None,
        }
    }

    /// Minimal movie details payload with no credits or collection.
    pub fn movie_details(id: i64, title: &str, release_date: &str) -> TmdbMovie {
        TmdbMovie {
            id,
            title: title.to_string(),
            overview: Some(format!("Overview of {}", title)),
            release_date: (!release_date.is_empty()).then(|| release_date.to_string()),
            poster_path: None,
            backdrop_path: None,
            vote_average: Some(7.0),
            vote_count: Some(100),
            runtime: Some(120),
            tagline: None,
            genres: Vec::new(),
            credits: TmdbCredits::default(),
            belongs_to_collection: None,
        }
    }

    pub fn person_details(id: i64, name: &str) -> TmdbPerson {
        TmdbPerson {
            id,
            name: name.to_string(),
            biography: None,
            birthday: None,
            deathday: None,
            profile_path: None,
            movie_credits: Default::default(),
        }
    }

    fn missing() -> TmdbError {
        TmdbError::Status(StatusCode::NOT_FOUND)
    }

    #[async_trait]
    impl MetadataProvider for StubProvider {
        async fn search_movies(
            &self,
            query: &str,
            year: Option<i32>,
        ) -> Result<MovieSearchResults, TmdbError> {
            self.record(format!("search_movies:{}:{:?}", query, year));
            let results = self
                .movie_searches
                .get(&(query.to_string(), year))
                .cloned()
                .unwrap_or_default();
            Ok(MovieSearchResults {
                total_results: results.len() as i64,
                results,
            })
        }

        async fn search_tv_shows(
            &self,
            query: &str,
            year: Option<i32>,
        ) -> Result<TvSearchResults, TmdbError> {
            self.record(format!("search_tv:{}:{:?}", query, year));
            let results = self
                .tv_searches
                .get(&(query.to_string(), year))
                .cloned()
                .unwrap_or_default();
            Ok(TvSearchResults {
                total_results: results.len() as i64,
                results,
            })
        }

        async fn movie_release_years(&self, movie_id: i64) -> Result<Vec<i32>, TmdbError> {
            self.record(format!("release_years:{}", movie_id));
            Ok(self
                .release_years
                .get(&movie_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_movie_details(&self, movie_id: i64) -> Result<TmdbMovie, TmdbError> {
            self.record(format!("movie_details:{}", movie_id));
            self.movies.get(&movie_id).cloned().ok_or_else(missing)
        }

        async fn get_person_details(&self, person_id: i64) -> Result<TmdbPerson, TmdbError> {
            self.record(format!("person_details:{}", person_id));
            self.people.get(&person_id).cloned().ok_or_else(missing)
        }

        async fn get_collection_details(
            &self,
            collection_id: i64,
        ) -> Result<TmdbCollection, TmdbError> {
            self.record(format!("collection_details:{}", collection_id));
            self.collections
                .get(&collection_id)
                .cloned()
                .ok_or_else(missing)
        }

        async fn get_show_details(&self, show_id: i64) -> Result<TmdbShow, TmdbError> {
            self.record(format!("show_details:{}", show_id));
            self.shows.get(&show_id).cloned().ok_or_else(missing)
        }

        async fn get_season_details(
            &self,
            show_id: i64,
            season_number: i64,
        ) -> Result<TmdbSeasonDetails, TmdbError> {
            self.record(format!("season_details:{}:{}", show_id, season_number));
            self.seasons
                .get(&(show_id, season_number))
                .cloned()
                .ok_or_else(missing)
        }
    }
}
