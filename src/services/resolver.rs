// Search disambiguation
// Turns an ambiguous filename guess (title + optional year) into a
// best-effort single match via a fallback ladder over the search API.

use std::sync::Arc;

use crate::services::provider::MetadataProvider;
use crate::services::tmdb::{
    release_year, MovieSearchResult, MovieSearchResults, TmdbError, TvSearchResults,
};
use crate::text;

pub struct Resolver {
    provider: Arc<dyn MetadataProvider>,
}

impl Resolver {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn MetadataProvider> {
        &self.provider
    }

    /// Resolve a movie title against the search API.
    ///
    /// Fallback ladder, short-circuiting at the first step with results:
    /// 1. accent-normalized title, year filter applied;
    /// 2. the original title (only when normalization changed it), year
    ///    filter still applied;
    /// 3. with a year in hand, a broad no-year search over the normalized
    ///    title: candidates whose title is not equivalent to the query are
    ///    skipped; an exact primary-year match wins immediately; a
    ///    candidate whose alternate release dates contain the year is kept
    ///    as a fallback while the scan continues (a later exact primary
    ///    match still wins); with no match at all the broad result set is
    ///    returned untouched for the caller to present.
    pub async fn resolve_movie(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<MovieSearchResults, TmdbError> {
        let normalized = text::normalize(title);

        let results = self.provider.search_movies(&normalized, year).await?;
        if !results.results.is_empty() {
            return Ok(results);
        }

        if normalized != title {
            let results = self.provider.search_movies(title, year).await?;
            if !results.results.is_empty() {
                return Ok(results);
            }
        }

        let Some(wanted_year) = year else {
            return Ok(results);
        };

        tracing::debug!(
            "No year-filtered match for '{}' ({}), widening search",
            title,
            wanted_year
        );

        let broad = self.provider.search_movies(&normalized, None).await?;
        let mut fallback: Option<MovieSearchResult> = None;

        for candidate in &broad.results {
            let matches_query = text::equivalent(&candidate.title, title)
                || text::equivalent(&candidate.title, &normalized)
                || candidate.title.to_lowercase() == title.to_lowercase();
            if !matches_query {
                continue;
            }

            let primary_year = candidate.release_date.as_deref().and_then(release_year);
            if primary_year == Some(wanted_year) {
                // Exact primary-year match always takes priority
                return Ok(single_result(candidate.clone()));
            }

            if fallback.is_none() {
                let years = self.provider.movie_release_years(candidate.id).await?;
                if years.contains(&wanted_year) {
                    tracing::debug!(
                        "'{}' ({}) matched by alternate release year",
                        candidate.title,
                        candidate.id
                    );
                    fallback = Some(candidate.clone());
                }
            }
        }

        match fallback {
            Some(candidate) => Ok(single_result(candidate)),
            None => Ok(broad),
        }
    }

    /// Resolve a show name: normalized search first, then the original
    /// name when normalization changed it.
    pub async fn resolve_show(
        &self,
        name: &str,
        year: Option<i32>,
    ) -> Result<TvSearchResults, TmdbError> {
        let normalized = text::normalize(name);

        let results = self.provider.search_tv_shows(&normalized, year).await?;
        if !results.results.is_empty() {
            return Ok(results);
        }

        if normalized != name {
            let results = self.provider.search_tv_shows(name, year).await?;
            if !results.results.is_empty() {
                return Ok(results);
            }
        }

        Ok(results)
    }
}

fn single_result(result: MovieSearchResult) -> MovieSearchResults {
    MovieSearchResults {
        results: vec![result],
        total_results: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::testing::{search_movie, search_show, StubProvider};

    fn resolver(stub: StubProvider) -> (Resolver, Arc<StubProvider>) {
        let provider = Arc::new(stub);
        (Resolver::new(provider.clone()), provider)
    }

    #[tokio::test]
    async fn test_normalized_search_hits_first() {
        let mut stub = StubProvider::default();
        stub.movie_searches.insert(
            ("Cafe".to_string(), Some(2011)),
            vec![search_movie(1, "Café", "2011-06-01")],
        );
        let (resolver, provider) = resolver(stub);

        let results = resolver.resolve_movie("Café", Some(2011)).await.unwrap();
        assert_eq!(results.results[0].id, 1);
        // A single normalized search, nothing else
        assert_eq!(provider.calls(), vec!["search_movies:Cafe:Some(2011)"]);
    }

    #[tokio::test]
    async fn test_original_title_retried_when_normalization_changed_it() {
        let mut stub = StubProvider::default();
        stub.movie_searches
            .insert(("Cafe".to_string(), Some(2011)), vec![]);
        stub.movie_searches.insert(
            ("Café".to_string(), Some(2011)),
            vec![search_movie(2, "Café", "2011-06-01")],
        );
        let (resolver, provider) = resolver(stub);

        let results = resolver.resolve_movie("Café", Some(2011)).await.unwrap();
        assert_eq!(results.results[0].id, 2);
        assert_eq!(
            provider.calls(),
            vec![
                "search_movies:Cafe:Some(2011)",
                "search_movies:Café:Some(2011)"
            ]
        );
    }

    #[tokio::test]
    async fn test_no_retry_when_normalization_is_identity() {
        let (resolver, provider) = resolver(StubProvider::default());

        let results = resolver.resolve_movie("The Matrix", None).await.unwrap();
        assert!(results.results.is_empty());
        // No year, so the ladder ends after the single search
        assert_eq!(provider.calls(), vec!["search_movies:The Matrix:None"]);
    }

    #[tokio::test]
    async fn test_exact_primary_year_beats_alternate_match() {
        let mut stub = StubProvider::default();
        stub.movie_searches
            .insert(("Heat".to_string(), Some(1995)), vec![]);
        stub.movie_searches.insert(
            ("Heat".to_string(), None),
            vec![
                // Wrong title entirely: skipped without a release-dates fetch
                search_movie(10, "Heat Wave", "1995-01-01"),
                // Title matches, wrong primary year, alternate year matches
                search_movie(11, "Heat", "1996-02-01"),
                // Title matches with the exact primary year: must win
                search_movie(12, "Heat", "1995-12-15"),
            ],
        );
        stub.release_years.insert(11, vec![1996, 1995]);
        let (resolver, provider) = resolver(stub);

        let results = resolver.resolve_movie("Heat", Some(1995)).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].id, 12);

        let calls = provider.calls();
        // The skipped candidate never got a release-dates lookup
        assert!(calls.contains(&"release_years:11".to_string()));
        assert!(!calls.contains(&"release_years:10".to_string()));
        assert!(!calls.contains(&"release_years:12".to_string()));
    }

    #[tokio::test]
    async fn test_alternate_year_fallback_selected_when_no_primary_match() {
        let mut stub = StubProvider::default();
        stub.movie_searches
            .insert(("Cafe".to_string(), Some(2010)), vec![]);
        stub.movie_searches
            .insert(("Café".to_string(), Some(2010)), vec![]);
        stub.movie_searches.insert(
            ("Cafe".to_string(), None),
            vec![search_movie(21, "Café", "2011-06-01")],
        );
        stub.release_years.insert(21, vec![2011, 2010]);
        let (resolver, _) = resolver(stub);

        // Accent-insensitive equivalence admits the candidate, and the
        // 2010 festival release year selects it
        let results = resolver.resolve_movie("Café", Some(2010)).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].id, 21);
    }

    #[tokio::test]
    async fn test_broad_results_returned_untouched_when_nothing_matches() {
        let mut stub = StubProvider::default();
        stub.movie_searches
            .insert(("Solaris".to_string(), Some(1972)), vec![]);
        stub.movie_searches.insert(
            ("Solaris".to_string(), None),
            vec![
                search_movie(30, "Solaris", "2002-11-27"),
                search_movie(31, "Solaris Rising", "2010-01-01"),
            ],
        );
        stub.release_years.insert(30, vec![2002, 2003]);
        let (resolver, _) = resolver(stub);

        let results = resolver.resolve_movie("Solaris", Some(1972)).await.unwrap();
        // No candidate matched 1972; the whole broad set comes back
        assert_eq!(results.results.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_show_prefers_normalized_name() {
        let mut stub = StubProvider::default();
        stub.tv_searches.insert(
            ("Les Revenants".to_string(), None),
            vec![search_show(40, "Les Revenants")],
        );
        let (resolver, provider) = resolver(stub);

        let results = resolver.resolve_show("Les Revenants", None).await.unwrap();
        assert_eq!(results.results[0].id, 40);
        assert_eq!(provider.calls(), vec!["search_tv:Les Revenants:None"]);
    }

    #[tokio::test]
    async fn test_resolve_show_retries_original_name() {
        let mut stub = StubProvider::default();
        stub.tv_searches
            .insert(("Les Revenants".to_string(), None), vec![]);
        stub.tv_searches.insert(
            ("Les Revenänts".to_string(), None),
            vec![search_show(41, "Les Revenänts")],
        );
        let (resolver, _) = resolver(stub);

        let results = resolver.resolve_show("Les Revenänts", None).await.unwrap();
        assert_eq!(results.results[0].id, 41);
    }
}
