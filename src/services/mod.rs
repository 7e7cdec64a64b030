// Services module - business logic layer

use thiserror::Error;

pub mod movie_cache;
pub mod mp4;
pub mod provider;
pub mod resolver;
pub mod tmdb;
pub mod tv_cache;

/// Failures surfaced by the resolution/caching layer.
///
/// A cascade step failing means the whole operation fails: nothing is
/// considered cached for that entity and the caller retries the whole
/// resolution. Already-completed sibling upserts are harmless residue.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Tmdb(#[from] tmdb::TmdbError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ResolveError {
    /// Fold the provider's own not-found status into the local taxonomy.
    pub fn from_tmdb(err: tmdb::TmdbError) -> ResolveError {
        match err {
            tmdb::TmdbError::Status(status) if status == reqwest::StatusCode::NOT_FOUND => {
                ResolveError::NotFound
            }
            other => ResolveError::Tmdb(other),
        }
    }
}
