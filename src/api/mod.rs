use axum::http::StatusCode;
use axum::Router;
use std::sync::Arc;

use crate::services::ResolveError;
use crate::AppState;

mod library;
mod resolve;
mod search;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/resolve", resolve::routes())
        .nest("/search", search::routes())
        .nest("/library", library::routes())
}

/// Map resolution failures onto the error taxonomy: not-found -> 404,
/// upstream API failure -> 502 (never swallowed, never auto-retried),
/// local store failure -> 500.
pub(crate) fn resolve_error(err: ResolveError) -> (StatusCode, String) {
    match err {
        ResolveError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        ResolveError::Tmdb(err) => {
            tracing::error!("Upstream metadata failure: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                format!("Upstream metadata failure: {}", err),
            )
        }
        ResolveError::Db(err) => {
            tracing::error!("Database failure: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database failure".to_string(),
            )
        }
    }
}
