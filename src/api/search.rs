// Search API - title + optional year in, disambiguated results out

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::services::{tv_cache, ResolveError};
use crate::wire;
use crate::AppState;

use super::resolve_error;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movie", post(search_movie))
        .route("/show", post(search_show))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
}

fn required_title(request: &SearchRequest) -> Result<&str, (StatusCode, String)> {
    match request.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => Ok(title),
        _ => Err((StatusCode::BAD_REQUEST, "Title is required".to_string())),
    }
}

async fn search_movie(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let title = required_title(&request)?;

    let results = state
        .resolver
        .resolve_movie(title, request.year)
        .await
        .map_err(|err| resolve_error(ResolveError::Tmdb(err)))?;

    if results.results.is_empty() {
        tracing::debug!("No movies found for '{}' ({:?})", title, request.year);
        return Err((StatusCode::NOT_FOUND, "No movies found".to_string()));
    }

    Ok(Json(serde_json::to_value(&results).map_err(|err| {
        tracing::error!("Failed to encode search results: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode response".to_string(),
        )
    })?))
}

async fn search_show(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let title = required_title(&request)?;

    let show = tv_cache::search_and_cache_show(&state.db, &state.resolver, title, request.year)
        .await
        .map_err(resolve_error)?;

    let Some(show) = show else {
        return Err((StatusCode::NOT_FOUND, "Show not found".to_string()));
    };

    wire::to_wire(&show).map(Json).map_err(|err| {
        tracing::error!("Wire encoding failed: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode response".to_string(),
        )
    })
}
