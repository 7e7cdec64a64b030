// Resolve API - read-through entity endpoints
//
// Each endpoint answers from the relational cache when it can and fetches
// through the metadata provider on a miss. Responses carry date-valued
// fields as `{__type: "Date", value: <ms>}` markers for the client to
// reverse.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::services::{movie_cache, tv_cache};
use crate::wire;
use crate::AppState;

use super::resolve_error;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movie/:id", get(get_movie).post(post_movie))
        .route("/person/:id", get(get_person).post(post_person))
        .route("/collection/:id", get(get_collection).post(post_collection))
        .route("/show/:id", get(get_show))
        .route("/show/:id/season/:season_number", get(get_season))
}

/// Optional POST body: the caller's allowlist of externally resolvable
/// ids, used to trim filmographies down to what the library actually has.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBody {
    pub available_ids: Option<Vec<i64>>,
}

fn encode<T: serde::Serialize>(payload: &T) -> Result<Json<Value>, (StatusCode, String)> {
    wire::to_wire(payload).map(Json).map_err(|err| {
        tracing::error!("Wire encoding failed: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode response".to_string(),
        )
    })
}

async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let movie = movie_cache::get_or_fetch_movie(&state.db, state.provider(), id)
        .await
        .map_err(resolve_error)?;
    encode(&movie)
}

async fn post_movie(
    state: State<Arc<AppState>>,
    id: Path<i64>,
    _body: Option<Json<ResolveBody>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    // The allowlist has no effect on a movie payload; POST mirrors GET
    get_movie(state, id).await
}

async fn get_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let person = movie_cache::get_or_fetch_person(&state.db, state.provider(), id)
        .await
        .map_err(resolve_error)?;
    encode(&person)
}

async fn post_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Option<Json<ResolveBody>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut person = movie_cache::get_or_fetch_person(&state.db, state.provider(), id)
        .await
        .map_err(resolve_error)?;

    if let Some(available) = body.and_then(|Json(body)| body.available_ids) {
        person
            .movies
            .retain(|entry| available.contains(&entry.tmdb_id));
    }

    encode(&person)
}

async fn get_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let collection = movie_cache::get_or_fetch_collection(&state.db, state.provider(), id)
        .await
        .map_err(resolve_error)?;
    encode(&collection)
}

async fn post_collection(
    state: State<Arc<AppState>>,
    id: Path<i64>,
    _body: Option<Json<ResolveBody>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    get_collection(state, id).await
}

async fn get_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let show = tv_cache::get_or_fetch_show(&state.db, state.provider(), id)
        .await
        .map_err(resolve_error)?;
    encode(&show)
}

async fn get_season(
    State(state): State<Arc<AppState>>,
    Path((id, season_number)): Path<(i64, i64)>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let season = tv_cache::get_or_fetch_season(&state.db, state.provider(), id, season_number)
        .await
        .map_err(resolve_error)?;
    encode(&season)
}
