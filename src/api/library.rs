// Library API - load a share tree, browse it, watch the background
// resolution fill in, and stream resolved files

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::library::cache::{MediaCache, QueueProgress};
use crate::library::{collect_media_files, directory_contents, probe_mp4, FsNode, ShareItem};
use crate::{AppState, LoadedLibrary};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/load", post(load_library))
        .route("/unload", post(unload_library))
        .route("/status", get(library_status))
        .route("/items", get(library_items))
        .route("/browse", get(browse))
        .route("/movie/:tmdb_id", get(movie_availability))
        .route("/lookup/movie", get(lookup_movie))
        .route("/lookup/show", get(lookup_show))
        .route("/faststart/:tmdb_id", get(file_fast_start))
        .route("/stream/:tmdb_id", get(stream_file))
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub loaded: bool,
    pub processing: bool,
    pub progress: QueueProgress,
}

/// Load (or replace) the browsable library from a local directory tree.
/// Replacing discards the previous cache and its queue wholesale; the
/// in-flight resolution finishes but nothing after it runs.
async fn load_library(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let root_path = std::path::PathBuf::from(&request.path);
    if !root_path.is_dir() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Not a directory: {}", request.path),
        ));
    }

    let root = FsNode::new(root_path);
    let walk_root = root.clone();
    let files = tokio::task::spawn_blocking(move || collect_media_files(walk_root))
        .await
        .map_err(|err| {
            tracing::error!("Library walk failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Library walk failed".to_string(),
            )
        })?;
    let file_count = files.len();

    let cache = MediaCache::load(
        state.db.clone(),
        state.resolver.clone(),
        files,
        state.config.cache_options(),
    )
    .await
    .map_err(|err| {
        tracing::error!("Failed to load library: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load library".to_string(),
        )
    })?;

    let progress = cache.queue_progress();
    tracing::info!(
        "Library loaded from {}: {} files, {} queued for resolution",
        request.path,
        file_count,
        progress.total
    );

    let mut library = state.library.write().await;
    if let Some(previous) = library.take() {
        previous.cache.shutdown();
    }
    *library = Some(LoadedLibrary {
        root,
        cache: Arc::new(cache),
    });

    Ok(Json(json!({
        "files": file_count,
        "queued": progress.total,
    })))
}

async fn unload_library(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut library = state.library.write().await;
    if let Some(previous) = library.take() {
        previous.cache.shutdown();
        tracing::info!("Library unloaded");
    }
    StatusCode::NO_CONTENT
}

async fn library_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let library = state.library.read().await;
    match library.as_ref() {
        Some(loaded) => Json(StatusResponse {
            loaded: true,
            processing: loaded.cache.is_processing(),
            progress: loaded.cache.queue_progress(),
        }),
        None => Json(StatusResponse {
            loaded: false,
            processing: false,
            progress: QueueProgress::default(),
        }),
    }
}

async fn library_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let library = state.library.read().await;
    let loaded = require_library(&library)?;
    Ok(Json(json!({ "items": loaded.cache.projections() })))
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    /// Slash-separated path below the share root; empty for the root
    pub path: Option<String>,
}

/// One level of the share tree: subdirectories plus parsed `.mp4` files.
async fn browse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let root = {
        let library = state.library.read().await;
        require_library(&library)?.root.clone()
    };

    let segments: Vec<String> = query
        .path
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let items = tokio::task::spawn_blocking(move || directory_contents(root, &segments))
        .await
        .map_err(|err| {
            tracing::error!("Browse failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Browse failed".to_string(),
            )
        })?
        .map_err(|err| (StatusCode::NOT_FOUND, err.to_string()))?;

    let mut directories = Vec::new();
    let mut files = Vec::new();
    for item in items {
        match item {
            ShareItem::Directory { name, node } => directories.push(json!({
                "name": name,
                "modifiedAt": node.modified_at(),
            })),
            ShareItem::File(file) => files.push(json!({
                "info": file.info,
                "size": file.size,
                "modifiedAt": file.node.modified_at(),
            })),
        }
    }

    Ok(Json(json!({
        "directories": directories,
        "files": files,
    })))
}

/// Whether a resolved movie has files in the loaded library, and which.
async fn movie_availability(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let library = state.library.read().await;
    let loaded = require_library(&library)?;
    Ok(Json(json!({
        "available": loaded.cache.is_movie_available(tmdb_id),
        "files": loaded.cache.get_movie_files(tmdb_id),
    })))
}

#[derive(Debug, Deserialize)]
pub struct MovieLookupQuery {
    pub title: String,
    pub year: Option<i32>,
}

/// Synchronous projection lookup; never touches the network. A miss means
/// the background queue has not resolved this title (yet, or at all).
async fn lookup_movie(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MovieLookupQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let library = state.library.read().await;
    let loaded = require_library(&library)?;
    match loaded.cache.get_movie_data(&query.title, query.year) {
        Some(projection) => Ok(Json(json!(projection))),
        None => Err((StatusCode::NOT_FOUND, "Not resolved".to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct ShowLookupQuery {
    pub name: String,
}

async fn lookup_show(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShowLookupQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let library = state.library.read().await;
    let loaded = require_library(&library)?;
    match loaded.cache.get_show_data(&query.name) {
        Some(projection) => Ok(Json(json!(projection))),
        None => Err((StatusCode::NOT_FOUND, "Not resolved".to_string())),
    }
}

/// Probe the first chunk of a resolved file and report whether it can be
/// played progressively (index box before the media data).
async fn file_fast_start(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let file = {
        let library = state.library.read().await;
        require_library(&library)?
            .cache
            .get_share_file(tmdb_id)
            .ok_or((StatusCode::NOT_FOUND, "File not found".to_string()))?
    };

    let info = probe_mp4(file.node.as_ref()).await.map_err(|err| {
        tracing::error!("Fast-start probe failed: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read file".to_string(),
        )
    })?;

    Ok(Json(json!({
        "fastStart": info.fast_start,
        "boxes": info.boxes,
        "filename": file.info.filename,
    })))
}

/// Stream a resolved file's bytes. The consumer pulls chunks as its
/// playback buffer drains; there is no server-side copy.
async fn stream_file(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<i64>,
) -> Result<Response, (StatusCode, String)> {
    let file = {
        let library = state.library.read().await;
        require_library(&library)?
            .cache
            .get_share_file(tmdb_id)
            .ok_or((StatusCode::NOT_FOUND, "File not found".to_string()))?
    };

    let stream = file.node.open_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, file.size)
        .header(header::ACCEPT_RANGES, "none")
        .body(Body::from_stream(stream))
        .map_err(|err| {
            tracing::error!("Failed to build stream response: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to open stream".to_string(),
            )
        })
}

fn require_library<'a>(
    library: &'a Option<LoadedLibrary>,
) -> Result<&'a LoadedLibrary, (StatusCode, String)> {
    library
        .as_ref()
        .ok_or((StatusCode::CONFLICT, "No library loaded".to_string()))
}
