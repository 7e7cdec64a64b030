// Client-side media cache and background resolution queue
//
// Built once per loaded library and discarded wholesale when the library
// changes. Scanning seeds the in-memory projections from the durable
// lookup cache; everything uncached goes into a queue that a single
// processor task drains in order, one item at a time, sleeping a fixed
// delay between items. That fixed delay is the sole rate limiter
// protecting the metadata API from whole-library scans, so the processor
// must stay strictly serial.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::library::lookup::{self, movie_key, show_key, CachedLookup, Projection};
use crate::library::parser::MediaType;
use crate::library::MediaFile;
use crate::services::resolver::Resolver;
use crate::services::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Movie,
    Show,
}

struct QueueItem {
    kind: QueueKind,
    title: String,
    year: Option<i32>,
    key: String,
    // Movie items carry their file so a resolution can map tmdb id -> node
    file: Option<MediaFile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct MediaCacheOptions {
    /// Durable entries older than this are swept at load.
    pub max_age: Duration,
    /// Fixed sleep between queue items.
    pub throttle: Duration,
}

impl Default for MediaCacheOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            throttle: Duration::from_millis(100),
        }
    }
}

#[derive(Default)]
struct CacheInner {
    projections: HashMap<String, Projection>,
    files_by_tmdb: HashMap<i64, Vec<String>>,
    file_by_tmdb: HashMap<i64, MediaFile>,
    processing: bool,
    progress: QueueProgress,
}

/// Per-library cache handle. The UI reads through the synchronous
/// accessors, which never touch the network; misses fill in from the
/// background queue.
pub struct MediaCache {
    inner: Arc<Mutex<CacheInner>>,
    cancel: CancellationToken,
}

impl MediaCache {
    /// Sweep the durable cache, seed projections from it, and start the
    /// background processor for everything still unresolved.
    ///
    /// Movie entries are queued once per file (the processor's own cache
    /// re-check absorbs duplicate keys); show entries are deduplicated by
    /// key up front since one show covers many episode files.
    pub async fn load(
        pool: SqlitePool,
        resolver: Arc<Resolver>,
        files: Vec<MediaFile>,
        options: MediaCacheOptions,
    ) -> Result<MediaCache, sqlx::Error> {
        let cutoff = Utc::now().timestamp_millis() - options.max_age.as_millis() as i64;
        let removed = lookup::delete_older_than(&pool, cutoff).await?;
        if removed > 0 {
            tracing::info!("Swept {} stale lookup cache entries", removed);
        }

        let mut inner = CacheInner::default();
        let mut queue: Vec<QueueItem> = Vec::new();

        for file in files {
            let info = &file.info;
            let movie_like = info.media_type == MediaType::Movie
                || (info.media_type == MediaType::Unknown && info.episode_info.is_none());

            if movie_like {
                let key = movie_key(&info.clean_title, info.year);
                match lookup::get(&pool, &key).await? {
                    Some(hit) => {
                        if let (Some(tmdb_id), Some(projection)) = (hit.tmdb_id, hit.data) {
                            inner.projections.insert(key, projection);
                            inner
                                .files_by_tmdb
                                .entry(tmdb_id)
                                .or_default()
                                .push(info.filename.clone());
                            inner
                                .file_by_tmdb
                                .entry(tmdb_id)
                                .or_insert_with(|| file.clone());
                        }
                        // A negative hit was resolved before: not re-queued
                    }
                    None => queue.push(QueueItem {
                        kind: QueueKind::Movie,
                        title: info.clean_title.clone(),
                        year: info.year,
                        key,
                        file: Some(file.clone()),
                    }),
                }
            } else if info.media_type == MediaType::Tv {
                let key = show_key(&info.clean_title);
                match lookup::get(&pool, &key).await? {
                    Some(hit) => {
                        if let (Some(_), Some(projection)) = (hit.tmdb_id, hit.data) {
                            inner.projections.insert(key, projection);
                        }
                    }
                    None => {
                        if !queue.iter().any(|item| item.key == key) {
                            queue.push(QueueItem {
                                kind: QueueKind::Show,
                                title: info.clean_title.clone(),
                                year: None,
                                key,
                                file: None,
                            });
                        }
                    }
                }
            }
        }

        inner.progress = QueueProgress {
            current: 0,
            total: queue.len(),
        };

        let inner = Arc::new(Mutex::new(inner));
        let cancel = CancellationToken::new();

        if !queue.is_empty() {
            inner.lock().unwrap().processing = true;
            tokio::spawn(process_queue(
                pool,
                resolver,
                inner.clone(),
                cancel.clone(),
                queue,
                options.throttle,
            ));
        }

        Ok(MediaCache { inner, cancel })
    }

    pub fn get_movie_data(&self, clean_title: &str, year: Option<i32>) -> Option<Projection> {
        self.inner
            .lock()
            .unwrap()
            .projections
            .get(&movie_key(clean_title, year))
            .cloned()
    }

    pub fn get_show_data(&self, clean_title: &str) -> Option<Projection> {
        self.inner
            .lock()
            .unwrap()
            .projections
            .get(&show_key(clean_title))
            .cloned()
    }

    pub fn is_movie_available(&self, tmdb_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .files_by_tmdb
            .contains_key(&tmdb_id)
    }

    pub fn get_movie_files(&self, tmdb_id: i64) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .files_by_tmdb
            .get(&tmdb_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The share file backing a resolved movie, for download/stream links.
    pub fn get_share_file(&self, tmdb_id: i64) -> Option<MediaFile> {
        self.inner
            .lock()
            .unwrap()
            .file_by_tmdb
            .get(&tmdb_id)
            .cloned()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock().unwrap().processing
    }

    pub fn queue_progress(&self) -> QueueProgress {
        self.inner.lock().unwrap().progress
    }

    /// All resolved projections, for the library listing.
    pub fn projections(&self) -> Vec<Projection> {
        self.inner
            .lock()
            .unwrap()
            .projections
            .values()
            .cloned()
            .collect()
    }

    /// Discard the queue. The in-flight item finishes; nothing after it
    /// runs. There is no mid-item cancellation.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MediaCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn process_queue(
    pool: SqlitePool,
    resolver: Arc<Resolver>,
    inner: Arc<Mutex<CacheInner>>,
    cancel: CancellationToken,
    queue: Vec<QueueItem>,
    throttle: Duration,
) {
    tracing::info!("Background resolution of {} library entries", queue.len());

    for (index, item) in queue.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::debug!("Resolution queue discarded at {}/{}", index, queue.len());
            break;
        }

        // Another path may have resolved this key already
        let already_cached = inner.lock().unwrap().projections.contains_key(&item.key);
        if !already_cached {
            if let Err(err) = resolve_item(&pool, &resolver, &inner, item).await {
                tracing::warn!("Failed to resolve '{}': {}", item.title, err);
            }
        }

        inner.lock().unwrap().progress.current = index + 1;

        // Fixed inter-item delay, the sole rate limiter for library scans
        tokio::time::sleep(throttle).await;
    }

    inner.lock().unwrap().processing = false;
    tracing::info!("Background resolution finished");
}

async fn resolve_item(
    pool: &SqlitePool,
    resolver: &Resolver,
    inner: &Arc<Mutex<CacheInner>>,
    item: &QueueItem,
) -> Result<(), ResolveError> {
    let timestamp = Utc::now().timestamp_millis();

    let projection = match item.kind {
        QueueKind::Movie => {
            let results = resolver.resolve_movie(&item.title, item.year).await?;
            results.results.first().map(|hit| Projection::Movie {
                tmdb_id: hit.id,
                title: hit.title.clone(),
                poster_path: hit.poster_path.clone(),
                release_date: hit.release_date.clone(),
            })
        }
        QueueKind::Show => {
            let results = resolver.resolve_show(&item.title, item.year).await?;
            results.results.first().map(|hit| Projection::Show {
                tmdb_id: hit.id,
                name: hit.name.clone(),
                poster_path: hit.poster_path.clone(),
                first_air_date: hit.first_air_date.clone(),
            })
        }
    };

    // Positive and negative outcomes are both durable, so a later run
    // never re-resolves this key
    lookup::put(
        pool,
        &CachedLookup {
            key: item.key.clone(),
            tmdb_id: projection.as_ref().map(Projection::tmdb_id),
            data: projection.clone(),
            timestamp,
        },
    )
    .await?;

    if let Some(projection) = projection {
        let tmdb_id = projection.tmdb_id();
        let mut guard = inner.lock().unwrap();
        guard.projections.insert(item.key.clone(), projection);
        if let Some(file) = &item.file {
            let files = guard.files_by_tmdb.entry(tmdb_id).or_default();
            if !files.contains(&file.info.filename) {
                files.push(file.info.filename.clone());
            }
            guard
                .file_by_tmdb
                .entry(tmdb_id)
                .or_insert_with(|| file.clone());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::library::collect_media_files;
    use crate::library::testing::MemoryNode;
    use crate::services::provider::testing::{search_movie, search_show, StubProvider};

    fn fast_options() -> MediaCacheOptions {
        MediaCacheOptions {
            throttle: Duration::from_millis(1),
            ..MediaCacheOptions::default()
        }
    }

    async fn wait_idle(cache: &MediaCache) {
        for _ in 0..1000 {
            {
                let guard = cache.inner.lock().unwrap();
                if !guard.processing && guard.progress.current >= guard.progress.total {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("resolution queue did not drain");
    }

    fn matrix_library() -> Vec<MediaFile> {
        collect_media_files(MemoryNode::dir(
            "share",
            vec![MemoryNode::dir(
                "Movies",
                vec![MemoryNode::file("The.Matrix.1999.mp4", b"matrix")],
            )],
        ))
    }

    fn matrix_stub() -> StubProvider {
        let mut stub = StubProvider::default();
        stub.movie_searches.insert(
            ("The Matrix".to_string(), Some(1999)),
            vec![search_movie(603, "The Matrix", "1999-03-30")],
        );
        stub
    }

    #[tokio::test]
    async fn test_queue_resolves_movies_into_both_cache_layers() {
        let pool = test_pool().await;
        let provider = Arc::new(matrix_stub());
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let cache = MediaCache::load(pool.clone(), resolver, matrix_library(), fast_options())
            .await
            .unwrap();
        wait_idle(&cache).await;

        let projection = cache.get_movie_data("The Matrix", Some(1999)).unwrap();
        assert_eq!(projection.tmdb_id(), 603);
        assert!(cache.is_movie_available(603));
        assert_eq!(cache.get_movie_files(603), vec!["The.Matrix.1999.mp4"]);
        assert!(cache.get_share_file(603).is_some());

        // The durable layer has the entry under the natural key
        let entry = lookup::get(&pool, "movie:The Matrix:1999")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.tmdb_id, Some(603));
    }

    #[tokio::test]
    async fn test_second_load_never_rehits_the_network() {
        let pool = test_pool().await;
        let provider = Arc::new(matrix_stub());
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let cache = MediaCache::load(
            pool.clone(),
            resolver.clone(),
            matrix_library(),
            fast_options(),
        )
        .await
        .unwrap();
        wait_idle(&cache).await;
        let calls_after_first = provider.call_count("search_movies");
        assert_eq!(calls_after_first, 1);
        drop(cache);

        let cache = MediaCache::load(pool, resolver, matrix_library(), fast_options())
            .await
            .unwrap();
        // Pure cache hit: nothing queued, projection available immediately
        assert_eq!(cache.queue_progress().total, 0);
        assert!(!cache.is_processing());
        assert!(cache.get_movie_data("The Matrix", Some(1999)).is_some());
        assert_eq!(provider.call_count("search_movies"), calls_after_first);
    }

    #[tokio::test]
    async fn test_duplicate_movie_keys_resolve_once() {
        let pool = test_pool().await;
        let provider = Arc::new(matrix_stub());
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let files = collect_media_files(MemoryNode::dir(
            "share",
            vec![
                MemoryNode::dir(
                    "Movies",
                    vec![MemoryNode::file("The.Matrix.1999.mp4", b"a")],
                ),
                MemoryNode::dir(
                    "Movies Backup",
                    vec![MemoryNode::file("The Matrix (1999).mp4", b"b")],
                ),
            ],
        ));

        let cache = MediaCache::load(pool, resolver, files, fast_options())
            .await
            .unwrap();
        // One entry per file, no movie dedup at queue build time
        assert_eq!(cache.queue_progress().total, 2);
        wait_idle(&cache).await;

        // The processor's in-memory re-check absorbed the duplicate
        assert_eq!(provider.call_count("search_movies"), 1);
    }

    #[tokio::test]
    async fn test_show_entries_are_deduplicated() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.tv_searches.insert(
            ("Breaking Bad".to_string(), None),
            vec![search_show(1396, "Breaking Bad")],
        );
        let provider = Arc::new(stub);
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let files = collect_media_files(MemoryNode::dir(
            "share",
            vec![MemoryNode::dir(
                "Shows",
                vec![
                    MemoryNode::file("Breaking.Bad.S01E01.mp4", b"a"),
                    MemoryNode::file("Breaking.Bad.S01E02.mp4", b"b"),
                    MemoryNode::file("Breaking.Bad.S02E01.mp4", b"c"),
                ],
            )],
        ));

        let cache = MediaCache::load(pool, resolver, files, fast_options())
            .await
            .unwrap();
        // A show with many episode files is fetched once
        assert_eq!(cache.queue_progress().total, 1);
        wait_idle(&cache).await;

        assert_eq!(provider.call_count("search_tv"), 1);
        let projection = cache.get_show_data("Breaking Bad").unwrap();
        assert_eq!(projection.tmdb_id(), 1396);
    }

    #[tokio::test]
    async fn test_negative_result_is_durable() {
        let pool = test_pool().await;
        let provider = Arc::new(StubProvider::default());
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let files = collect_media_files(MemoryNode::dir(
            "share",
            vec![MemoryNode::dir(
                "Movies",
                vec![MemoryNode::file("Holiday.Footage.2021.mp4", b"x")],
            )],
        ));

        let cache = MediaCache::load(pool.clone(), resolver.clone(), files.clone(), fast_options())
            .await
            .unwrap();
        wait_idle(&cache).await;

        let entry = lookup::get(&pool, "movie:Holiday Footage:2021")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.tmdb_id, None);
        assert!(cache.get_movie_data("Holiday Footage", Some(2021)).is_none());
        let calls_after_first = provider.call_count("search_movies");
        drop(cache);

        // A later load respects the negative entry and never re-queues it
        let cache = MediaCache::load(pool, resolver, files, fast_options())
            .await
            .unwrap();
        assert_eq!(cache.queue_progress().total, 0);
        assert_eq!(provider.call_count("search_movies"), calls_after_first);
    }

    #[tokio::test]
    async fn test_shutdown_discards_remaining_queue() {
        let pool = test_pool().await;
        let provider = Arc::new(StubProvider::default());
        let resolver = Arc::new(Resolver::new(provider.clone()));

        let files: Vec<MediaFile> = (0..40)
            .map(|i| MemoryNode::file(&format!("Movie.Number.{:02}.2020.mp4", i), b"x"))
            .map(|node| {
                collect_media_files(MemoryNode::dir("share", vec![MemoryNode::dir("Movies", vec![node])]))
                    .pop()
                    .unwrap()
            })
            .collect();

        let options = MediaCacheOptions {
            throttle: Duration::from_millis(25),
            ..MediaCacheOptions::default()
        };
        let cache = MediaCache::load(pool, resolver, files, options).await.unwrap();
        assert_eq!(cache.queue_progress().total, 40);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.shutdown();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The in-flight item finished, everything after it was dropped
        assert!(cache.queue_progress().current < 40);
        assert!(!cache.is_processing());
    }
}
