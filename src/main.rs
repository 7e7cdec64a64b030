use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod library;
mod models;
mod services;
mod text;
mod wire;

use config::AppConfig;
use library::cache::MediaCache;
use services::provider::MetadataProvider;
use services::resolver::Resolver;
use services::tmdb::TmdbClient;

/// A loaded library: the share tree root for browsing/streaming plus the
/// per-library cache. Replaced wholesale when the library source changes.
pub struct LoadedLibrary {
    pub root: Arc<dyn library::ShareNode>,
    pub cache: Arc<MediaCache>,
}

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    pub resolver: Arc<Resolver>,
    pub library: tokio::sync::RwLock<Option<LoadedLibrary>>,
}

impl AppState {
    /// The metadata provider behind the resolver, for the read-through
    /// entity caches.
    pub fn provider(&self) -> &dyn MetadataProvider {
        self.resolver.provider().as_ref()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "megashelf=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    let api_key = config
        .tmdb_api_key
        .clone()
        .context("TMDB_API_KEY is not set (environment or [metadata] in config.toml)")?;

    // Database setup
    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        // WAL mode for better concurrent read/write performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync is safe with WAL and much faster
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Enable foreign key enforcement
        .foreign_keys(true)
        // Busy timeout for concurrent access (5 seconds)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options)
        .await?;

    db::migrate(&pool).await?;

    let provider: Arc<dyn MetadataProvider> = Arc::new(TmdbClient::new(api_key));
    let resolver = Arc::new(Resolver::new(provider));

    let state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        resolver: resolver.clone(),
        library: tokio::sync::RwLock::new(None),
    });

    // Autoload a library in the background so startup never blocks on a
    // full share walk
    if let Some(autoload_path) = config.library_autoload.clone() {
        let autoload_state = state.clone();
        tokio::spawn(async move {
            // Small delay to let the server fully start
            tokio::time::sleep(Duration::from_millis(500)).await;

            if !autoload_path.is_dir() {
                tracing::warn!(
                    "Skipping library autoload: not a directory: {}",
                    autoload_path.display()
                );
                return;
            }

            let root = library::FsNode::new(autoload_path.clone());
            let walk_root = root.clone();
            let files = match tokio::task::spawn_blocking(move || {
                library::collect_media_files(walk_root)
            })
            .await
            {
                Ok(files) => files,
                Err(err) => {
                    tracing::error!("Library autoload walk failed: {}", err);
                    return;
                }
            };

            tracing::info!(
                "Autoloading library from {} ({} files)",
                autoload_path.display(),
                files.len()
            );

            match MediaCache::load(
                autoload_state.db.clone(),
                autoload_state.resolver.clone(),
                files,
                autoload_state.config.cache_options(),
            )
            .await
            {
                Ok(cache) => {
                    let mut library = autoload_state.library.write().await;
                    if let Some(previous) = library.take() {
                        previous.cache.shutdown();
                    }
                    *library = Some(LoadedLibrary {
                        root,
                        cache: Arc::new(cache),
                    });
                }
                Err(err) => tracing::error!("Library autoload failed: {}", err),
            }
        });
    }

    // Root handler
    async fn root_handler() -> &'static str {
        "megashelf"
    }

    // Build router
    let app = Router::new()
        .route("/", get(root_handler).head(root_handler))
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let bind_address: std::net::IpAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;
    let addr = SocketAddr::from((bind_address, config.port));
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Discard the resolution queue; the in-flight item finishes
    if let Some(loaded) = state.library.write().await.take() {
        loaded.cache.shutdown();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}
