// Configuration module for megashelf
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::library::cache::MediaCacheOptions;

const APP_NAME: &str = "megashelf";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Metadata provider configuration
    pub metadata: MetadataConfig,

    /// Client-side cache and resolution queue tuning
    pub cache: CacheConfig,

    /// Library autoload configuration
    pub library: LibrarySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8099)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8099,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (database location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// TMDB API key (TMDB_API_KEY env var takes priority)
    pub tmdb_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Durable lookup entries older than this are swept at library load
    /// (default: 7 days)
    pub max_age_days: u64,

    /// Fixed sleep between background resolution queue items, the sole
    /// rate limiter against the metadata API (default: 100)
    pub throttle_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            throttle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    /// Directory to load as the library on startup
    pub autoload: Option<PathBuf>,
}

/// Application paths following the XDG Base Directory Specification,
/// with platform fallbacks.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    pub config_dir: PathBuf,

    /// Directory for persistent data (database)
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_config_dir(&overrides.config_dir),
            data_dir: Self::resolve_data_dir(&overrides.data_dir),
        }
    }

    /// Current-directory paths for portable installations.
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd,
        }
    }

    fn resolve_config_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("MEGASHELF_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn resolve_data_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("MEGASHELF_DATA_DIR") {
            return PathBuf::from(path);
        }
        if let Some(path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::data_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("megashelf.db")
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

/// Application configuration - TOML file combined with environment
/// overrides (environment wins).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub port: u16,
    pub bind_address: String,
    pub tmdb_api_key: Option<String>,
    pub cache_max_age_days: u64,
    pub queue_throttle_ms: u64,
    pub library_autoload: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Self {
        let portable_mode = std::env::var("MEGASHELF_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let config_file = Self::load_config_file(
                &std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            );
            return Self::build(config_file, AppPaths::current_dir());
        }

        let config_dir = AppPaths::resolve_config_dir(&None);
        let config_file = Self::load_config_file(&config_dir);
        let paths = AppPaths::new(&config_file.paths);
        Self::build(config_file, paths)
    }

    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    fn build(config_file: ConfigFile, paths: AppPaths) -> Self {
        let port = std::env::var("MEGASHELF_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.server.port);

        let bind_address = std::env::var("MEGASHELF_BIND_ADDRESS")
            .ok()
            .unwrap_or(config_file.server.bind_address);

        let tmdb_api_key = std::env::var("TMDB_API_KEY")
            .ok()
            .or(config_file.metadata.tmdb_api_key);

        Self {
            paths,
            port,
            bind_address,
            tmdb_api_key,
            cache_max_age_days: config_file.cache.max_age_days,
            queue_throttle_ms: config_file.cache.throttle_ms,
            library_autoload: config_file.library.autoload,
        }
    }

    pub fn database_url(&self) -> String {
        self.paths.database_url()
    }

    pub fn cache_options(&self) -> MediaCacheOptions {
        MediaCacheOptions {
            max_age: Duration::from_secs(self.cache_max_age_days * 24 * 60 * 60),
            throttle: Duration::from_millis(self.queue_throttle_ms),
        }
    }

    pub fn log_config(&self) {
        tracing::info!("Configuration directory: {}", self.paths.config_dir.display());
        tracing::info!("Data directory: {}", self.paths.data_dir.display());
        tracing::debug!("Database path: {}", self.paths.database_path().display());
        tracing::info!("Listening on {}:{}", self.bind_address, self.port);
        tracing::info!(
            "TMDB API key: {}",
            if self.tmdb_api_key.is_some() {
                "configured"
            } else {
                "missing"
            }
        );
        tracing::info!(
            "Lookup cache max age: {} days, queue throttle: {} ms",
            self.cache_max_age_days,
            self.queue_throttle_ms
        );
        if let Some(path) = &self.library_autoload {
            tracing::info!("Library autoload: {}", path.display());
        }
    }
}
