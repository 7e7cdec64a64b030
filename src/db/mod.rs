use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Every canonical entity is keyed by the metadata
/// provider's own id (`tmdb_id`, UNIQUE); the integer `id` column exists
/// only for local relational joins. All writers upsert on `tmdb_id`, so
/// concurrent resolutions of the same title converge to a single row.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            biography TEXT,
            birthday TEXT,
            deathday TEXT,
            profile_path TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            overview TEXT,
            poster_path TEXT,
            backdrop_path TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS movies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            overview TEXT,
            release_date TEXT,
            poster_path TEXT,
            backdrop_path TEXT,
            vote_average REAL,
            vote_count INTEGER,
            runtime INTEGER,
            tagline TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS movie_genres (
            movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            genre_id INTEGER NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
            PRIMARY KEY (movie_id, genre_id)
        );

        CREATE TABLE IF NOT EXISTS movie_collections (
            movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            PRIMARY KEY (movie_id, collection_id)
        );

        CREATE TABLE IF NOT EXISTS movie_people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            character TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(person_id, movie_id, role)
        );

        CREATE TABLE IF NOT EXISTS shows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            overview TEXT,
            first_air_date TEXT,
            poster_path TEXT,
            backdrop_path TEXT,
            vote_average REAL,
            vote_count INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS show_genres (
            show_id INTEGER NOT NULL REFERENCES shows(id) ON DELETE CASCADE,
            genre_id INTEGER NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
            PRIMARY KEY (show_id, genre_id)
        );

        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            show_id INTEGER NOT NULL REFERENCES shows(id) ON DELETE CASCADE,
            season_number INTEGER NOT NULL,
            name TEXT NOT NULL,
            overview TEXT,
            poster_path TEXT,
            air_date TEXT,
            episode_count INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS episodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tmdb_id INTEGER NOT NULL UNIQUE,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            episode_number INTEGER NOT NULL,
            name TEXT,
            overview TEXT,
            still_path TEXT,
            air_date TEXT,
            runtime INTEGER,
            vote_average REAL,
            mega_thumbnail TEXT,
            mega_file_key TEXT,
            mega_path TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS episode_people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            episode_id INTEGER NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            character TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(person_id, episode_id, role)
        );

        -- Client-side lookup cache: natural key -> resolved projection.
        -- tmdb_id NULL is a recorded negative result, distinct from the
        -- key being absent entirely.
        CREATE TABLE IF NOT EXISTS lookup_cache (
            key TEXT PRIMARY KEY,
            tmdb_id INTEGER,
            data TEXT,
            timestamp INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    tracing::debug!("Database migrations complete");
    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Relation walks when assembling an entity with its nested sets
        "CREATE INDEX IF NOT EXISTS idx_movie_genres_movie ON movie_genres(movie_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_collections_movie ON movie_collections(movie_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_collections_collection ON movie_collections(collection_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_people_movie ON movie_people(movie_id)",
        "CREATE INDEX IF NOT EXISTS idx_show_genres_show ON show_genres(show_id)",
        "CREATE INDEX IF NOT EXISTS idx_seasons_show ON seasons(show_id)",
        "CREATE INDEX IF NOT EXISTS idx_episodes_season ON episodes(season_id)",
        "CREATE INDEX IF NOT EXISTS idx_episode_people_episode ON episode_people(episode_id)",
        // Age sweep over the lookup cache
        "CREATE INDEX IF NOT EXISTS idx_lookup_cache_timestamp ON lookup_cache(timestamp)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // A single connection so every handle sees the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    migrate(&pool).await.expect("migrate");
    pool
}
