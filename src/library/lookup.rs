// Durable lookup cache
//
// Keyed by the natural key derived from a parsed filename
// ("movie:<title>:<year|unknown>" / "show:<title>"), so repeated runs
// never re-resolve a title the library has already seen. A row with a
// NULL tmdb_id records a negative result ("resolution attempted, nothing
// found"), which is distinct from the key being absent. Eviction is a
// sweep by age at library load, not LRU.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Display projection stored alongside a positive resolution. Validated
/// when read back; an unreadable payload is treated as a miss instead of
/// being trusted blindly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Projection {
    #[serde(rename_all = "camelCase")]
    Movie {
        tmdb_id: i64,
        title: String,
        poster_path: Option<String>,
        release_date: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Show {
        tmdb_id: i64,
        name: String,
        poster_path: Option<String>,
        first_air_date: Option<String>,
    },
}

impl Projection {
    pub fn tmdb_id(&self) -> i64 {
        match self {
            Projection::Movie { tmdb_id, .. } | Projection::Show { tmdb_id, .. } => *tmdb_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedLookup {
    pub key: String,
    pub tmdb_id: Option<i64>,
    pub data: Option<Projection>,
    pub timestamp: i64,
}

pub fn movie_key(clean_title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("movie:{}:{}", clean_title, year),
        None => format!("movie:{}:unknown", clean_title),
    }
}

pub fn show_key(clean_title: &str) -> String {
    format!("show:{}", clean_title)
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<CachedLookup>, sqlx::Error> {
    let row: Option<(String, Option<i64>, Option<String>, i64)> =
        sqlx::query_as("SELECT key, tmdb_id, data, timestamp FROM lookup_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    let Some((key, tmdb_id, data, timestamp)) = row else {
        return Ok(None);
    };

    let data = match data {
        Some(raw) => match serde_json::from_str::<Projection>(&raw) {
            Ok(projection) => Some(projection),
            Err(err) => {
                tracing::warn!("Discarding unreadable cache entry '{}': {}", key, err);
                return Ok(None);
            }
        },
        None => None,
    };

    Ok(Some(CachedLookup {
        key,
        tmdb_id,
        data,
        timestamp,
    }))
}

pub async fn put(pool: &SqlitePool, entry: &CachedLookup) -> Result<(), sqlx::Error> {
    let data = match &entry.data {
        Some(projection) => Some(
            serde_json::to_string(projection)
                .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
        ),
        None => None,
    };

    sqlx::query(
        "INSERT OR REPLACE INTO lookup_cache (key, tmdb_id, data, timestamp) VALUES (?, ?, ?, ?)",
    )
    .bind(&entry.key)
    .bind(entry.tmdb_id)
    .bind(data)
    .bind(entry.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// Sweep entries whose timestamp is at or before `cutoff_ms`.
pub async fn delete_older_than(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM lookup_cache WHERE timestamp <= ?")
        .bind(cutoff_ms)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
