// Server-side resolution cache for shows, seasons and episodes
//
// Shows cascade over their season stubs only; a season's episode list is
// cached lazily the first time that season is actually requested, which
// keeps a whole-library show scan to one provider call per show.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    Episode, EpisodeCredit, EpisodeRow, Genre, Person, Role, Season, SeasonRow, Show, ShowRow,
};
use crate::services::movie_cache::{cache_person, upsert_genre};
use crate::services::provider::MetadataProvider;
use crate::services::resolver::Resolver;
use crate::services::tmdb::{TmdbCast, TmdbEpisode, TmdbShow};
use crate::services::ResolveError;

/// How many guest stars are persisted per episode.
const GUEST_STAR_LIMIT: usize = 5;

/// Share-side location of an episode's file, attached when the library
/// walker has matched the episode to a concrete node.
#[derive(Debug, Clone, Default)]
pub struct EpisodeSource {
    pub thumbnail: Option<String>,
    pub file_key: Option<String>,
    pub path: Option<String>,
}

/// Read-through fetch of a fully assembled show.
pub async fn get_or_fetch_show(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    tmdb_id: i64,
) -> Result<Show, ResolveError> {
    if let Some(show) = find_show(pool, tmdb_id).await? {
        return Ok(show);
    }

    let tmdb_show = provider
        .get_show_details(tmdb_id)
        .await
        .map_err(ResolveError::from_tmdb)?;

    cache_show(pool, &tmdb_show).await
}

/// Persist a show, its genres and its season stubs (episodes excluded).
pub async fn cache_show(pool: &SqlitePool, tmdb_show: &TmdbShow) -> Result<Show, ResolveError> {
    let mut genres = Vec::with_capacity(tmdb_show.genres.len());
    for genre in &tmdb_show.genres {
        genres.push(upsert_genre(pool, genre).await?);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let show_row: ShowRow = sqlx::query_as(
        r#"
        INSERT INTO shows (tmdb_id, name, overview, first_air_date, poster_path, backdrop_path,
                           vote_average, vote_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            name = excluded.name,
            overview = excluded.overview,
            first_air_date = excluded.first_air_date,
            poster_path = excluded.poster_path,
            backdrop_path = excluded.backdrop_path,
            vote_average = excluded.vote_average,
            vote_count = excluded.vote_count,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(tmdb_show.id)
    .bind(&tmdb_show.name)
    .bind(&tmdb_show.overview)
    .bind(&tmdb_show.first_air_date)
    .bind(&tmdb_show.poster_path)
    .bind(&tmdb_show.backdrop_path)
    .bind(tmdb_show.vote_average)
    .bind(tmdb_show.vote_count)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM show_genres WHERE show_id = ?")
        .bind(show_row.id)
        .execute(&mut *tx)
        .await?;
    for genre in &genres {
        sqlx::query("INSERT INTO show_genres (show_id, genre_id) VALUES (?, ?)")
            .bind(show_row.id)
            .bind(genre.id)
            .execute(&mut *tx)
            .await?;
    }

    // Season stubs from the show details; specials (season 0) are skipped
    for season in tmdb_show.seasons.iter().filter(|s| s.season_number > 0) {
        sqlx::query(
            r#"
            INSERT INTO seasons (tmdb_id, show_id, season_number, name, overview, poster_path,
                                 air_date, episode_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tmdb_id) DO UPDATE SET
                season_number = excluded.season_number,
                name = excluded.name,
                overview = excluded.overview,
                poster_path = excluded.poster_path,
                air_date = excluded.air_date,
                episode_count = excluded.episode_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(season.id)
        .bind(show_row.id)
        .bind(season.season_number)
        .bind(&season.name)
        .bind(&season.overview)
        .bind(&season.poster_path)
        .bind(&season.air_date)
        .bind(season.episode_count)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!("Cached show '{}' ({})", tmdb_show.name, tmdb_show.id);

    find_show(pool, tmdb_show.id)
        .await?
        .ok_or(ResolveError::NotFound)
}

/// Fetch and persist one season's episode list (lazy, per-season).
pub async fn cache_season(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    show_id: i64,
    tmdb_show_id: i64,
    season_number: i64,
) -> Result<Season, ResolveError> {
    let tmdb_season = provider
        .get_season_details(tmdb_show_id, season_number)
        .await
        .map_err(ResolveError::from_tmdb)?;

    let now = Utc::now();
    let season_row: SeasonRow = sqlx::query_as(
        r#"
        INSERT INTO seasons (tmdb_id, show_id, season_number, name, overview, poster_path,
                             air_date, episode_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            season_number = excluded.season_number,
            name = excluded.name,
            overview = excluded.overview,
            poster_path = excluded.poster_path,
            air_date = excluded.air_date,
            episode_count = excluded.episode_count,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(tmdb_season.id)
    .bind(show_id)
    .bind(tmdb_season.season_number)
    .bind(&tmdb_season.name)
    .bind(&tmdb_season.overview)
    .bind(&tmdb_season.poster_path)
    .bind(&tmdb_season.air_date)
    .bind(tmdb_season.episodes.len() as i64)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    for episode in &tmdb_season.episodes {
        cache_episode(pool, provider, season_row.id, episode, None).await?;
    }

    find_season(pool, season_row.id)
        .await?
        .ok_or(ResolveError::NotFound)
}

/// Persist one episode with its guest stars (top 5) and directors.
pub async fn cache_episode(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    season_id: i64,
    tmdb_episode: &TmdbEpisode,
    source: Option<&EpisodeSource>,
) -> Result<Episode, ResolveError> {
    let guest_stars: Vec<&TmdbCast> = tmdb_episode.guest_stars.iter().take(GUEST_STAR_LIMIT).collect();
    let directors: Vec<i64> = tmdb_episode
        .crew
        .iter()
        .filter(|member| member.job.as_deref() == Some("Director"))
        .map(|member| member.id)
        .collect();

    let mut cached_guests = Vec::with_capacity(guest_stars.len());
    for guest in &guest_stars {
        cached_guests.push(cache_person(pool, provider, guest.id).await?);
    }
    let mut cached_directors = Vec::with_capacity(directors.len());
    for director_id in &directors {
        cached_directors.push(cache_person(pool, provider, *director_id).await?);
    }

    let now = Utc::now();
    let source = source.cloned().unwrap_or_default();
    let episode_row: EpisodeRow = sqlx::query_as(
        r#"
        INSERT INTO episodes (tmdb_id, season_id, episode_number, name, overview, still_path,
                              air_date, runtime, vote_average, mega_thumbnail, mega_file_key,
                              mega_path, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            episode_number = excluded.episode_number,
            name = excluded.name,
            overview = excluded.overview,
            still_path = excluded.still_path,
            air_date = excluded.air_date,
            runtime = excluded.runtime,
            vote_average = excluded.vote_average,
            mega_thumbnail = excluded.mega_thumbnail,
            mega_file_key = excluded.mega_file_key,
            mega_path = excluded.mega_path,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(tmdb_episode.id)
    .bind(season_id)
    .bind(tmdb_episode.episode_number)
    .bind(&tmdb_episode.name)
    .bind(&tmdb_episode.overview)
    .bind(&tmdb_episode.still_path)
    .bind(&tmdb_episode.air_date)
    .bind(tmdb_episode.runtime)
    .bind(tmdb_episode.vote_average)
    .bind(&source.thumbnail)
    .bind(&source.file_key)
    .bind(&source.path)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    for (guest, cast) in cached_guests.iter().zip(guest_stars.iter()) {
        sqlx::query(
            "INSERT INTO episode_people (person_id, episode_id, role, character, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(person_id, episode_id, role) DO UPDATE SET character = excluded.character",
        )
        .bind(guest.id)
        .bind(episode_row.id)
        .bind(Role::Actor.as_str())
        .bind(&cast.character)
        .bind(now)
        .execute(pool)
        .await?;
    }
    for director in &cached_directors {
        sqlx::query(
            "INSERT INTO episode_people (person_id, episode_id, role, character, created_at)
             VALUES (?, ?, ?, NULL, ?)
             ON CONFLICT(person_id, episode_id, role) DO NOTHING",
        )
        .bind(director.id)
        .bind(episode_row.id)
        .bind(Role::Director.as_str())
        .bind(now)
        .execute(pool)
        .await?;
    }

    let people = episode_people(pool, episode_row.id).await?;
    Ok(Episode {
        episode: episode_row,
        people,
    })
}

/// Read-through season fetch: the episode list is cached the first time a
/// season is actually requested.
pub async fn get_or_fetch_season(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    show_tmdb_id: i64,
    season_number: i64,
) -> Result<Season, ResolveError> {
    let show = get_or_fetch_show(pool, provider, show_tmdb_id).await?;

    if let Some(season_row) = find_cached_season(pool, show.show.id, season_number).await? {
        if let Some(season) = find_season(pool, season_row.id).await? {
            if !season.episodes.is_empty() {
                return Ok(season);
            }
        }
    }

    cache_season(pool, provider, show.show.id, show_tmdb_id, season_number).await
}

/// Search for a show and cache the first hit.
pub async fn search_and_cache_show(
    pool: &SqlitePool,
    resolver: &Resolver,
    title: &str,
    year: Option<i32>,
) -> Result<Option<Show>, ResolveError> {
    let results = resolver.resolve_show(title, year).await?;

    let Some(first) = results.results.first() else {
        return Ok(None);
    };

    let show = get_or_fetch_show(pool, resolver.provider().as_ref(), first.id).await?;
    Ok(Some(show))
}

/// Assemble a cached show with genres and seasons, if present.
///
/// Episode credit lists are left empty in the show view; the season view
/// assembles them.
async fn find_show(pool: &SqlitePool, tmdb_id: i64) -> Result<Option<Show>, sqlx::Error> {
    let row: Option<ShowRow> = sqlx::query_as("SELECT * FROM shows WHERE tmdb_id = ?")
        .bind(tmdb_id)
        .fetch_optional(pool)
        .await?;
    let Some(show) = row else {
        return Ok(None);
    };

    let genres: Vec<Genre> = sqlx::query_as(
        "SELECT g.* FROM genres g
         INNER JOIN show_genres sg ON sg.genre_id = g.id
         WHERE sg.show_id = ?
         ORDER BY g.name",
    )
    .bind(show.id)
    .fetch_all(pool)
    .await?;

    let season_rows: Vec<SeasonRow> =
        sqlx::query_as("SELECT * FROM seasons WHERE show_id = ? ORDER BY season_number")
            .bind(show.id)
            .fetch_all(pool)
            .await?;

    let mut seasons = Vec::with_capacity(season_rows.len());
    for season_row in season_rows {
        let episode_rows: Vec<EpisodeRow> =
            sqlx::query_as("SELECT * FROM episodes WHERE season_id = ? ORDER BY episode_number")
                .bind(season_row.id)
                .fetch_all(pool)
                .await?;
        seasons.push(Season {
            season: season_row,
            episodes: episode_rows
                .into_iter()
                .map(|episode| Episode {
                    episode,
                    people: Vec::new(),
                })
                .collect(),
        });
    }

    Ok(Some(Show {
        show,
        genres,
        seasons,
    }))
}

/// Look up a cached season by show + season number, without fetching.
pub async fn find_cached_season(
    pool: &SqlitePool,
    show_id: i64,
    season_number: i64,
) -> Result<Option<SeasonRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seasons WHERE show_id = ? AND season_number = ?")
        .bind(show_id)
        .bind(season_number)
        .fetch_optional(pool)
        .await
}

async fn find_season(pool: &SqlitePool, season_id: i64) -> Result<Option<Season>, sqlx::Error> {
    let row: Option<SeasonRow> = sqlx::query_as("SELECT * FROM seasons WHERE id = ?")
        .bind(season_id)
        .fetch_optional(pool)
        .await?;
    let Some(season_row) = row else {
        return Ok(None);
    };

    let episode_rows: Vec<EpisodeRow> =
        sqlx::query_as("SELECT * FROM episodes WHERE season_id = ? ORDER BY episode_number")
            .bind(season_row.id)
            .fetch_all(pool)
            .await?;

    let mut episodes = Vec::with_capacity(episode_rows.len());
    for episode_row in episode_rows {
        let people = episode_people(pool, episode_row.id).await?;
        episodes.push(Episode {
            episode: episode_row,
            people,
        });
    }

    Ok(Some(Season {
        season: season_row,
        episodes,
    }))
}

#[derive(sqlx::FromRow)]
struct EpisodeCreditRow {
    credit_id: i64,
    role: String,
    character: Option<String>,
    credit_created_at: chrono::DateTime<Utc>,
    person_id: i64,
    person_tmdb_id: i64,
    person_name: String,
    biography: Option<String>,
    birthday: Option<String>,
    deathday: Option<String>,
    profile_path: Option<String>,
    person_created_at: chrono::DateTime<Utc>,
}

async fn episode_people(
    pool: &SqlitePool,
    episode_id: i64,
) -> Result<Vec<EpisodeCredit>, sqlx::Error> {
    let rows: Vec<EpisodeCreditRow> = sqlx::query_as(
        "SELECT ep.id AS credit_id, ep.role, ep.character, ep.created_at AS credit_created_at,
                p.id AS person_id, p.tmdb_id AS person_tmdb_id, p.name AS person_name,
                p.biography, p.birthday, p.deathday, p.profile_path,
                p.created_at AS person_created_at
         FROM episode_people ep
         INNER JOIN people p ON p.id = ep.person_id
         WHERE ep.episode_id = ?
         ORDER BY ep.id",
    )
    .bind(episode_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EpisodeCredit {
            id: row.credit_id,
            role: Role::from_db(&row.role),
            character: row.character,
            created_at: row.credit_created_at,
            person: Person {
                id: row.person_id,
                tmdb_id: row.person_tmdb_id,
                name: row.person_name,
                biography: row.biography,
                birthday: row.birthday,
                deathday: row.deathday,
                profile_path: row.profile_path,
                created_at: row.person_created_at,
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::provider::testing::{person_details, search_show, StubProvider};
    use crate::services::tmdb::{TmdbCrew, TmdbGenre, TmdbSeasonDetails, TmdbSeasonStub};
    use std::sync::Arc;

    fn breaking_bad() -> TmdbShow {
        TmdbShow {
            id: 1396,
            name: "Breaking Bad".to_string(),
            overview: Some("A chemistry teacher turns to crime.".to_string()),
            first_air_date: Some("2008-01-20".to_string()),
            poster_path: None,
            backdrop_path: None,
            vote_average: Some(8.9),
            vote_count: Some(12000),
            genres: vec![TmdbGenre {
                id: 18,
                name: "Drama".to_string(),
            }],
            seasons: vec![
                TmdbSeasonStub {
                    id: 3572,
                    season_number: 0,
                    name: "Specials".to_string(),
                    overview: None,
                    poster_path: None,
                    air_date: None,
                    episode_count: Some(3),
                },
                TmdbSeasonStub {
                    id: 3573,
                    season_number: 1,
                    name: "Season 1".to_string(),
                    overview: None,
                    poster_path: None,
                    air_date: Some("2008-01-20".to_string()),
                    episode_count: Some(7),
                },
                TmdbSeasonStub {
                    id: 3575,
                    season_number: 2,
                    name: "Season 2".to_string(),
                    overview: None,
                    poster_path: None,
                    air_date: Some("2009-03-08".to_string()),
                    episode_count: Some(13),
                },
            ],
        }
    }

    fn season_one() -> TmdbSeasonDetails {
        TmdbSeasonDetails {
            id: 3573,
            season_number: 1,
            name: "Season 1".to_string(),
            overview: None,
            poster_path: None,
            air_date: Some("2008-01-20".to_string()),
            episodes: vec![TmdbEpisode {
                id: 62085,
                episode_number: 1,
                name: Some("Pilot".to_string()),
                overview: None,
                still_path: None,
                air_date: Some("2008-01-20".to_string()),
                runtime: Some(58),
                vote_average: Some(8.2),
                guest_stars: (1..=7)
                    .map(|i| TmdbCast {
                        id: 300 + i,
                        name: format!("Guest {}", i),
                        character: Some(format!("Role {}", i)),
                        profile_path: None,
                        order: Some(i as i32),
                    })
                    .collect(),
                crew: vec![TmdbCrew {
                    id: 400,
                    name: "Vince Gilligan".to_string(),
                    job: Some("Director".to_string()),
                    department: Some("Directing".to_string()),
                    profile_path: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_show_cascade_skips_specials_and_episodes() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.shows.insert(1396, breaking_bad());

        let show = get_or_fetch_show(&pool, &stub, 1396).await.unwrap();
        assert_eq!(show.show.tmdb_id, 1396);
        assert_eq!(show.genres.len(), 1);
        // Season 0 is skipped; the rest are stubs with no episodes yet
        assert_eq!(show.seasons.len(), 2);
        assert!(show.seasons.iter().all(|s| s.episodes.is_empty()));
        assert_eq!(show.seasons[0].season.season_number, 1);

        // No per-season fetches happened during the show cascade
        assert_eq!(stub.call_count("season_details"), 0);
    }

    #[tokio::test]
    async fn test_show_second_fetch_is_cached() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.shows.insert(1396, breaking_bad());

        get_or_fetch_show(&pool, &stub, 1396).await.unwrap();
        get_or_fetch_show(&pool, &stub, 1396).await.unwrap();
        assert_eq!(stub.call_count("show_details"), 1);
    }

    #[tokio::test]
    async fn test_season_caches_episodes_lazily() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.shows.insert(1396, breaking_bad());
        stub.seasons.insert((1396, 1), season_one());
        for i in 1..=7 {
            stub.people
                .insert(300 + i, person_details(300 + i, &format!("Guest {}", i)));
        }
        stub.people.insert(400, person_details(400, "Vince Gilligan"));

        let show = get_or_fetch_show(&pool, &stub, 1396).await.unwrap();
        let season = cache_season(&pool, &stub, show.show.id, 1396, 1).await.unwrap();

        assert_eq!(season.season.tmdb_id, 3573);
        assert_eq!(season.episodes.len(), 1);
        let episode = &season.episodes[0];
        assert_eq!(episode.episode.tmdb_id, 62085);
        // 5 of the 7 guest stars plus the director
        assert_eq!(episode.people.len(), 6);
        assert_eq!(
            episode
                .people
                .iter()
                .filter(|p| p.role == Role::Director)
                .count(),
            1
        );

        // Caching the same season again must not duplicate episodes
        cache_season(&pool, &stub, show.show.id, 1396, 1).await.unwrap();
        let episode_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(episode_count.0, 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_season_is_read_through() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.shows.insert(1396, breaking_bad());
        stub.seasons.insert((1396, 1), season_one());
        for i in 1..=7 {
            stub.people
                .insert(300 + i, person_details(300 + i, &format!("Guest {}", i)));
        }
        stub.people.insert(400, person_details(400, "Vince Gilligan"));

        let season = get_or_fetch_season(&pool, &stub, 1396, 1).await.unwrap();
        assert_eq!(season.episodes.len(), 1);
        assert_eq!(stub.call_count("season_details"), 1);

        // A second request is served from the cache
        let season = get_or_fetch_season(&pool, &stub, 1396, 1).await.unwrap();
        assert_eq!(season.episodes.len(), 1);
        assert_eq!(stub.call_count("season_details"), 1);
    }

    #[tokio::test]
    async fn test_search_and_cache_show() {
        let pool = test_pool().await;
        let mut stub = StubProvider::default();
        stub.tv_searches.insert(
            ("Breaking Bad".to_string(), None),
            vec![search_show(1396, "Breaking Bad")],
        );
        stub.shows.insert(1396, breaking_bad());
        let resolver = Resolver::new(Arc::new(stub));

        let show = search_and_cache_show(&pool, &resolver, "Breaking Bad", None)
            .await
            .unwrap();
        assert_eq!(show.unwrap().show.tmdb_id, 1396);

        let missing = search_and_cache_show(&pool, &resolver, "No Such Show", None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
