// Server-side resolution cache for movies, people and collections
//
// Read-through over the relational store: look up by tmdb_id, fetch from
// the provider on a miss, persist via upsert. Concurrent misses for the
// same id converge on one row because every write is an upsert keyed on
// tmdb_id; no in-process locking. A failed cascade step fails the whole
// operation; sibling upserts that already completed stay behind and are
// harmless to retry.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    Collection, CollectionPart, CollectionWithParts, FilmographyEntry, Genre, Movie, MovieCredit,
    MovieRow, Person, PersonWithCredits, Role,
};
use crate::services::provider::MetadataProvider;
use crate::services::tmdb::{TmdbCast, TmdbCollection, TmdbCrew, TmdbGenre, TmdbMovie, TmdbPerson};
use crate::services::ResolveError;

/// How many billed cast members are persisted per movie.
const CAST_LIMIT: usize = 10;

/// Read-through fetch of a fully assembled movie.
pub async fn get_or_fetch_movie(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    tmdb_id: i64,
) -> Result<Movie, ResolveError> {
    if let Some(movie) = find_movie(pool, tmdb_id).await? {
        return Ok(movie);
    }

    let tmdb_movie = provider
        .get_movie_details(tmdb_id)
        .await
        .map_err(ResolveError::from_tmdb)?;

    cache_movie(pool, provider, &tmdb_movie).await
}

/// Persist a movie and its relation sets.
///
/// Cascade order: genres, then the billed cast (top 10) and all directors
/// as Person rows (each its own read-through), then the parent collection,
/// and finally the movie row with its genre/person association sets
/// replaced inside one transaction so no reader observes a half-written
/// relation set.
pub async fn cache_movie(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    tmdb_movie: &TmdbMovie,
) -> Result<Movie, ResolveError> {
    // A concurrent caller may have fully cached this movie already
    if let Some(existing) = find_movie(pool, tmdb_movie.id).await? {
        return Ok(existing);
    }

    let mut genres = Vec::with_capacity(tmdb_movie.genres.len());
    for genre in &tmdb_movie.genres {
        genres.push(upsert_genre(pool, genre).await?);
    }

    let directors: Vec<&TmdbCrew> = tmdb_movie
        .credits
        .crew
        .iter()
        .filter(|member| member.job.as_deref() == Some("Director"))
        .collect();
    let actors: Vec<&TmdbCast> = tmdb_movie.credits.cast.iter().take(CAST_LIMIT).collect();

    let mut cached_directors = Vec::with_capacity(directors.len());
    for director in &directors {
        cached_directors.push(cache_person(pool, provider, director.id).await?);
    }

    let mut cached_actors = Vec::with_capacity(actors.len());
    for actor in &actors {
        cached_actors.push(cache_person(pool, provider, actor.id).await?);
    }

    let collection = match &tmdb_movie.belongs_to_collection {
        Some(collection_ref) => Some(cache_collection(pool, provider, collection_ref.id).await?),
        None => None,
    };

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let movie_row: MovieRow = sqlx::query_as(
        r#"
        INSERT INTO movies (tmdb_id, title, overview, release_date, poster_path, backdrop_path,
                            vote_average, vote_count, runtime, tagline, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            title = excluded.title,
            overview = excluded.overview,
            release_date = excluded.release_date,
            poster_path = excluded.poster_path,
            backdrop_path = excluded.backdrop_path,
            vote_average = excluded.vote_average,
            vote_count = excluded.vote_count,
            runtime = excluded.runtime,
            tagline = excluded.tagline,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(tmdb_movie.id)
    .bind(&tmdb_movie.title)
    .bind(&tmdb_movie.overview)
    .bind(&tmdb_movie.release_date)
    .bind(&tmdb_movie.poster_path)
    .bind(&tmdb_movie.backdrop_path)
    .bind(tmdb_movie.vote_average)
    .bind(tmdb_movie.vote_count)
    .bind(tmdb_movie.runtime)
    .bind(&tmdb_movie.tagline)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    // Replace the genre association set
    sqlx::query("DELETE FROM movie_genres WHERE movie_id = ?")
        .bind(movie_row.id)
        .execute(&mut *tx)
        .await?;
    for genre in &genres {
        sqlx::query("INSERT INTO movie_genres (movie_id, genre_id) VALUES (?, ?)")
            .bind(movie_row.id)
            .bind(genre.id)
            .execute(&mut *tx)
            .await?;
    }

    // Replace the person association set, directors first
    sqlx::query("DELETE FROM movie_people WHERE movie_id = ?")
        .bind(movie_row.id)
        .execute(&mut *tx)
        .await?;
    for director in &cached_directors {
        sqlx::query(
            "INSERT INTO movie_people (person_id, movie_id, role, character, created_at)
             VALUES (?, ?, ?, NULL, ?)
             ON CONFLICT(person_id, movie_id, role) DO NOTHING",
        )
        .bind(director.id)
        .bind(movie_row.id)
        .bind(Role::Director.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    for (actor, cast) in cached_actors.iter().zip(actors.iter()) {
        sqlx::query(
            "INSERT INTO movie_people (person_id, movie_id, role, character, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(person_id, movie_id, role) DO UPDATE SET character = excluded.character",
        )
        .bind(actor.id)
        .bind(movie_row.id)
        .bind(Role::Actor.as_str())
        .bind(&cast.character)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(collection) = &collection {
        sqlx::query(
            "INSERT OR IGNORE INTO movie_collections (movie_id, collection_id) VALUES (?, ?)",
        )
        .bind(movie_row.id)
        .bind(collection.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!("Cached movie '{}' ({})", tmdb_movie.title, tmdb_movie.id);

    find_movie(pool, tmdb_movie.id)
        .await?
        .ok_or(ResolveError::NotFound)
}

/// Read-through person cache: scalar row only, no filmography fetch.
pub async fn cache_person(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    person_tmdb_id: i64,
) -> Result<Person, ResolveError> {
    let existing: Option<Person> = sqlx::query_as("SELECT * FROM people WHERE tmdb_id = ?")
        .bind(person_tmdb_id)
        .fetch_optional(pool)
        .await?;
    if let Some(person) = existing {
        return Ok(person);
    }

    let tmdb_person = provider.get_person_details(person_tmdb_id).await?;
    Ok(upsert_person(pool, &tmdb_person).await?)
}

/// Read-through collection cache: scalar row only, member movies attach
/// through the movie cascade.
pub async fn cache_collection(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    collection_tmdb_id: i64,
) -> Result<Collection, ResolveError> {
    let existing: Option<Collection> =
        sqlx::query_as("SELECT * FROM collections WHERE tmdb_id = ?")
            .bind(collection_tmdb_id)
            .fetch_optional(pool)
            .await?;
    if let Some(collection) = existing {
        return Ok(collection);
    }

    let tmdb_collection = provider.get_collection_details(collection_tmdb_id).await?;
    Ok(upsert_collection(pool, &tmdb_collection).await?)
}

/// Fetch a person with their filmography.
///
/// The scalar row is upserted, but the filmography is assembled from the
/// credits the provider inlines on the person payload and never persisted,
/// so this endpoint always reflects the provider's current credit list.
pub async fn get_or_fetch_person(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    tmdb_id: i64,
) -> Result<PersonWithCredits, ResolveError> {
    let tmdb_person = provider
        .get_person_details(tmdb_id)
        .await
        .map_err(ResolveError::from_tmdb)?;

    let person = upsert_person(pool, &tmdb_person).await?;

    let mut movies: Vec<FilmographyEntry> = tmdb_person
        .movie_credits
        .cast
        .iter()
        .map(|credit| FilmographyEntry {
            tmdb_id: credit.id,
            title: credit.title.clone(),
            poster_path: credit.poster_path.clone(),
            release_date: credit.release_date.clone(),
            role: Role::Actor,
            character: credit.character.clone(),
        })
        .collect();

    movies.extend(
        tmdb_person
            .movie_credits
            .crew
            .iter()
            .filter(|credit| credit.job.as_deref() == Some("Director"))
            .map(|credit| FilmographyEntry {
                tmdb_id: credit.id,
                title: credit.title.clone(),
                poster_path: credit.poster_path.clone(),
                release_date: credit.release_date.clone(),
                role: Role::Director,
                character: None,
            }),
    );

    Ok(PersonWithCredits { person, movies })
}

/// Fetch a collection with its locally cached member movies plus the
/// provider's full part list (the parts themselves are not persisted).
pub async fn get_or_fetch_collection(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    tmdb_id: i64,
) -> Result<CollectionWithParts, ResolveError> {
    let tmdb_collection = provider
        .get_collection_details(tmdb_id)
        .await
        .map_err(ResolveError::from_tmdb)?;

    let collection = upsert_collection(pool, &tmdb_collection).await?;

    let movies: Vec<MovieRow> = sqlx::query_as(
        "SELECT m.* FROM movies m
         INNER JOIN movie_collections mc ON mc.movie_id = m.id
         WHERE mc.collection_id = ?
         ORDER BY m.release_date",
    )
    .bind(collection.id)
    .fetch_all(pool)
    .await?;

    let parts = tmdb_collection
        .parts
        .iter()
        .map(|part| CollectionPart {
            tmdb_id: part.id,
            title: part.title.clone(),
            poster_path: part.poster_path.clone(),
            release_date: part.release_date.clone(),
        })
        .collect();

    Ok(CollectionWithParts {
        collection,
        movies,
        parts,
    })
}

pub(crate) async fn upsert_genre(pool: &SqlitePool, genre: &TmdbGenre) -> Result<Genre, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO genres (tmdb_id, name, created_at) VALUES (?, ?, ?)
         ON CONFLICT(tmdb_id) DO UPDATE SET name = excluded.name
         RETURNING *",
    )
    .bind(genre.id)
    .bind(&genre.name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub(crate) async fn upsert_person(
    pool: &SqlitePool,
    person: &TmdbPerson,
) -> Result<Person, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO people (tmdb_id, name, biography, birthday, deathday, profile_path, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            name = excluded.name,
            biography = excluded.biography,
            birthday = excluded.birthday,
            deathday = excluded.deathday,
            profile_path = excluded.profile_path
        RETURNING *
        "#,
    )
    .bind(person.id)
    .bind(&person.name)
    .bind(&person.biography)
    .bind(&person.birthday)
    .bind(&person.deathday)
    .bind(&person.profile_path)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

async fn upsert_collection(
    pool: &SqlitePool,
    collection: &TmdbCollection,
) -> Result<Collection, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO collections (tmdb_id, name, overview, poster_path, backdrop_path, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(tmdb_id) DO UPDATE SET
            name = excluded.name,
            overview = excluded.overview,
            poster_path = excluded.poster_path,
            backdrop_path = excluded.backdrop_path
        RETURNING *
        "#,
    )
    .bind(collection.id)
    .bind(&collection.name)
    .bind(&collection.overview)
    .bind(&collection.poster_path)
    .bind(&collection.backdrop_path)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

#[derive(sqlx::FromRow)]
struct CreditRow {
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

impl CreditRow {
    fn into_credit(self) -> MovieCredit {
        MovieCredit {
            id: self.credit_id,
            role: Role::from_db(&self.role),
            character: self.character,
            created_at: self.credit_created_at,
            person: Person {
                id: self.person_id,
                tmdb_id: self.person_tmdb_id,
                name: self.person_name,
                biography: self.biography,
                birthday: self.birthday,
                deathday: self.deathday,
                profile_path: self.profile_path,
                created_at: self.person_created_at,
            },
        }
    }
}

/// Assemble a cached movie with its relations, if present.
async fn find_movie(pool: &SqlitePool, tmdb_id: i64) -> Result<Option<Movie>, sqlx::Error> {
    let row: Option<MovieRow> = sqlx::query_as("SELECT * FROM movies WHERE tmdb_id = ?")
        .bind(tmdb_id)
        .fetch_optional(pool)
        .await?;
    let Some(movie) = row else {
        return Ok(None);
    };

    let genres: Vec<Genre> = sqlx::query_as(
        "SELECT g.* FROM genres g
         INNER JOIN movie_genres mg ON mg.genre_id = g.id
         WHERE mg.movie_id = ?
         ORDER BY g.name",
    )
    .bind(movie.id)
    .fetch_all(pool)
    .await?;

    let credits: Vec<CreditRow> = sqlx::query_as(
        "SELECT mp.id AS credit_id, mp.role, mp.character, mp.created_at AS credit_created_at,
                p.id AS person_id, p.tmdb_id AS person_tmdb_id, p.name AS person_name,
                p.biography, p.birthday, p.deathday, p.profile_path,
                p.created_at AS person_created_at
         FROM movie_people mp
         INNER JOIN people p ON p.id = mp.person_id
         WHERE mp.movie_id = ?
         ORDER BY mp.id",
    )
    .bind(movie.id)
    .fetch_all(pool)
    .await?;

    let collections: Vec<Collection> = sqlx::query_as(
        "SELECT c.* FROM collections c
         INNER JOIN movie_collections mc ON mc.collection_id = c.id
         WHERE mc.movie_id = ?",
    )
    .bind(movie.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Movie {
        movie,
        genres,
        people: credits.into_iter().map(CreditRow::into_credit).collect(),
        collections,
    }))
}
