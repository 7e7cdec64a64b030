use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire;

/// Credit role tags stored on person join rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Actor,
    Director,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Actor => "actor",
            Role::Director => "director",
        }
    }

    pub fn from_db(value: &str) -> Role {
        match value {
            "director" => Role::Director,
            _ => Role::Actor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub biography: Option<String>,
    pub birthday: Option<String>,
    pub deathday: Option<String>,
    pub profile_path: Option<String>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
}

/// Scalar movie columns; relations are assembled separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MovieRow {
    pub id: i64,
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub runtime: Option<i64>,
    pub tagline: Option<String>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire::date_ms")]
    pub updated_at: DateTime<Utc>,
}

/// A person attached to a movie with their role tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieCredit {
    pub id: i64,
    pub role: Role,
    pub character: Option<String>,
    pub person: Person,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
}

/// Fully assembled movie entity as served by the resolve endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(flatten)]
    pub movie: MovieRow,
    pub genres: Vec<Genre>,
    pub people: Vec<MovieCredit>,
    pub collections: Vec<Collection>,
}

/// One filmography entry on a person page. The nested movie is a shallow
/// projection of the provider's inlined credit, not a cached row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmographyEntry {
    pub tmdb_id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub role: Role,
    pub character: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonWithCredits {
    #[serde(flatten)]
    pub person: Person,
    pub movies: Vec<FilmographyEntry>,
}

/// A collection member as reported by the provider (not persisted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPart {
    pub tmdb_id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionWithParts {
    #[serde(flatten)]
    pub collection: Collection,
    pub movies: Vec<MovieRow>,
    pub parts: Vec<CollectionPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShowRow {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire::date_ms")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    #[serde(flatten)]
    pub show: ShowRow,
    pub genres: Vec<Genre>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRow {
    pub id: i64,
    pub tmdb_id: i64,
    pub show_id: i64,
    pub season_number: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episode_count: Option<i64>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire::date_ms")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(flatten)]
    pub season: SeasonRow,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRow {
    pub id: i64,
    pub tmdb_id: i64,
    pub season_id: i64,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub runtime: Option<i64>,
    pub vote_average: Option<f64>,
    pub mega_thumbnail: Option<String>,
    pub mega_file_key: Option<String>,
    pub mega_path: Option<String>,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire::date_ms")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeCredit {
    pub id: i64,
    pub role: Role,
    pub character: Option<String>,
    pub person: Person,
    #[serde(with = "wire::date_ms")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(flatten)]
    pub episode: EpisodeRow,
    pub people: Vec<EpisodeCredit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_round_trips_through_db_tag() {
        assert_eq!(Role::from_db(Role::Actor.as_str()), Role::Actor);
        assert_eq!(Role::from_db(Role::Director.as_str()), Role::Director);
        // Unknown tags degrade to actor rather than failing a fetch
        assert_eq!(Role::from_db("narrator"), Role::Actor);
    }

    #[test]
    fn test_movie_serializes_with_camel_case_and_date_markers() {
        let movie = MovieRow {
            id: 1,
            tmdb_id: 603,
            title: "The Matrix".to_string(),
            overview: None,
            release_date: Some("1999-03-30".to_string()),
            poster_path: None,
            backdrop_path: None,
            vote_average: Some(8.2),
            vote_count: Some(25000),
            runtime: Some(136),
            tagline: None,
            created_at: Utc.timestamp_millis_opt(1000).unwrap(),
            updated_at: Utc.timestamp_millis_opt(2000).unwrap(),
        };

        let value = serde_json::to_value(&movie).unwrap();
        assert_eq!(value["tmdbId"], 603);
        assert_eq!(value["releaseDate"], "1999-03-30");
        assert_eq!(
            value["createdAt"],
            serde_json::json!({"__type": "Date", "value": 1000})
        );
    }
}
