// Filename parsing for share files
// Supports the narrow naming convention the catalog understands:
// - "Title S01E05.mp4" / "Title 2023-10-01.mp4" (episodes)
// - "Title.2003.mp4" (movies, trailing 4-digit year)

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static RE_EPISODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[Ss]\d+[Ee]\d+").unwrap());
static RE_AIR_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

const MOVIE_KEYWORDS: &[&str] = &["movie", "film", "flick", "flix"];
const TV_KEYWORDS: &[&str] = &["show", "series"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Unknown,
}

/// Best-effort structured guess derived from a filename and its folder path.
/// Never persisted; recomputed whenever the file is seen again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFileInfo {
    pub filename: String,
    pub pathname: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
    pub clean_title: String,
    pub episode_info: Option<String>,
}

/// Parse a raw filename + folder path into a structured guess.
///
/// Deterministic and total: malformed input degrades to an `Unknown` media
/// type rather than an error. The episode/date checks run before any
/// tokenization so a year inside an episode-style name is never mistaken
/// for a release year.
pub fn parse_file_info(filename: &str, pathname: &str) -> ParsedFileInfo {
    let current_year = chrono::Utc::now().year();
    parse_with_current_year(filename, pathname, current_year)
}

fn parse_with_current_year(filename: &str, pathname: &str, current_year: i32) -> ParsedFileInfo {
    let name = strip_mp4_extension(filename);

    if let Some(m) = RE_EPISODE.find(name) {
        return ParsedFileInfo {
            filename: filename.to_string(),
            pathname: pathname.to_string(),
            year: None,
            media_type: MediaType::Tv,
            clean_title: clean_title_prefix(&name[..m.start()]),
            episode_info: Some(m.as_str().to_string()),
        };
    }

    if let Some(m) = RE_AIR_DATE.find(name) {
        return ParsedFileInfo {
            filename: filename.to_string(),
            pathname: pathname.to_string(),
            year: None,
            media_type: MediaType::Tv,
            clean_title: clean_title_prefix(&name[..m.start()]),
            episode_info: Some(m.as_str().to_string()),
        };
    }

    // Movie-style name: tokenize and scan from the end for a release year
    let tokens: Vec<&str> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut year = None;
    let mut year_index = None;
    for (i, token) in tokens.iter().enumerate().rev() {
        if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(candidate) = token.parse::<i32>() {
                if (1900..=current_year + 1).contains(&candidate) {
                    year = Some(candidate);
                    year_index = Some(i);
                    break;
                }
            }
        }
    }

    let clean_title = match year_index {
        Some(i) => tokens[..i].join(" "),
        None => tokens.join(" "),
    };

    ParsedFileInfo {
        filename: filename.to_string(),
        pathname: pathname.to_string(),
        year,
        media_type: detect_media_type(pathname),
        clean_title,
        episode_info: None,
    }
}

fn strip_mp4_extension(filename: &str) -> &str {
    let bytes = filename.as_bytes();
    if bytes.len() >= 4 && bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".mp4") {
        // The suffix is ASCII, so the cut lands on a char boundary
        &filename[..bytes.len() - 4]
    } else {
        filename
    }
}

/// Collapse runs of non-alphanumeric characters to single spaces and trim.
fn clean_title_prefix(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a movie-style name by folder path keywords. The tv
/// classification from an episode/date match always takes precedence and
/// never reaches this lookup.
fn detect_media_type(pathname: &str) -> MediaType {
    let lower = pathname.to_lowercase();

    if MOVIE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return MediaType::Movie;
    }
    if TV_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return MediaType::Tv;
    }

    MediaType::Unknown
}
