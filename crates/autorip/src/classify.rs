//! Classifier module for deciding whether a disc holds a movie or TV episodes.
//!
//! The disc title reported by the drive is the only input. Season/episode
//! markers and TV keywords mark a disc as TV; everything else is a movie.
//! An operator-forced classification always wins over the heuristic.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Kind of content on a disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscType {
    Movie,
    Tv,
}

impl DiscType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscType::Movie => "movie",
            DiscType::Tv => "tv",
        }
    }
}

impl std::fmt::Display for DiscType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised for a forced classification that is neither `movie` nor `tv`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid disc type (expected 'movie' or 'tv')")]
pub struct InvalidDiscType(pub String);

impl FromStr for DiscType {
    type Err = InvalidDiscType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(DiscType::Movie),
            "tv" => Ok(DiscType::Tv),
            _ => Err(InvalidDiscType(s.to_string())),
        }
    }
}

/// Decides the disc type from its title.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, disc_title: &str) -> DiscType;
}

/// Keywords that indicate a TV box set.
const TV_KEYWORDS: &[&str] = &[
    "season", "series", "episode", "episodes", "complete series", "saison", "staffel",
    "temporada", "tv show",
];

/// `S01`, `S1D2`, `S02E05`, `Season 3`, `Disc 2 of 4` style markers.
static SEASON_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s_.\-])s\d{1,2}(?:[\s_.\-]?(?:d|e|disc)\d{1,2})?(?:$|[\s_.\-])")
        .expect("season marker regex is valid")
});

/// Local heuristic classifier working on the disc title alone.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, disc_title: &str) -> DiscType {
        classify_title(disc_title)
    }
}

/// Classifies a disc title.
///
/// 1. A season marker (`S01`, `S02D1`, `S1E03`) -> Tv
/// 2. A TV keyword (`season`, `series`, ...) -> Tv
/// 3. Otherwise -> Movie
pub fn classify_title(disc_title: &str) -> DiscType {
    if SEASON_MARKER.is_match(disc_title) {
        return DiscType::Tv;
    }

    let normalized = disc_title.replace(['_', '.'], " ").to_lowercase();
    if contains_any_keyword(&normalized, TV_KEYWORDS) {
        return DiscType::Tv;
    }

    DiscType::Movie
}

/// Keyword must appear as whole words.
fn contains_any_keyword(title: &str, keywords: &[&str]) -> bool {
    let padded = format!(" {} ", title.split_whitespace().collect::<Vec<_>>().join(" "));
    keywords
        .iter()
        .any(|kw| padded.contains(&format!(" {} ", kw)))
}

/// Wraps a classifier so an operator choice overrides it.
pub struct ForcedOrClassified<'a> {
    pub forced: Option<DiscType>,
    pub classifier: &'a dyn Classifier,
}

impl ForcedOrClassified<'_> {
    pub async fn resolve(&self, disc_title: &str) -> DiscType {
        match self.forced {
            Some(disc_type) => disc_type,
            None => self.classifier.classify(disc_title).await,
        }
    }
}
