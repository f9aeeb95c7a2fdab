//! Session-related types carried by events

use serde::{Deserialize, Serialize};

/// Kind of media item an external id refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
    #[default]
    Unknown,
}

impl MediaKind {
    /// Map a backend kind label ("Movie", "TV Show", ...) to a kind
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => MediaKind::Movie,
            "tv" | "tv show" | "tv series" | "show" | "series" => MediaKind::Tv,
            _ => MediaKind::Unknown,
        }
    }

    /// The other concrete kind (movie ↔ tv)
    pub fn alternate(self) -> Option<Self> {
        match self {
            MediaKind::Movie => Some(MediaKind::Tv),
            MediaKind::Tv => Some(MediaKind::Movie),
            MediaKind::Unknown => None,
        }
    }

    /// Path segment used by the metadata service
    pub fn as_path_segment(self) -> Option<&'static str> {
        match self {
            MediaKind::Movie => Some("movie"),
            MediaKind::Tv => Some("tv"),
            MediaKind::Unknown => None,
        }
    }
}

/// Session stage
///
/// Views derive their booleans (loading, input enabled, ...) from this value;
/// there are no independent flags to disagree with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No backend conversation running
    #[default]
    Idle,
    /// Request sent or input submitted; waiting for the backend to speak
    AwaitingBackendOutput,
    /// Backend waits for a menu choice
    AwaitingSelection,
    /// Backend waits for a free-form search term
    AwaitingManualSearchInput,
    /// Season list shown, waiting for the user
    AwaitingSeasonSelection,
    /// Episode list shown, waiting for the user
    AwaitingEpisodeSelection,
    /// `done` received, checking it against open prompts
    Reconciling,
    /// Backend finished; auto-close pending
    Completed,
    /// Session closed or terminated
    Closed,
}

impl Stage {
    /// Stages in which the backend (or sub-dialog) expects the user to act
    pub fn awaits_input(self) -> bool {
        matches!(
            self,
            Stage::AwaitingSelection
                | Stage::AwaitingManualSearchInput
                | Stage::AwaitingSeasonSelection
                | Stage::AwaitingEpisodeSelection
        )
    }

    /// Season/episode sub-dialog
    pub fn in_season_flow(self) -> bool {
        matches!(
            self,
            Stage::AwaitingSeasonSelection | Stage::AwaitingEpisodeSelection
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Closed)
    }
}

/// Metadata fetched for a candidate after extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    pub media_kind: MediaKind,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
}

/// One numbered option offered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// 1-based menu number; sending it back selects this candidate
    pub ordinal: u32,
    pub title: String,
    pub year: Option<String>,
    pub media_kind: MediaKind,
    /// Database the id belongs to (e.g. "tmdb")
    pub id_source: String,
    pub external_id: String,
    pub poster_url: Option<String>,
    pub metadata: Option<EnrichedMetadata>,
}

impl Candidate {
    /// Candidate stub as parsed, before enrichment
    pub fn stub(
        ordinal: u32,
        title: impl Into<String>,
        year: Option<String>,
        media_kind: MediaKind,
        id_source: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            title: title.into(),
            year,
            media_kind,
            id_source: id_source.into(),
            external_id: external_id.into(),
            poster_url: None,
            metadata: None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.poster_url.is_some() || self.metadata.is_some()
    }
}

/// Season entry of the season sub-dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonOption {
    pub season_number: u32,
    pub name: String,
    pub episode_count: Option<u32>,
    pub air_date: Option<String>,
    pub poster_url: Option<String>,
}

/// Episode entry of the episode sub-dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeOption {
    pub episode_number: u32,
    pub name: String,
    pub air_date: Option<String>,
    pub overview: Option<String>,
}
