//! In-memory metadata lookup

use async_trait::async_trait;
use mfo_resolve::models::{EnrichedMetadata, EpisodeOption, MediaKind, SeasonOption};
use mfo_resolve::services::{ItemDetails, MetadataLookup};
use mfo_resolve::{ResolveError, ResolveResult};
use std::sync::Mutex;

pub struct FakeMetadata {
    pub seasons: Vec<SeasonOption>,
    pub episodes: Vec<EpisodeOption>,
    pub fail_all: bool,
    pub lookup_calls: Mutex<Vec<(MediaKind, String)>>,
    pub season_calls: Mutex<Vec<String>>,
    pub episode_calls: Mutex<Vec<(String, u32)>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self {
            seasons: vec![season(1), season(2)],
            episodes: vec![episode(1), episode(2), episode(3)],
            fail_all: false,
            lookup_calls: Mutex::new(Vec::new()),
            season_calls: Mutex::new(Vec::new()),
            episode_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    pub fn season_calls(&self) -> Vec<String> {
        self.season_calls.lock().unwrap().clone()
    }

    pub fn episode_calls(&self) -> Vec<(String, u32)> {
        self.episode_calls.lock().unwrap().clone()
    }
}

fn season(number: u32) -> SeasonOption {
    SeasonOption {
        season_number: number,
        name: format!("Season {}", number),
        episode_count: Some(3),
        air_date: None,
        poster_url: None,
    }
}

fn episode(number: u32) -> EpisodeOption {
    EpisodeOption {
        episode_number: number,
        name: format!("Episode {}", number),
        air_date: None,
        overview: None,
    }
}

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn lookup(&self, kind: MediaKind, external_id: &str) -> ResolveResult<ItemDetails> {
        self.lookup_calls
            .lock()
            .unwrap()
            .push((kind, external_id.to_string()));
        if self.fail_all {
            return Err(ResolveError::NotFound(external_id.to_string()));
        }
        Ok(ItemDetails {
            poster_url: Some(format!("poster-{}", external_id)),
            metadata: EnrichedMetadata {
                media_kind: kind,
                title: Some(format!("Item {}", external_id)),
                ..Default::default()
            },
        })
    }

    async fn seasons(&self, external_id: &str) -> ResolveResult<Vec<SeasonOption>> {
        self.season_calls.lock().unwrap().push(external_id.to_string());
        if self.fail_all {
            return Err(ResolveError::Metadata("service down".to_string()));
        }
        Ok(self.seasons.clone())
    }

    async fn episodes(&self, external_id: &str, season: u32) -> ResolveResult<Vec<EpisodeOption>> {
        self.episode_calls
            .lock()
            .unwrap()
            .push((external_id.to_string(), season));
        if self.fail_all {
            return Err(ResolveError::Metadata("service down".to_string()));
        }
        Ok(self.episodes.clone())
    }
}
