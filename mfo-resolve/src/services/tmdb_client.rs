//! Metadata lookup client (TMDB)
//!
//! Fetches item details for candidate enrichment plus season and episode
//! lists for the season/episode sub-dialog.
//!
//! # API Reference
//! - `GET {base}/movie/{id}`, `GET {base}/tv/{id}`
//! - `GET {base}/tv/{id}/season/{n}`
//! - Every request carries `api_key` and `language` query parameters

use crate::error::{ResolveError, ResolveResult};
use crate::models::{EnrichedMetadata, EpisodeOption, MediaKind, SeasonOption};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use mfo_common::config::MetadataConfig;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Details used to decorate a candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDetails {
    pub poster_url: Option<String>,
    pub metadata: EnrichedMetadata,
}

/// Metadata lookup service seam
///
/// The controller and enrichment fetcher only see this trait, so tests can
/// substitute an in-memory implementation.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Fetch details for one item of the given kind
    async fn lookup(&self, kind: MediaKind, external_id: &str) -> ResolveResult<ItemDetails>;

    /// Season list of a TV show
    async fn seasons(&self, external_id: &str) -> ResolveResult<Vec<SeasonOption>>;

    /// Episode list of one season
    async fn episodes(&self, external_id: &str, season: u32) -> ResolveResult<Vec<EpisodeOption>>;
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TmdbItem {
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbShow {
    #[serde(default)]
    seasons: Vec<TmdbSeason>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeason {
    season_number: u32,
    name: Option<String>,
    episode_count: Option<u32>,
    air_date: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetails {
    #[serde(default)]
    episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    episode_number: u32,
    name: Option<String>,
    air_date: Option<String>,
    overview: Option<String>,
}

// ============================================================================
// Response cache
// ============================================================================

/// Responses kept per client unless overridden with `with_cache_capacity`
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Bounded response cache; the oldest entry is evicted first
#[derive(Debug)]
struct ResponseCache {
    capacity: usize,
    entries: HashMap<String, Value>,
    order: VecDeque<String>,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    fn insert(&mut self, path: String, value: Value) {
        if self.entries.insert(path.clone(), value).is_some() {
            return;
        }
        self.order.push_back(path);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP implementation of [`MetadataLookup`]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    image_base_url: String,
    api_key: String,
    language: String,
    /// Responses keyed by request path; `None` when caching is disabled
    cache: Option<Mutex<ResponseCache>>,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TmdbClient {
    /// Create a client from the `[metadata]` config section
    ///
    /// # Arguments
    /// * `config` - Endpoint, language, cache and rate settings
    /// * `api_key` - Resolved API key (see `resolve_metadata_api_key`)
    pub fn new(config: &MetadataConfig, api_key: impl Into<String>) -> ResolveResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(mfo_common::config::get_user_agent())
            .build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_base_url: config.image_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: config.language.clone(),
            cache: config
                .cache_responses
                .then(|| Mutex::new(ResponseCache::new(DEFAULT_CACHE_CAPACITY))),
            rate_limiter,
        })
    }

    /// Limit how many responses are cached (no-op when caching is disabled)
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        if self.cache.is_some() {
            self.cache = Some(Mutex::new(ResponseCache::new(capacity)));
        }
        self
    }

    fn poster_url(&self, poster_path: Option<&str>) -> Option<String> {
        poster_path
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/{}", self.image_base_url, p.trim_start_matches('/')))
    }

    /// GET a path below the base URL, going through the cache
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ResolveResult<T> {
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.lock().await.get(path).cloned() {
                debug!(path = %path, "Metadata cache hit");
                return serde_json::from_value(value)
                    .map_err(|e| ResolveError::Decode(format!("Cached {}: {}", path, e)));
            }
        }

        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "Querying metadata service");

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await
            .map_err(|e| ResolveError::Metadata(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound(path.to_string()));
        } else if !status.is_success() {
            return Err(ResolveError::Metadata(format!(
                "{} returned status {}",
                path, status
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ResolveError::Decode(format!("{}: {}", path, e)))?;

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().await;
            cache.insert(path.to_string(), value.clone());
            debug!(path = %path, cached = cache.len(), "Metadata response cached");
        }

        serde_json::from_value(value).map_err(|e| ResolveError::Decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl MetadataLookup for TmdbClient {
    async fn lookup(&self, kind: MediaKind, external_id: &str) -> ResolveResult<ItemDetails> {
        let segment = kind.as_path_segment().ok_or_else(|| {
            ResolveError::InvalidRequest(format!("No media kind for {}", external_id))
        })?;
        let item: TmdbItem = self
            .get_json(&format!("/{}/{}", segment, external_id))
            .await?;

        Ok(ItemDetails {
            poster_url: self.poster_url(item.poster_path.as_deref()),
            metadata: EnrichedMetadata {
                media_kind: kind,
                title: item.title.or(item.name),
                overview: item.overview.filter(|o| !o.is_empty()),
                release_date: item.release_date.or(item.first_air_date),
                vote_average: item.vote_average,
            },
        })
    }

    async fn seasons(&self, external_id: &str) -> ResolveResult<Vec<SeasonOption>> {
        let show: TmdbShow = self.get_json(&format!("/tv/{}", external_id)).await?;

        Ok(show
            .seasons
            .into_iter()
            .map(|s| SeasonOption {
                season_number: s.season_number,
                name: s
                    .name
                    .unwrap_or_else(|| format!("Season {}", s.season_number)),
                episode_count: s.episode_count,
                air_date: s.air_date,
                poster_url: self.poster_url(s.poster_path.as_deref()),
            })
            .collect())
    }

    async fn episodes(&self, external_id: &str, season: u32) -> ResolveResult<Vec<EpisodeOption>> {
        let details: TmdbSeasonDetails = self
            .get_json(&format!("/tv/{}/season/{}", external_id, season))
            .await?;

        Ok(details
            .episodes
            .into_iter()
            .map(|e| EpisodeOption {
                episode_number: e.episode_number,
                name: e
                    .name
                    .unwrap_or_else(|| format!("Episode {}", e.episode_number)),
                air_date: e.air_date,
                overview: e.overview.filter(|o| !o.is_empty()),
            })
            .collect())
    }
}

/// Lookup used when no API key is configured
///
/// Every call fails, so enrichment is skipped and the season sub-dialog
/// falls back to manual input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetadata;

#[async_trait]
impl MetadataLookup for NullMetadata {
    async fn lookup(&self, _kind: MediaKind, external_id: &str) -> ResolveResult<ItemDetails> {
        Err(ResolveError::Metadata(format!(
            "No metadata API key configured (item {})",
            external_id
        )))
    }

    async fn seasons(&self, _external_id: &str) -> ResolveResult<Vec<SeasonOption>> {
        Err(ResolveError::Metadata(
            "No metadata API key configured".to_string(),
        ))
    }

    async fn episodes(&self, _external_id: &str, _season: u32) -> ResolveResult<Vec<EpisodeOption>> {
        Err(ResolveError::Metadata(
            "No metadata API key configured".to_string(),
        ))
    }
}
