//! Candidate enrichment
//!
//! Decorates extracted candidates with poster URLs and item metadata from
//! the metadata service. Lookups run in fixed-size batches: every lookup of
//! a batch runs concurrently and the batch is awaited (failures tolerated)
//! before the next one starts.
//!
//! Results are reported per candidate as `EnrichmentUpdate`s tagged with the
//! candidate-set generation they were computed for; the controller drops
//! updates for a generation that is no longer displayed.

use crate::models::{Candidate, EnrichedMetadata, MediaKind};
use crate::services::MetadataLookup;
use futures::future::join_all;
use mfo_common::config::EnrichmentConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Most lookups ever in flight at once, whatever the config says
pub const MAX_CONCURRENT_LOOKUPS: usize = 3;

static STRONG_TV_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:season|episode|s\d{1,2}e\d{1,3}|s\d{1,2}|e\d{1,3})\b")
        .expect("tv token regex should compile")
});

/// Enrichment result for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentUpdate {
    pub generation: u64,
    pub ordinal: u32,
    pub external_id: String,
    pub poster_url: Option<String>,
    pub metadata: Option<EnrichedMetadata>,
}

/// What the backend said it is searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchContext {
    Tv,
    Movie,
    Unknown,
}

const TV_PHRASES: &[&str] = &["searching for tv", "tv show", "tv series", "series"];
const MOVIE_PHRASES: &[&str] = &["searching for movie", "movie"];

impl SearchContext {
    /// Classify by whichever phrase appears last in the buffer
    pub fn from_buffer(buffer: &str) -> Self {
        let lower = buffer.to_lowercase();
        let last = |phrases: &[&str]| phrases.iter().filter_map(|p| lower.rfind(p)).max();

        match (last(TV_PHRASES), last(MOVIE_PHRASES)) {
            (Some(tv), Some(movie)) if tv > movie => SearchContext::Tv,
            (Some(_), Some(_)) => SearchContext::Movie,
            (Some(_), None) => SearchContext::Tv,
            (None, Some(_)) => SearchContext::Movie,
            (None, None) => SearchContext::Unknown,
        }
    }
}

/// Title contains season/episode markers (`season`, `S01`, `E02`, `S01E02`)
pub fn has_strong_tv_tokens(title: &str) -> bool {
    STRONG_TV_TOKENS.is_match(title)
}

/// Kind to query first, and the alternate to try if that fails
///
/// An explicit kind label is queried once. Otherwise the search context
/// decides, and the alternate kind is only worth a second request when the
/// title looks like TV.
pub fn plan_kinds(candidate: &Candidate, context: SearchContext) -> (MediaKind, Option<MediaKind>) {
    if candidate.media_kind != MediaKind::Unknown {
        return (candidate.media_kind, None);
    }

    let tv_like = has_strong_tv_tokens(&candidate.title);
    let primary = match context {
        SearchContext::Tv => MediaKind::Tv,
        SearchContext::Movie => MediaKind::Movie,
        SearchContext::Unknown if tv_like => MediaKind::Tv,
        SearchContext::Unknown => MediaKind::Movie,
    };
    let fallback = if tv_like { primary.alternate() } else { None };

    (primary, fallback)
}

/// Summary of one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Batched, bounded-concurrency enrichment runner
pub struct EnrichmentFetcher {
    lookup: Arc<dyn MetadataLookup>,
    batch_size: usize,
    inter_batch_pause: Duration,
}

impl EnrichmentFetcher {
    pub fn new(lookup: Arc<dyn MetadataLookup>, config: &EnrichmentConfig) -> Self {
        Self {
            lookup,
            batch_size: config.batch_size.clamp(1, MAX_CONCURRENT_LOOKUPS),
            inter_batch_pause: config.inter_batch_pause(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Enrich one candidate generation
    ///
    /// # Arguments
    /// * `generation` - Candidate-set generation the candidates belong to
    /// * `candidates` - Candidates to decorate (ones without an id are skipped)
    /// * `context` - Search context for unlabeled candidates
    /// * `cancel` - Cancelled when the generation is superseded
    /// * `on_update` - Called once per successful lookup, in ordinal order
    ///   within each batch
    pub async fn enrich<F>(
        &self,
        generation: u64,
        candidates: Vec<Candidate>,
        context: SearchContext,
        cancel: CancellationToken,
        mut on_update: F,
    ) -> EnrichmentReport
    where
        F: FnMut(EnrichmentUpdate) + Send,
    {
        let mut report = EnrichmentReport::default();
        let work: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !c.external_id.is_empty())
            .collect();

        for (index, batch) in work.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.inter_batch_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        return report;
                    }
                    _ = tokio::time::sleep(self.inter_batch_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }

            debug!(generation, batch = index + 1, size = batch.len(), "Enrichment batch started");
            report.batches += 1;

            let lookups = batch
                .iter()
                .map(|candidate| self.enrich_one(generation, candidate, context));

            let results = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    return report;
                }
                results = join_all(lookups) => results,
            };

            for result in results {
                match result {
                    Some(update) => {
                        report.succeeded += 1;
                        on_update(update);
                    }
                    None => report.failed += 1,
                }
            }
        }

        report
    }

    async fn enrich_one(
        &self,
        generation: u64,
        candidate: &Candidate,
        context: SearchContext,
    ) -> Option<EnrichmentUpdate> {
        let (primary, fallback) = plan_kinds(candidate, context);

        let details = match self.lookup.lookup(primary, &candidate.external_id).await {
            Ok(details) => details,
            Err(e) => {
                debug!(
                    ordinal = candidate.ordinal,
                    external_id = %candidate.external_id,
                    kind = ?primary,
                    error = %e,
                    "Enrichment lookup failed"
                );
                let alternate = fallback?;
                match self.lookup.lookup(alternate, &candidate.external_id).await {
                    Ok(details) => details,
                    Err(e) => {
                        debug!(
                            ordinal = candidate.ordinal,
                            external_id = %candidate.external_id,
                            kind = ?alternate,
                            error = %e,
                            "Enrichment fallback lookup failed"
                        );
                        return None;
                    }
                }
            }
        };

        Some(EnrichmentUpdate {
            generation,
            ordinal: candidate.ordinal,
            external_id: candidate.external_id.clone(),
            poster_url: details.poster_url,
            metadata: Some(details.metadata),
        })
    }
}
