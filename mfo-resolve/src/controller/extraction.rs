//! Debounced candidate extraction and enrichment dispatch

use super::{InternalEvent, SessionController};
use crate::enrichment::SearchContext;
use crate::extractor::{extract_candidates, latest_block, Extraction};
use crate::models::{Candidate, Stage};
use crate::timers::TimerKind;
use mfo_common::events::SessionEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl SessionController {
    /// Re-parse the raw buffer and update the displayed candidates
    ///
    /// No-op while the selection lock is held or during the season/episode
    /// sub-dialog.
    pub fn run_extraction(&mut self) {
        let stage = self.session.stage();
        if self.session.is_selection_locked() || stage.in_season_flow() || stage == Stage::Closed {
            debug!(
                session_id = %self.session.session_id(),
                locked = self.session.is_selection_locked(),
                ?stage,
                "Extraction skipped"
            );
            return;
        }

        let extraction = extract_candidates(
            self.session.raw_buffer(),
            self.session.last_selected_token(),
            self.session.consumed_before(),
        );

        match extraction {
            Extraction::NoCandidates => {}
            Extraction::Consumed => {
                debug!(session_id = %self.session.session_id(), "Latest menu already answered");
                self.clear_candidates();
            }
            Extraction::Found(fresh) => {
                if !self.session.candidates().should_replace(&fresh) {
                    return;
                }
                self.replace_candidates(fresh);
            }
        }
    }

    fn replace_candidates(&mut self, fresh: Vec<Candidate>) {
        let count = fresh.len();
        let generation = self.session.candidates_mut().replace(fresh.clone());
        info!(
            session_id = %self.session.session_id(),
            generation,
            count,
            "Candidates replaced"
        );
        self.emit(SessionEvent::CandidatesReplaced {
            session_id: self.session.session_id(),
            generation,
            candidates: fresh.clone(),
        });

        self.timers.cancel(TimerKind::LoadingFallback);
        if matches!(
            self.session.stage(),
            Stage::Idle | Stage::AwaitingBackendOutput
        ) {
            self.set_stage(Stage::AwaitingSelection);
        }

        self.start_enrichment(generation, fresh);
    }

    /// Start one enrichment pass, superseding any pass still running
    fn start_enrichment(&mut self, generation: u64, candidates: Vec<Candidate>) {
        self.cancel_enrichment();
        if candidates.is_empty() {
            return;
        }

        let token = CancellationToken::new();
        self.enrichment_cancel = Some(token.clone());
        self.session.set_enrichment_generation(Some(generation));

        let fetcher = Arc::clone(&self.enrichment);
        let context = SearchContext::from_buffer(self.session.raw_buffer());
        let tx = self.internal_tx.clone();
        debug!(
            session_id = %self.session.session_id(),
            generation,
            ?context,
            "Enrichment started"
        );

        tokio::spawn(async move {
            let updates = tx.clone();
            let report = fetcher
                .enrich(generation, candidates, context, token, move |update| {
                    let _ = updates.send(InternalEvent::Enrichment(update));
                })
                .await;
            let _ = tx.send(InternalEvent::EnrichmentFinished { generation, report });
        });
    }

    /// Merge enrichment results into the displayed set
    ///
    /// Updates for a generation that is no longer displayed are dropped.
    pub fn handle_internal(&mut self, event: InternalEvent) {
        if self.session.stage() == Stage::Closed {
            return;
        }

        match event {
            InternalEvent::Enrichment(update) => {
                let merged = self.session.candidates_mut().merge(&update).cloned();
                match merged {
                    Some(candidate) => self.emit(SessionEvent::CandidateEnriched {
                        session_id: self.session.session_id(),
                        generation: update.generation,
                        candidate,
                    }),
                    None => debug!(
                        session_id = %self.session.session_id(),
                        generation = update.generation,
                        ordinal = update.ordinal,
                        "Stale enrichment result dropped"
                    ),
                }
            }
            InternalEvent::EnrichmentFinished { generation, report } => {
                if self.session.enrichment_generation() == Some(generation) {
                    self.session.set_enrichment_generation(None);
                    self.enrichment_cancel = None;
                }
                debug!(
                    session_id = %self.session.session_id(),
                    generation,
                    batches = report.batches,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    cancelled = report.cancelled,
                    "Enrichment finished"
                );
            }
        }
    }

    /// Release the selection lock once a fresh menu follows the echo line
    pub(super) fn maybe_release_lock(&mut self) {
        let Some(echo_offset) = self.session.selection_lock().echo_offset() else {
            return;
        };
        if !self.session.is_selection_locked() {
            return;
        }

        let fresh_block = latest_block(self.session.raw_buffer())
            .map(|block| block.start >= echo_offset)
            .unwrap_or(false);
        if fresh_block {
            self.session.release_lock();
            self.timers.cancel(TimerKind::SelectionUnlock);
            debug!(session_id = %self.session.session_id(), "Selection lock released by new menu");
        }
    }
}
